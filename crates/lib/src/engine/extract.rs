//! Command extraction: decide whether an event is addressed to the bot and pull out the command text.
//!
//! Group messages must mention the bot and start with `@<name> <keyword>`; direct messages
//! must start with the configured prefix, or anything goes when the prefix is empty.

use regex::Regex;

use super::event::{Command, ConversationKind, InboundEvent, MessageType};
use crate::config::EngineConfig;

/// Why an event produced no command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ineligible {
    #[error("message was sent by this account")]
    SelfOriginated,
    #[error("message is not text")]
    NotText,
    #[error("group message does not mention the bot")]
    NotMentioned,
    #[error("content is not within the scope of the command format")]
    PatternMismatch,
    #[error("command is empty")]
    EmptyCommand,
}

/// Classify an event. Pure function of `(event, config)`.
pub fn extract(event: &InboundEvent, config: &EngineConfig) -> Result<Command, Ineligible> {
    if event.is_self {
        return Err(Ineligible::SelfOriginated);
    }
    if event.message_type != MessageType::Text {
        return Err(Ineligible::NotText);
    }
    let content = event.text.trim();
    let text = match &event.kind {
        ConversationKind::Group { .. } => {
            if !event.mentions_bot {
                return Err(Ineligible::NotMentioned);
            }
            strip_group_prefix(content, &event.recipient_name, &config.group_command_keyword)
                .ok_or(Ineligible::PatternMismatch)?
        }
        ConversationKind::Direct => {
            strip_private_prefix(content, &config.private_command_prefix)
                .ok_or(Ineligible::PatternMismatch)?
        }
    };
    if text.is_empty() {
        return Err(Ineligible::EmptyCommand);
    }
    Ok(Command {
        text: text.to_string(),
        conversation: event.conversation.clone(),
    })
}

/// `^@<name>\s+<keyword>\s*`, with name and keyword matched literally.
fn group_pattern(name: &str, keyword: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^@{}\s+{}\s*",
        regex::escape(name),
        regex::escape(keyword)
    ))
}

/// Remainder of `content` after the group addressing prefix, or None when it does not match.
fn strip_group_prefix<'a>(content: &'a str, name: &str, keyword: &str) -> Option<&'a str> {
    let pattern = match group_pattern(name, keyword) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("extract: building group pattern failed: {}", e);
            return None;
        }
    };
    pattern.find(content).map(|m| &content[m.end()..])
}

/// Remainder of `content` after the private prefix. An empty prefix keeps the content as is.
fn strip_private_prefix<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(content);
    }
    content.strip_prefix(prefix).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::{Conversation, SendError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    struct Chat {
        id: String,
        group: bool,
    }

    #[async_trait]
    impl Conversation for Chat {
        fn id(&self) -> &str {
            &self.id
        }
        fn is_group(&self) -> bool {
            self.group
        }
        async fn send(&self, _text: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn direct(text: &str) -> InboundEvent {
        InboundEvent {
            sent_at: Utc::now(),
            sender_id: "u1".to_string(),
            sender_name: "alice".to_string(),
            recipient_id: "b1".to_string(),
            recipient_name: "Bot".to_string(),
            text: text.to_string(),
            kind: ConversationKind::Direct,
            is_self: false,
            mentions_bot: false,
            message_type: MessageType::Text,
            conversation: Arc::new(Chat {
                id: "dm-1".to_string(),
                group: false,
            }),
        }
    }

    fn group(text: &str, mentioned: bool) -> InboundEvent {
        InboundEvent {
            kind: ConversationKind::Group {
                topic: "friends".to_string(),
            },
            mentions_bot: mentioned,
            conversation: Arc::new(Chat {
                id: "room-1".to_string(),
                group: true,
            }),
            ..direct(text)
        }
    }

    fn config_with(keyword: &str, prefix: &str) -> EngineConfig {
        EngineConfig {
            group_command_keyword: keyword.to_string(),
            private_command_prefix: prefix.to_string(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn group_keyword_command_is_extracted() {
        let config = config_with("ask", "");
        let cmd = extract(&group("@Bot ask   hello", true), &config).unwrap();
        assert_eq!(cmd.text, "hello");
        assert_eq!(cmd.conversation.id(), "room-1");
        assert!(cmd.is_group());
    }

    #[test]
    fn group_without_keyword_is_pattern_mismatch() {
        let config = config_with("ask", "");
        assert_eq!(
            extract(&group("@Bot hi", true), &config).unwrap_err(),
            Ineligible::PatternMismatch
        );
    }

    #[test]
    fn group_without_mention_is_rejected_first() {
        let config = config_with("ask", "");
        assert_eq!(
            extract(&group("@Bot ask hello", false), &config).unwrap_err(),
            Ineligible::NotMentioned
        );
    }

    #[test]
    fn group_pattern_is_case_sensitive_and_anchored() {
        let config = config_with("ask", "");
        assert_eq!(
            extract(&group("@Bot ASK hello", true), &config).unwrap_err(),
            Ineligible::PatternMismatch
        );
        assert_eq!(
            extract(&group("hey @Bot ask hello", true), &config).unwrap_err(),
            Ineligible::PatternMismatch
        );
        assert_eq!(
            extract(&group("@Botask hello", true), &config).unwrap_err(),
            Ineligible::PatternMismatch
        );
    }

    #[test]
    fn group_text_is_trimmed_before_matching() {
        let config = config_with("ask", "");
        let cmd = extract(&group("   @Bot\task what now?  \n", true), &config).unwrap();
        assert_eq!(cmd.text, "what now?");
    }

    #[test]
    fn group_empty_keyword_accepts_any_mention_command() {
        let config = config_with("", "");
        let cmd = extract(&group("@Bot tell me a joke", true), &config).unwrap();
        assert_eq!(cmd.text, "tell me a joke");
    }

    #[test]
    fn group_name_with_regex_metacharacters_is_literal() {
        let config = config_with("ask", "");
        let mut event = group("@B.t+ ask hi", true);
        event.recipient_name = "B.t+".to_string();
        assert_eq!(extract(&event, &config).unwrap().text, "hi");

        let mut event = group("@Bxtt ask hi", true);
        event.recipient_name = "B.t+".to_string();
        assert_eq!(extract(&event, &config).unwrap_err(), Ineligible::PatternMismatch);
    }

    #[test]
    fn group_keyword_only_is_empty_command() {
        let config = config_with("ask", "");
        assert_eq!(
            extract(&group("@Bot ask   ", true), &config).unwrap_err(),
            Ineligible::EmptyCommand
        );
    }

    #[test]
    fn direct_empty_prefix_takes_trimmed_text_verbatim() {
        let config = config_with("ask", "");
        let cmd = extract(&direct("  what is rust?  "), &config).unwrap();
        assert_eq!(cmd.text, "what is rust?");
        assert!(!cmd.is_group());
    }

    #[test]
    fn direct_empty_prefix_empty_text_is_rejected() {
        let config = config_with("ask", "");
        assert_eq!(
            extract(&direct("   "), &config).unwrap_err(),
            Ineligible::EmptyCommand
        );
    }

    #[test]
    fn direct_prefix_is_stripped_and_trimmed() {
        let config = config_with("ask", "!gpt");
        let cmd = extract(&direct("!gpt what time is it"), &config).unwrap();
        assert_eq!(cmd.text, "what time is it");
    }

    #[test]
    fn direct_without_prefix_is_pattern_mismatch() {
        let config = config_with("ask", "!gpt");
        assert_eq!(
            extract(&direct("hello"), &config).unwrap_err(),
            Ineligible::PatternMismatch
        );
    }

    #[test]
    fn direct_prefix_alone_is_empty_command() {
        let config = config_with("ask", "!gpt");
        assert_eq!(
            extract(&direct(" !gpt   "), &config).unwrap_err(),
            Ineligible::EmptyCommand
        );
    }

    #[test]
    fn self_messages_never_produce_commands() {
        let config = config_with("ask", "");
        let mut dm = direct("hello");
        dm.is_self = true;
        assert_eq!(extract(&dm, &config).unwrap_err(), Ineligible::SelfOriginated);

        let mut room = group("@Bot ask hello", true);
        room.is_self = true;
        assert_eq!(extract(&room, &config).unwrap_err(), Ineligible::SelfOriginated);
    }

    #[test]
    fn non_text_messages_are_rejected() {
        let config = config_with("ask", "");
        let mut dm = direct("hello");
        dm.message_type = MessageType::Other;
        assert_eq!(extract(&dm, &config).unwrap_err(), Ineligible::NotText);
    }

    #[test]
    fn extraction_is_idempotent() {
        let config = config_with("ask", "!gpt");
        let event = group("@Bot ask hello", true);
        assert_eq!(extract(&event, &config), extract(&event, &config));
        let event = direct("hello");
        assert_eq!(extract(&event, &config), extract(&event, &config));
    }
}
