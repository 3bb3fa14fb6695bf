//! Reply shaping: raw answer, or question + separator + answer, or an error line.

use crate::config::{EngineConfig, FailureReplies};
use crate::llm::CompletionError;

/// Line between the echoed question and the answer.
pub const SEPARATOR: &str = "\n-----------\n";

const TIMEOUT_NOTICE: &str = "ERROR: Please try again, ChatGPT timed out for waiting response.";

/// Outgoing text for a completion result, or None when nothing should be sent.
pub fn compose(
    command_text: &str,
    is_group: bool,
    result: &Result<String, CompletionError>,
    config: &EngineConfig,
) -> Option<String> {
    match result {
        Ok(answer) => {
            let echo = if is_group {
                config.group_reply_echoes_question
            } else {
                config.private_reply_echoes_question
            };
            if echo {
                Some(format!("{}{}{}", command_text, SEPARATOR, answer))
            } else {
                Some(answer.clone())
            }
        }
        Err(CompletionError::Timeout) => {
            Some(format!("{}{}{}", command_text, SEPARATOR, TIMEOUT_NOTICE))
        }
        Err(e) => match config.failure_replies {
            FailureReplies::Silent => None,
            FailureReplies::Notify => Some(format!("{}{}ERROR: {}", command_text, SEPARATOR, e)),
        },
    }
}
