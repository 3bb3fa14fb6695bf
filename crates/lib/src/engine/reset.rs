//! Reset keyword handling. Checked before any provider call.

use crate::config::EngineConfig;

/// Sent back when a conversation is reset.
pub const RESET_ACKNOWLEDGEMENT: &str = "conversation has been reset.";

/// True when the command is the reset keyword (trimmed, case-insensitive). An empty keyword never matches.
pub fn is_reset(command_text: &str, config: &EngineConfig) -> bool {
    let keyword = config.reset_keyword.trim();
    !keyword.is_empty() && command_text.trim().to_lowercase() == keyword.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keyword: &str) -> EngineConfig {
        EngineConfig {
            reset_keyword: keyword.to_string(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn matches_any_case() {
        let c = config("reset");
        assert!(is_reset("Reset", &c));
        assert!(is_reset("RESET", &c));
        assert!(is_reset("  reset \n", &c));
    }

    #[test]
    fn requires_exact_match() {
        let c = config("reset");
        assert!(!is_reset("reset please", &c));
        assert!(!is_reset("resets", &c));
        assert!(!is_reset("", &c));
    }

    #[test]
    fn non_ascii_keyword_matches() {
        let c = config("重置");
        assert!(is_reset(" 重置 ", &c));
    }

    #[test]
    fn empty_keyword_disables_reset() {
        let c = config("");
        assert!(!is_reset("", &c));
        assert!(!is_reset("reset", &c));
    }
}
