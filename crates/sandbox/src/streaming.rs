//! Streaming-command detection: classifies commands that would otherwise
//! block indefinitely (log tails, watches) so executors can bound them to a
//! fixed deadline instead of hanging the turn.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::executor::StreamType;

/// Commands classified as indefinitely streaming are capped at this
/// deadline; the executor reports whatever stdout accumulated by then with
/// no error, per §4.A.
pub const STREAMING_DEADLINE: Duration = Duration::from_secs(7);

static LOG_TAIL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"kubectl\s+logs\b.*(-f\b|--follow\b)").unwrap(),
        Regex::new(r"\btail\s+-f\b").unwrap(),
        Regex::new(r"\btail\s+--follow\b").unwrap(),
        Regex::new(r"\bstern\b").unwrap(),
    ]
});

static WATCH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"kubectl\s+get\b.*(-w\b|--watch\b)").unwrap(),
        Regex::new(r"kubectl\s+events\b.*(-w\b|--watch\b)").unwrap(),
        Regex::new(r"\bwatch\s+").unwrap(),
    ]
});

/// Returns `Some(stream_type)` if `command` looks like it will stream
/// indefinitely rather than terminate on its own.
pub fn classify(command: &str) -> Option<StreamType> {
    if LOG_TAIL_PATTERNS.iter().any(|re| re.is_match(command)) {
        return Some(StreamType::LogTail);
    }
    if WATCH_PATTERNS.iter().any(|re| re.is_match(command)) {
        return Some(StreamType::Watch);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kubectl_log_follow() {
        assert_eq!(classify("kubectl logs -f mypod"), Some(StreamType::LogTail));
        assert_eq!(
            classify("kubectl logs mypod --follow"),
            Some(StreamType::LogTail)
        );
    }

    #[test]
    fn detects_kubectl_watch() {
        assert_eq!(
            classify("kubectl get pods -w"),
            Some(StreamType::Watch)
        );
    }

    #[test]
    fn ordinary_commands_are_not_streaming() {
        assert_eq!(classify("kubectl get pods"), None);
        assert_eq!(classify("ls -la"), None);
    }
}
