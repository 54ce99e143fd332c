//! Token estimation (§4.B): a cheap, provider-independent heuristic used by
//! the compression engine to decide when history has grown too large.

use crate::message::{Message, MessagePayload};

/// Fixed per-message overhead added on top of content-derived cost,
/// accounting for role/id/type framing a provider adds on the wire.
const MESSAGE_OVERHEAD: usize = 10;

/// `estimate(text) = floor(len(text) / 4)`.
pub fn estimate_text(text: &str) -> usize {
    text.len() / 4
}

/// Per-message estimate: fixed overhead plus type-specific content cost.
/// Structured payloads are JSON-serialized before being estimated; the
/// message id is also counted, matching providers that echo it back on the
/// wire.
pub fn estimate_message(message: &Message) -> usize {
    let id_cost = estimate_text(&message.id);
    let content_cost = match &message.payload {
        MessagePayload::Text { text } => estimate_text(text),
        MessagePayload::Error { message: text } => estimate_text(text),
        MessagePayload::UserInputRequest { prompt } => estimate_text(prompt),
        MessagePayload::UserInputResponse { text } => estimate_text(text),
        MessagePayload::UserChoiceResponse { label } => estimate_text(label),
        other => estimate_text(&serde_json::to_string(other).unwrap_or_default()),
    };
    MESSAGE_OVERHEAD + id_cost + content_cost
}

/// Sum of per-message estimates across an entire history.
pub fn estimate_history(history: &[Message]) -> usize {
    history.iter().map(estimate_message).sum()
}

/// Seam allowing the compression engine to be driven by a different
/// estimator in tests, matching the shape of
/// `querymt-agent`'s `session::pruning::TokenEstimator`.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, history: &[Message]) -> usize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTokenEstimator;

impl TokenEstimator for DefaultTokenEstimator {
    fn estimate(&self, history: &[Message]) -> usize {
        estimate_history(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageSource;

    #[test]
    fn text_estimate_is_length_over_four() {
        assert_eq!(estimate_text("abcd"), 1);
        assert_eq!(estimate_text("abcdefgh"), 2);
        assert_eq!(estimate_text(""), 0);
    }

    #[test]
    fn message_estimate_adds_overhead_and_id() {
        let m = Message::text(MessageSource::User, "hello world!");
        let expected = MESSAGE_OVERHEAD + estimate_text(&m.id) + estimate_text("hello world!");
        assert_eq!(estimate_message(&m), expected);
    }
}
