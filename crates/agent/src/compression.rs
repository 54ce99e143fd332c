//! Compression Engine (§4.G): decides whether history has grown too large,
//! selects a boundary that never splits a tool-call/response pair, invokes
//! an injected summarizer, and splices the result back in.
//!
//! Grounded on the teacher's `session::compaction::SessionCompaction` for
//! the service-struct shape (an estimator plus a `process()` entry point)
//! and naming, but the boundary-selection algorithm itself is this spec's
//! own backward-scan-from-halfway rule, not the teacher's simpler
//! "since-last-compaction-marker" scheme (see SPEC_FULL.md §4.G).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use kubeagent_core::message::{Message, MessagePayload, MessageSource, ToolCallRequest};
use kubeagent_core::tokens::TokenEstimator;

use crate::error::AgentError;

/// `target_fraction` is left configurable per spec.md's Open Question 2 (the
/// source pins it to both 0.40 and 0.50 in different places); this repo
/// defaults it to 0.45 and only constrains `target_fraction < trigger_fraction`.
pub const DEFAULT_TRIGGER_FRACTION: f64 = 0.70;
pub const DEFAULT_TARGET_FRACTION: f64 = 0.45;

#[derive(Debug, Clone, Copy)]
pub struct CompressionConfig {
    pub max_tokens: usize,
    pub trigger_fraction: f64,
    pub target_fraction: f64,
}

impl CompressionConfig {
    pub fn new(max_tokens: usize) -> Self {
        CompressionConfig {
            max_tokens,
            trigger_fraction: DEFAULT_TRIGGER_FRACTION,
            target_fraction: DEFAULT_TARGET_FRACTION,
        }
    }

    pub fn with_target_fraction(mut self, target_fraction: f64) -> Result<Self, AgentError> {
        if target_fraction >= self.trigger_fraction {
            return Err(AgentError::Compression(format!(
                "target_fraction {target_fraction} must be < trigger_fraction {}",
                self.trigger_fraction
            )));
        }
        self.target_fraction = target_fraction;
        Ok(self)
    }
}

/// Produces a summary of a message slice destined to be replaced. Errors
/// propagate unchanged; the engine never falls back to a partial summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, AgentError>;
}

pub const SUMMARY_PREFIX: &str = "## Previous Conversation Summary";

pub struct CompressionEngine {
    config: CompressionConfig,
    estimator: Arc<dyn TokenEstimator>,
    summarizer: Arc<dyn Summarizer>,
}

impl CompressionEngine {
    pub fn new(
        config: CompressionConfig,
        estimator: Arc<dyn TokenEstimator>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        CompressionEngine {
            config,
            estimator,
            summarizer,
        }
    }

    /// True if `history`'s estimated size exceeds `max_tokens * trigger_fraction`.
    pub fn should_compress(&self, history: &[Message]) -> bool {
        let estimate = self.estimator.estimate(history) as f64;
        estimate > self.config.max_tokens as f64 * self.config.trigger_fraction
    }

    /// Boundary-selection algorithm (§4.G steps 1-5): an exclusive upper
    /// bound `k` such that `history[..k]` is safe to summarize without
    /// splitting any tool-call/response pair.
    pub fn select_boundary(&self, history: &[Message]) -> usize {
        if history.is_empty() {
            return 0;
        }

        // 1. Start at the halfway point.
        let halfway = history.len() / 2;

        // 2. Scan backward from halfway to 0 for the first tool_call_response.
        let mut boundary = None;
        for i in (0..=halfway.min(history.len() - 1)).rev() {
            if matches!(history[i].payload, MessagePayload::ToolCallResponse(_)) {
                boundary = Some(i + 1);
                break;
            }
        }
        // 4. No response found in the first half: keep the raw halfway index.
        let mut boundary = boundary.unwrap_or(halfway);

        // 3. Enforce pair-intactness: never leave an unmatched tool_call_request
        // as the last message of the prefix.
        boundary = Self::enforce_pair_intactness(history, boundary);

        // 5. Never summarize fewer than 1 message or the full history; keep at
        // least the final user turn and trailing assistant turn, if present.
        let min_tail = Self::min_trailing_turn_len(history);
        boundary = boundary.min(history.len().saturating_sub(min_tail));
        boundary = boundary.max(1).min(history.len().saturating_sub(1).max(1));
        Self::enforce_pair_intactness(history, boundary)
    }

    fn enforce_pair_intactness(history: &[Message], mut boundary: usize) -> usize {
        loop {
            if boundary == 0 {
                break;
            }
            let MessagePayload::ToolCallRequest(req) = &history[boundary - 1].payload else {
                break;
            };
            match Self::matching_response_index(history, req) {
                Some(resp_idx) if resp_idx < boundary => break,
                Some(resp_idx) => boundary = resp_idx + 1,
                None => boundary -= 1,
            }
        }
        boundary
    }

    fn matching_response_index(history: &[Message], req: &ToolCallRequest) -> Option<usize> {
        history.iter().position(|m| {
            matches!(&m.payload, MessagePayload::ToolCallResponse(resp) if resp.id == req.id)
        })
    }

    fn min_trailing_turn_len(history: &[Message]) -> usize {
        if history.len() < 2 {
            return 1;
        }
        let last = &history[history.len() - 1];
        let second_last = &history[history.len() - 2];
        if second_last.source == MessageSource::User && last.source == MessageSource::Model {
            2
        } else {
            1
        }
    }

    /// Run compression end to end: select the boundary, summarize the
    /// prefix, and splice the summary in. Returns the new history; the
    /// caller is responsible for `replace_all`-ing it into the Chat Message
    /// Store and re-initializing the provider chat. On summarizer failure,
    /// the error propagates and `history` is returned untouched to the
    /// caller (this function never mutates its input).
    pub async fn compress(&self, history: &[Message]) -> Result<Vec<Message>, AgentError> {
        let boundary = self.select_boundary(history);
        let prefix = &history[..boundary];
        let summary_text = self.summarizer.summarize(prefix).await?;

        let summary_message = Message {
            id: format!("summary-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
            source: MessageSource::Model,
            payload: MessagePayload::Text {
                text: format!("{SUMMARY_PREFIX}\n\n{summary_text}"),
            },
            created_at: Utc::now(),
            token_estimate: None,
        };

        let mut spliced = Vec::with_capacity(history.len() - boundary + 1);
        spliced.push(summary_message);
        spliced.extend_from_slice(&history[boundary..]);
        Ok(spliced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeagent_core::message::{ToolCallResponse, ToolCallStatus};
    use kubeagent_core::tokens::DefaultTokenEstimator;

    struct StubSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, AgentError> {
            Err(AgentError::Compression("summarizer unavailable".into()))
        }
    }

    fn text(source: MessageSource, text: &str) -> Message {
        Message::text(source, text)
    }

    fn tool_request(id: &str) -> Message {
        Message::new(
            MessageSource::Model,
            MessagePayload::ToolCallRequest(ToolCallRequest {
                id: id.into(),
                name: "bash".into(),
                arguments: serde_json::json!({}),
            }),
        )
    }

    fn tool_response(id: &str) -> Message {
        Message::new(
            MessageSource::Agent,
            MessagePayload::ToolCallResponse(ToolCallResponse {
                id: id.into(),
                name: "bash".into(),
                result: serde_json::json!("ok"),
                status: Some(ToolCallStatus::Ok),
            }),
        )
    }

    fn engine(summarizer: Arc<dyn Summarizer>) -> CompressionEngine {
        CompressionEngine::new(
            CompressionConfig::new(1000),
            Arc::new(DefaultTokenEstimator),
            summarizer,
        )
    }

    #[test]
    fn target_fraction_must_be_below_trigger() {
        let config = CompressionConfig::new(1000);
        assert!(config.with_target_fraction(0.90).is_err());
        assert!(CompressionConfig::new(1000).with_target_fraction(0.30).is_ok());
    }

    #[test]
    fn should_compress_when_over_trigger_fraction() {
        let e = engine(Arc::new(StubSummarizer("x")));
        let small = vec![text(MessageSource::User, "hi")];
        assert!(!e.should_compress(&small));

        let huge_text = "a".repeat(10_000);
        let huge = vec![text(MessageSource::User, &huge_text)];
        assert!(e.should_compress(&huge));
    }

    /// S4: History of 10 messages `[u, a, tr, tp, u, a, tr, tp, u, a]`.
    /// Halfway=5; scanning backward finds `tp` at index 3; boundary=4.
    #[test]
    fn boundary_selection_matches_scenario_s4() {
        let history = vec![
            text(MessageSource::User, "u1"),
            text(MessageSource::Model, "a1"),
            tool_request("t1"),
            tool_response("t1"),
            text(MessageSource::User, "u2"),
            text(MessageSource::Model, "a2"),
            tool_request("t2"),
            tool_response("t2"),
            text(MessageSource::User, "u3"),
            text(MessageSource::Model, "a3"),
        ];
        let e = engine(Arc::new(StubSummarizer("x")));
        let boundary = e.select_boundary(&history);
        assert_eq!(boundary, 4);
    }

    #[test]
    fn boundary_never_splits_a_tool_call_pair() {
        // Tool request at index 3 with its response at index 6 (after halfway).
        let history = vec![
            text(MessageSource::User, "u1"),
            text(MessageSource::Model, "a1"),
            text(MessageSource::User, "u2"),
            tool_request("t1"),
            text(MessageSource::User, "filler"),
            text(MessageSource::Model, "filler"),
            tool_response("t1"),
            text(MessageSource::User, "u3"),
        ];
        let e = engine(Arc::new(StubSummarizer("x")));
        let boundary = e.select_boundary(&history);
        // Either the request is excluded from the prefix (boundary <= 3) or
        // its response is included too (boundary >= 7).
        assert!(boundary <= 3 || boundary >= 7);
    }

    #[tokio::test]
    async fn compress_splices_summary_and_preserves_tail() {
        let history = vec![
            text(MessageSource::User, "u1"),
            text(MessageSource::Model, "a1"),
            tool_request("t1"),
            tool_response("t1"),
            text(MessageSource::User, "u2"),
            text(MessageSource::Model, "a2"),
            tool_request("t2"),
            tool_response("t2"),
            text(MessageSource::User, "u3"),
            text(MessageSource::Model, "a3"),
        ];
        let e = engine(Arc::new(StubSummarizer("summary text")));
        let compressed = e.compress(&history).await.unwrap();

        assert_eq!(compressed.len(), 7);
        assert!(matches!(&compressed[0].payload, MessagePayload::Text { text } if text.starts_with(SUMMARY_PREFIX)));
        assert_eq!(compressed[1..], history[4..]);
    }

    #[tokio::test]
    async fn compress_propagates_summarizer_failure() {
        let history = vec![
            text(MessageSource::User, "u1"),
            text(MessageSource::Model, "a1"),
        ];
        let e = engine(Arc::new(FailingSummarizer));
        let result = e.compress(&history).await;
        assert!(result.is_err());
    }
}
