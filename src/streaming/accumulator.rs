//! Delta accumulator
//!
//! Folds one round of [`DeltaChunk`]s into assistant text and a table of
//! tool-call builders keyed by fragment index.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ToolError;
use crate::types::{FunctionCall, ToolCall, ToolCallFragment, ToolInvocation, ToolResult};
use crate::upstream::TerminalReason;

/// Tool Call Builder
///
/// Accumulates one tool call across fragments sharing an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallBuilder {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// A tool call closed by the `tool_calls` terminal reason.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedCall {
    pub id: String,
    pub function_name: String,
    /// Raw arguments text as streamed.
    pub arguments_json: String,
    /// Parsed invocation, or the error result to splice without invoking.
    pub invocation: Result<ToolInvocation, ToolResult>,
}

impl FinalizedCall {
    /// The call as recorded on the assistant turn.
    pub fn as_tool_call(&self) -> ToolCall {
        ToolCall::function(
            &self.id,
            FunctionCall {
                name: self.function_name.clone(),
                arguments: self.arguments_json.clone(),
            },
        )
    }
}

/// What one round ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Stop { text: String },
    ToolCalls { text: String, calls: Vec<FinalizedCall> },
}

#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pending_tool_calls(&self) -> usize {
        self.tool_calls.len()
    }

    pub fn apply_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Merge a fragment into the builder at its index.
    ///
    /// Returns `true` when this is the first fragment seen for that index.
    pub fn apply_tool_call_fragment(&mut self, fragment: ToolCallFragment) -> bool {
        let is_new = !self.tool_calls.contains_key(&fragment.index);
        let builder = self.tool_calls.entry(fragment.index).or_default();
        if builder.id.is_none() {
            builder.id = fragment.id;
        }
        builder.name.push_str(&fragment.function_name);
        builder.arguments.push_str(&fragment.arguments_json);
        is_new
    }

    /// Close the round.
    ///
    /// Only [`TerminalReason::ToolCalls`] yields calls; every other reason (or
    /// `None` for end-of-stream) is a stop with the text accumulated so far.
    pub fn finalize(self, reason: Option<&TerminalReason>) -> RoundOutcome {
        let Self { text, tool_calls } = self;
        match reason {
            Some(TerminalReason::ToolCalls) if !tool_calls.is_empty() => RoundOutcome::ToolCalls {
                text,
                calls: tool_calls.into_values().map(finalize_call).collect(),
            },
            _ => {
                if !tool_calls.is_empty() {
                    tracing::warn!(
                        discarded = tool_calls.len(),
                        ?reason,
                        "round ended without tool_calls; dropping partial tool calls"
                    );
                }
                RoundOutcome::Stop { text }
            }
        }
    }
}

fn finalize_call(builder: ToolCallBuilder) -> FinalizedCall {
    let id = builder
        .id
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
    let raw = if builder.arguments.trim().is_empty() {
        "{}"
    } else {
        builder.arguments.as_str()
    };
    let invocation = match serde_json::from_str::<Value>(raw) {
        Ok(arguments) => Ok(ToolInvocation {
            id: id.clone(),
            name: builder.name.clone(),
            arguments,
        }),
        Err(e) => Err(ToolResult::failure(
            &id,
            &builder.name,
            ToolError::MalformedArguments {
                tool: builder.name.clone(),
                reason: e.to_string(),
            },
        )),
    };
    FinalizedCall {
        id,
        function_name: builder.name,
        arguments_json: builder.arguments,
        invocation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(index: usize, id: Option<&str>, name: &str, args: &str) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(str::to_string),
            function_name: name.to_string(),
            arguments_json: args.to_string(),
        }
    }

    #[test]
    fn text_only_round_stops_with_concatenation() {
        let mut acc = DeltaAccumulator::new();
        acc.apply_text("Hel");
        acc.apply_text("lo");
        assert_eq!(
            acc.finalize(Some(&TerminalReason::Stop)),
            RoundOutcome::Stop {
                text: "Hello".into()
            }
        );
    }

    #[test]
    fn fragments_merge_by_index_and_keep_first_id() {
        let mut acc = DeltaAccumulator::new();
        assert!(acc.apply_tool_call_fragment(fragment(0, Some("call_a"), "generate", "{\"pro")));
        assert!(!acc.apply_tool_call_fragment(fragment(0, Some("call_z"), "Image", "mpt\":")));
        assert!(acc.apply_tool_call_fragment(fragment(1, Some("call_b"), "getWeather", "")));
        assert!(!acc.apply_tool_call_fragment(fragment(0, None, "", "\"cat\"}")));
        assert_eq!(acc.pending_tool_calls(), 2);

        let RoundOutcome::ToolCalls { calls, .. } = acc.finalize(Some(&TerminalReason::ToolCalls))
        else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function_name, "generateImage");
        assert_eq!(calls[0].arguments_json, r#"{"prompt":"cat"}"#);
        assert_eq!(
            calls[0].invocation,
            Ok(ToolInvocation {
                id: "call_a".into(),
                name: "generateImage".into(),
                arguments: json!({"prompt": "cat"}),
            })
        );
        // empty arguments parse as an empty object
        assert_eq!(
            calls[1].invocation.as_ref().map(|i| i.arguments.clone()),
            Ok(json!({}))
        );
    }

    #[test]
    fn malformed_arguments_become_error_results() {
        let mut acc = DeltaAccumulator::new();
        acc.apply_tool_call_fragment(fragment(0, Some("call_1"), "searchWeb", "{\"query\": "));
        let RoundOutcome::ToolCalls { calls, .. } = acc.finalize(Some(&TerminalReason::ToolCalls))
        else {
            panic!("expected tool calls");
        };
        let result = calls[0].invocation.clone().unwrap_err();
        assert_eq!(result.tool_call_id, "call_1");
        assert!(matches!(result.outcome, Err(ToolError::MalformedArguments { .. })));
        assert_eq!(calls[0].as_tool_call().function.arguments, "{\"query\": ");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut acc = DeltaAccumulator::new();
        acc.apply_tool_call_fragment(fragment(0, None, "getWeather", r#"{"location":"Oslo"}"#));
        let RoundOutcome::ToolCalls { calls, .. } = acc.finalize(Some(&TerminalReason::ToolCalls))
        else {
            panic!("expected tool calls");
        };
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].invocation.as_ref().unwrap().id, calls[0].id);
    }

    #[test]
    fn other_reasons_degrade_to_stop() {
        for reason in [
            Some(TerminalReason::Length),
            Some(TerminalReason::Other("eos".into())),
            None,
        ] {
            let mut acc = DeltaAccumulator::new();
            acc.apply_text("partial");
            acc.apply_tool_call_fragment(fragment(0, Some("c"), "searchWeb", "{"));
            assert_eq!(
                acc.finalize(reason.as_ref()),
                RoundOutcome::Stop {
                    text: "partial".into()
                }
            );
        }
    }

    #[test]
    fn tool_calls_reason_without_fragments_is_a_stop() {
        let mut acc = DeltaAccumulator::new();
        acc.apply_text("done");
        assert_eq!(
            acc.finalize(Some(&TerminalReason::ToolCalls)),
            RoundOutcome::Stop { text: "done".into() }
        );
    }
}
