use crate::models::tool::ToolCall;

/// Merge streamed tool-call fragments into the calls seen so far.
///
/// A fragment whose non-empty id matches an existing call continues that
/// call: its arguments are appended, and its name is adopted if the existing
/// one is still empty. Anything else starts a new call. First-seen order is
/// preserved.
pub fn merge_tool_calls(mut existing: Vec<ToolCall>, incoming: Vec<ToolCall>) -> Vec<ToolCall> {
    for fragment in incoming {
        let slot = existing
            .iter_mut()
            .find(|call| !call.id.is_empty() && call.id == fragment.id);
        match slot {
            Some(call) => {
                call.arguments.push_str(&fragment.arguments);
                if call.name.is_empty() {
                    call.name = fragment.name;
                }
            }
            None => existing.push(fragment),
        }
    }
    existing
}

/// Collects the tool calls of a single streamed completion
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragments: Vec<ToolCall>) {
        if fragments.is_empty() {
            return;
        }
        let calls = std::mem::take(&mut self.calls);
        self.calls = merge_tool_calls(calls, fragments);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
    }
}
