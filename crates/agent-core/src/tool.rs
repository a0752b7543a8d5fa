//! Tool Invocations
//!
//! Tracks the tool calls an assistant opens during one exchange and matches
//! asynchronous tool results back onto them.
//!
//! Results may arrive with an unreliable or absent identifier, so matching is
//! a pluggable [`ResultMatcher`]. [`HeuristicMatcher`] is the default:
//!
//! 1. a known id wins;
//! 2. else the first invocation with the same tool name and no result yet;
//! 3. else the last invocation with the same tool name, even if it already
//!    holds a result (which is then overwritten);
//! 4. else the result is dropped.
//!
//! Rule 3 can misattribute results when two calls share a tool name and the
//! backend sends unlabeled results out of order. [`StrictIdMatcher`] trades
//! that for dropping anything without a known id.

use serde::{Deserialize, Serialize};

/// One tool call within an in-flight message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call identifier as reported by the backend
    pub id: String,

    /// Tool name; set once, never overwritten after it is non-empty
    pub name: String,

    /// Concatenation of every argument fragment seen for this id
    pub arguments: String,

    /// Tool output, once a result has been matched to this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// An empty result leaves the call unresolved
    pub fn has_result(&self) -> bool {
        matches!(&self.result, Some(result) if !result.is_empty())
    }
}

/// Insertion-ordered set of tool invocations keyed by id
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolInvocations {
    calls: Vec<ToolInvocation>,
}

impl ToolInvocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `tool_call`/`tool_call_chunk` fragment.
    ///
    /// Creates the invocation on first sight of `id`, fills in the name only
    /// while it is still empty, and appends `arguments`.
    pub fn merge_fragment(&mut self, id: &str, name: Option<&str>, arguments: &str) {
        let call = match self.position(id) {
            Some(idx) => &mut self.calls[idx],
            None => {
                self.calls.push(ToolInvocation::new(id));
                let last = self.calls.len() - 1;
                &mut self.calls[last]
            }
        };

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
        call.arguments.push_str(arguments);
    }

    /// Index of the invocation with this id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ToolInvocation> {
        self.position(id).map(|idx| &self.calls[idx])
    }

    /// Record a result on the invocation at `idx`; `None` clears it
    pub(crate) fn set_result(&mut self, idx: usize, result: Option<String>) {
        if let Some(call) = self.calls.get_mut(idx) {
            call.result = result;
        }
    }

    pub fn as_slice(&self) -> &[ToolInvocation] {
        &self.calls
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.calls.iter()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl IntoIterator for ToolInvocations {
    type Item = ToolInvocation;
    type IntoIter = std::vec::IntoIter<ToolInvocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.into_iter()
    }
}

/// Strategy for picking the invocation a tool result belongs to
pub trait ResultMatcher: Send + Sync {
    /// Return the index into `calls` that should receive the result, or
    /// `None` to drop it.
    fn select(
        &self,
        calls: &[ToolInvocation],
        id: Option<&str>,
        name: Option<&str>,
    ) -> Option<usize>;
}

/// Id first, then name-based fallback
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicMatcher;

impl ResultMatcher for HeuristicMatcher {
    fn select(
        &self,
        calls: &[ToolInvocation],
        id: Option<&str>,
        name: Option<&str>,
    ) -> Option<usize> {
        if let Some(idx) = id.and_then(|id| calls.iter().position(|c| c.id == id)) {
            return Some(idx);
        }

        let name = name?;
        calls
            .iter()
            .position(|c| c.name == name && !c.has_result())
            .or_else(|| calls.iter().rposition(|c| c.name == name))
    }
}

/// Only an exact id match receives a result
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictIdMatcher;

impl ResultMatcher for StrictIdMatcher {
    fn select(
        &self,
        calls: &[ToolInvocation],
        id: Option<&str>,
        _name: Option<&str>,
    ) -> Option<usize> {
        let id = id?;
        calls.iter().position(|c| c.id == id)
    }
}
