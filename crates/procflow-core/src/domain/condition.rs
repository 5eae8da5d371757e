//! Branch selection for DECISION nodes

use crate::domain::process_definition::{Node, PROP_CONDITION};
use crate::types::{display_value, Variables};
use tracing::debug;

/// Chooses the outgoing edge a DECISION node follows
pub trait ConditionEvaluator: Send + Sync {
    /// Return the target of the chosen edge, or `None` when the node has no
    /// outgoing edges at all.
    fn select_branch<'a>(&self, node: &'a Node, variables: &Variables) -> Option<&'a str>;
}

/// Default evaluator matching the condition value against edge indexes.
///
/// The condition is either a literal or a `{{variable}}` reference. Its
/// string form is compared with the index of every outgoing edge except the
/// last one; the last edge is taken when nothing matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexConditionEvaluator;

impl IndexConditionEvaluator {
    /// Resolve the condition property of `node` against `variables`
    pub fn resolve(node: &Node, variables: &Variables) -> Option<String> {
        let condition = node.property_str(PROP_CONDITION)?.trim();

        match condition
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            Some(name) => variables.get(name.trim()).map(display_value),
            None => Some(condition.to_string()),
        }
    }
}

impl ConditionEvaluator for IndexConditionEvaluator {
    fn select_branch<'a>(&self, node: &'a Node, variables: &Variables) -> Option<&'a str> {
        let (default, candidates) = node.outgoing.split_last()?;

        let Some(value) = Self::resolve(node, variables) else {
            debug!(node_id = %node.id, "Condition unresolved, taking default branch");
            return Some(default.as_str());
        };

        let chosen = candidates
            .iter()
            .enumerate()
            .find(|(index, _)| index.to_string() == value)
            .map(|(_, target)| target.as_str())
            .unwrap_or(default.as_str());

        debug!(node_id = %node.id, value = %value, target = %chosen, "Decision evaluated");
        Some(chosen)
    }
}
