//! Bottom-up expected-state derivation.
//!
//! Each parent's expected state is derived from its children's *derived*
//! expected states, not their raw recorded states. A child that is itself
//! inconsistent therefore influences its parent through what it should be,
//! so one stale leaf is reported once at its parent instead of at every
//! ancestor with a different verdict.
//!
//! ```text
//! all children Closed/Removed/Done  ->  Closed
//! any child other than New          ->  Active
//! otherwise                         ->  New
//! ```

use serde::Serialize;

use crate::hierarchy::walk;
use crate::model::{WorkItemNode, WorkItemState};

/// Fill `expected_state` and `status_valid` for every node, post-order.
///
/// Idempotent: running it again on an unchanged forest yields the same
/// values.
pub fn propagate(roots: &mut [WorkItemNode]) {
    for root in roots {
        propagate_node(root);
    }
}

fn propagate_node(node: &mut WorkItemNode) {
    for child in &mut node.children {
        propagate_node(child);
    }

    if node.is_leaf() {
        node.expected_state = node.info.state.clone();
        node.status_valid = true;
        return;
    }

    node.expected_state = expected_from_children(&node.children);
    node.status_valid = node.info.state == node.expected_state;
}

/// Expected state implied by already-propagated children.
#[must_use]
pub fn expected_from_children(children: &[WorkItemNode]) -> WorkItemState {
    if children.iter().all(|child| child.expected_state.is_terminal()) {
        WorkItemState::Closed
    } else if children
        .iter()
        .any(|child| child.expected_state != WorkItemState::New)
    {
        WorkItemState::Active
    } else {
        WorkItemState::New
    }
}

/// A node whose recorded state disagrees with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMismatch {
    pub id: u32,
    pub title: String,
    pub work_item_type: String,
    pub actual: WorkItemState,
    pub expected: WorkItemState,
}

/// Every invalid node of a propagated forest, in pre-order.
#[must_use]
pub fn invalid_nodes(roots: &[WorkItemNode]) -> Vec<StatusMismatch> {
    walk(roots)
        .into_iter()
        .filter(|(_, node)| !node.status_valid)
        .map(|(_, node)| StatusMismatch {
            id: node.info.id,
            title: node.info.title.clone(),
            work_item_type: node.info.work_item_type.to_string(),
            actual: node.info.state.clone(),
            expected: node.expected_state.clone(),
        })
        .collect()
}
