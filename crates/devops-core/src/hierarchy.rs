//! Tree assembly from a flat [`FetchedGraph`].
//!
//! # Rules
//!
//! - Tasks and bugs in Closed/Removed are noise and are dropped *before* any
//!   edge is considered.
//! - An edge `parent → child` exists when either side recorded the hierarchy
//!   link (forward on the parent, reverse on the child) and both endpoints
//!   survived filtering. Forward links come first, in link order.
//! - A child reachable from two parents is attached under the first parent
//!   in arrival order only, keeping the result a tree.
//! - Roots are Epics that are nobody's child. Closed/Removed root epics are
//!   dropped last.
//!
//! # Cycle prevention
//!
//! The surviving parent → child graph is checked for strongly connected
//! components before materialization; a loop is reported as
//! [`HierarchyError::CycleDetected`] instead of recursing forever.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::fetch::{FetchedGraph, FetchedItem};
use crate::model::{WorkItemNode, WorkItemType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    /// Work items whose parent/child links form a loop, sorted by id.
    #[error("parent/child links form a cycle through {}", format_ids(.ids))]
    CycleDetected { ids: Vec<u32> },
}

/// Build the epic trees contained in `graph`.
///
/// # Errors
///
/// Returns [`HierarchyError::CycleDetected`] when the links loop.
pub fn assemble(graph: &FetchedGraph) -> Result<Vec<WorkItemNode>, HierarchyError> {
    let survivors: Vec<&FetchedItem> = graph.iter().filter(|item| !is_noise(item)).collect();
    let alive: HashSet<u32> = survivors.iter().map(|item| item.info.id).collect();

    let edges = collect_edges(&survivors, &alive);
    check_acyclic(&survivors, &edges)?;

    // First parent wins.
    let mut claimed: HashSet<u32> = HashSet::new();
    let mut children_of: HashMap<u32, Vec<u32>> = HashMap::new();
    for item in &survivors {
        let id = item.info.id;
        let Some(children) = edges.get(&id) else {
            continue;
        };
        let kept: Vec<u32> = children
            .iter()
            .copied()
            .filter(|child| claimed.insert(*child))
            .collect();
        children_of.insert(id, kept);
    }

    let roots = survivors
        .iter()
        .filter(|item| item.info.work_item_type == WorkItemType::Epic)
        .filter(|item| !claimed.contains(&item.info.id))
        .filter_map(|item| materialize(item.info.id, graph, &children_of))
        .collect();

    Ok(filter_closed_epics(roots))
}

/// Drop Closed/Removed epics, keeping the relative order of the rest.
#[must_use]
pub fn filter_closed_epics(nodes: Vec<WorkItemNode>) -> Vec<WorkItemNode> {
    nodes
        .into_iter()
        .filter(|node| {
            !(node.info.work_item_type == WorkItemType::Epic && node.info.state.is_closed_or_removed())
        })
        .collect()
}

/// Pre-order walk over a forest, yielding each node with its depth.
#[must_use]
pub fn walk(roots: &[WorkItemNode]) -> Vec<(usize, &WorkItemNode)> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, &WorkItemNode)> = roots.iter().rev().map(|node| (0, node)).collect();
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, node));
        stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
    }
    out
}

fn is_noise(item: &FetchedItem) -> bool {
    item.info.work_item_type.is_task_or_bug() && item.info.state.is_closed_or_removed()
}

/// Parent → children adjacency, deduplicated, forward links first.
fn collect_edges(survivors: &[&FetchedItem], alive: &HashSet<u32>) -> HashMap<u32, Vec<u32>> {
    let mut edges: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut push = |parent: u32, child: u32| {
        let children = edges.entry(parent).or_default();
        if !children.contains(&child) {
            children.push(child);
        }
    };

    for item in survivors {
        for child in item.children.iter().filter(|id| alive.contains(*id)) {
            push(item.info.id, *child);
        }
    }
    for item in survivors {
        for parent in item.parents.iter().filter(|id| alive.contains(*id)) {
            push(*parent, item.info.id);
        }
    }
    edges
}

fn check_acyclic(
    survivors: &[&FetchedItem],
    edges: &HashMap<u32, Vec<u32>>,
) -> Result<(), HierarchyError> {
    let mut graph: DiGraph<u32, ()> = DiGraph::new();
    let index: HashMap<u32, NodeIndex> = survivors
        .iter()
        .map(|item| (item.info.id, graph.add_node(item.info.id)))
        .collect();

    for (parent, children) in edges {
        for child in children {
            if let (Some(from), Some(to)) = (index.get(parent), index.get(child)) {
                graph.add_edge(*from, *to, ());
            }
        }
    }

    let mut cycle: Vec<u32> = tarjan_scc(&graph)
        .into_iter()
        .find(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| graph.contains_edge(*node, *node))
        })
        .map(|component| component.into_iter().map(|node| graph[node]).collect())
        .unwrap_or_default();

    if cycle.is_empty() {
        return Ok(());
    }
    cycle.sort_unstable();
    Err(HierarchyError::CycleDetected { ids: cycle })
}

fn materialize(
    id: u32,
    graph: &FetchedGraph,
    children_of: &HashMap<u32, Vec<u32>>,
) -> Option<WorkItemNode> {
    let mut node = WorkItemNode::new(graph.get(id)?.info.clone());
    if let Some(children) = children_of.get(&id) {
        node.children = children
            .iter()
            .filter_map(|child| materialize(*child, graph, children_of))
            .collect();
    }
    Some(node)
}

fn format_ids(ids: &[u32]) -> String {
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" -> ")
}
