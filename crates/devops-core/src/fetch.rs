//! Batched work-item retrieval.
//!
//! Two entry points:
//!
//! - [`fetch_flat`] — the id set is known up front; all chunks go out at
//!   once and are joined.
//! - [`fetch_tree`] — the id set grows as relations are discovered, so
//!   fetching proceeds in waves: every wave depends on the relations of the
//!   previous one, and chunks *within* a wave run concurrently.
//!
//! # Termination
//!
//! The traversal keeps a `fetched` visited set so no id is requested twice,
//! and refuses to start wave `max_waves + 1`. A cyclic or runaway relation
//! graph therefore ends in [`DevOpsError::WaveLimitExceeded`] rather than an
//! endless loop.
//!
//! # Failure
//!
//! Any failing chunk aborts the whole fetch; the accumulator is dropped and
//! the caller never sees a partial graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, instrument};

use crate::client::WorkItemApi;
use crate::config::{FetchConfig, MAX_BATCH_SIZE};
use crate::error::DevOpsError;
use crate::model::{RawWorkItem, RelationKind, WorkItemInfo};

/// Cooperative cancellation flag shared between a caller and a fetch.
///
/// Checked before every wave and every chunk request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns [`DevOpsError::Cancelled`] once [`cancel`](Self::cancel) has
    /// been called.
    pub fn check(&self) -> Result<(), DevOpsError> {
        if self.is_cancelled() {
            Err(DevOpsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which relations a tree fetch follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Hierarchy-Forward links (downwards).
    Children,
    /// Hierarchy-Reverse links (upwards).
    Parents,
    Both,
}

impl Traversal {
    const fn follows(self, kind: RelationKind) -> bool {
        matches!(
            (self, kind),
            (Self::Children | Self::Both, RelationKind::HierarchyForward)
                | (Self::Parents | Self::Both, RelationKind::HierarchyReverse)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub batch_size: usize,
    pub max_waves: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchLimits {
    fn from(config: &FetchConfig) -> Self {
        Self {
            batch_size: config.effective_batch_size(),
            max_waves: config.effective_max_waves(),
        }
    }
}

/// A fetched item with its hierarchy links, in link order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub info: WorkItemInfo,
    pub children: Vec<u32>,
    pub parents: Vec<u32>,
}

impl FetchedItem {
    /// # Errors
    ///
    /// Propagates [`WorkItemInfo::from_raw`] failures.
    pub fn from_raw(raw: &RawWorkItem) -> Result<Self, DevOpsError> {
        Ok(Self {
            info: WorkItemInfo::from_raw(raw)?,
            children: raw.linked_ids(RelationKind::HierarchyForward),
            parents: raw.linked_ids(RelationKind::HierarchyReverse),
        })
    }
}

/// Accumulated result of a tree fetch.
///
/// `order` records the sequence in which items arrived (wave by wave, chunk
/// by chunk); the assembler uses it for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedGraph {
    items: HashMap<u32, FetchedItem>,
    order: Vec<u32>,
}

impl FetchedGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. A repeated id keeps the first record.
    pub fn insert(&mut self, item: FetchedItem) {
        let id = item.info.id;
        if let std::collections::hash_map::Entry::Vacant(slot) = self.items.entry(id) {
            slot.insert(item);
            self.order.push(id);
        }
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&FetchedItem> {
        self.items.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.items.contains_key(&id)
    }

    /// Items in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &FetchedItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// First parent of `id` (in link order) satisfying `predicate`.
    pub fn first_parent_where(
        &self,
        id: u32,
        predicate: impl Fn(&WorkItemInfo) -> bool,
    ) -> Option<&FetchedItem> {
        self.get(id)?
            .parents
            .iter()
            .filter_map(|parent| self.get(*parent))
            .find(|parent| predicate(&parent.info))
    }
}

impl FromIterator<FetchedItem> for FetchedGraph {
    fn from_iter<I: IntoIterator<Item = FetchedItem>>(iter: I) -> Self {
        let mut graph = Self::new();
        for item in iter {
            graph.insert(item);
        }
        graph
    }
}

/// Fetch a known id set. Duplicates are dropped; the result follows the
/// first-seen order of `ids`.
///
/// # Errors
///
/// Any failing chunk, or cancellation.
#[instrument(skip_all, fields(ids = ids.len()))]
pub fn fetch_flat<A: WorkItemApi + ?Sized>(
    api: &A,
    ids: &[u32],
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<Vec<RawWorkItem>, DevOpsError> {
    let ids = dedup(ids.iter().copied());
    let position: HashMap<u32, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut seen = HashSet::new();
    let mut items: Vec<RawWorkItem> = fetch_chunks(api, &ids, batch_size, cancel)?
        .into_iter()
        .filter(|item| seen.insert(item.id))
        .collect();
    items.sort_by_key(|item| position.get(&item.id).copied().unwrap_or(usize::MAX));

    debug!(fetched = items.len(), "flat fetch complete");
    Ok(items)
}

/// Breadth-first fetch starting from `seeds`, following the relations
/// selected by `traversal` until no unseen id remains.
///
/// # Errors
///
/// Any failing chunk, an item missing a required field, cancellation, or
/// [`DevOpsError::WaveLimitExceeded`].
#[instrument(skip_all, fields(seeds = seeds.len(), traversal = ?traversal))]
pub fn fetch_tree<A: WorkItemApi + ?Sized>(
    api: &A,
    seeds: &[u32],
    traversal: Traversal,
    limits: FetchLimits,
    cancel: &CancelToken,
) -> Result<FetchedGraph, DevOpsError> {
    let mut graph = FetchedGraph::new();
    let mut fetched: HashSet<u32> = HashSet::new();
    let mut pending = dedup(seeds.iter().copied());
    let mut waves = 0_usize;

    while !pending.is_empty() {
        cancel.check()?;
        if waves >= limits.max_waves {
            return Err(DevOpsError::WaveLimitExceeded {
                waves,
                pending: pending.len(),
            });
        }
        waves += 1;
        debug!(wave = waves, ids = pending.len(), "fetching wave");

        fetched.extend(pending.iter().copied());
        let raw = fetch_chunks(api, &pending, limits.batch_size, cancel)?;

        let mut queued: HashSet<u32> = HashSet::new();
        let mut next = Vec::new();
        for item in &raw {
            for relation in item.relations() {
                if !traversal.follows(relation.kind()) {
                    continue;
                }
                if let Some(id) = relation.target_id() {
                    if !fetched.contains(&id) && queued.insert(id) {
                        next.push(id);
                    }
                }
            }
            graph.insert(FetchedItem::from_raw(item)?);
        }

        pending = next;
    }

    debug!(waves, items = graph.len(), "tree fetch complete");
    Ok(graph)
}

/// Split `ids` into chunks of at most `batch_size` and fetch them
/// concurrently, one scoped thread per chunk.
fn fetch_chunks<A: WorkItemApi + ?Sized>(
    api: &A,
    ids: &[u32],
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<Vec<RawWorkItem>, DevOpsError> {
    let chunks: Vec<&[u32]> = ids.chunks(batch_size.clamp(1, MAX_BATCH_SIZE)).collect();

    match chunks.as_slice() {
        [] => Ok(Vec::new()),
        [single] => {
            cancel.check()?;
            api.fetch_batch(single)
        }
        _ => {
            let results: Vec<Result<Vec<RawWorkItem>, DevOpsError>> = thread::scope(|scope| {
                let handles: Vec<_> = chunks
                    .iter()
                    .map(|chunk| {
                        scope.spawn(move || {
                            cancel.check()?;
                            api.fetch_batch(chunk)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(Err(DevOpsError::WorkerPanicked)))
                    .collect()
            });

            let mut items = Vec::with_capacity(ids.len());
            for result in results {
                items.extend(result?);
            }
            Ok(items)
        }
    }
}

fn dedup(ids: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{WiqlResult, WorkItemState};
    use serde_json::json;
    use std::sync::Mutex;

    /// In-memory api: serves canned items and records every batch request.
    struct Canned {
        items: HashMap<u32, RawWorkItem>,
        calls: Mutex<Vec<Vec<u32>>>,
        fail_on: Option<u32>,
    }

    impl Canned {
        fn new(items: Vec<RawWorkItem>) -> Self {
            Self {
                items: items.into_iter().map(|i| (i.id, i)).collect(),
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn calls(&self) -> Vec<Vec<u32>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WorkItemApi for Canned {
        fn run_wiql(&self, _query: &str) -> Result<WiqlResult, DevOpsError> {
            Ok(WiqlResult::default())
        }

        fn fetch_batch(&self, ids: &[u32]) -> Result<Vec<RawWorkItem>, DevOpsError> {
            self.calls.lock().unwrap().push(ids.to_vec());
            if self.fail_on.is_some_and(|bad| ids.contains(&bad)) {
                return Err(DevOpsError::Http {
                    status: 500,
                    reason: "Internal Server Error".to_string(),
                    detail: None,
                });
            }
            Ok(ids.iter().filter_map(|id| self.items.get(id).cloned()).collect())
        }

        fn update_state(&self, _id: u32, _state: &WorkItemState) -> Result<(), DevOpsError> {
            Ok(())
        }
    }

    fn item(id: u32, kind: &str, children: &[u32], parents: &[u32]) -> RawWorkItem {
        let mut relations = Vec::new();
        for child in children {
            relations.push(json!({
                "rel": "System.LinkTypes.Hierarchy-Forward",
                "url": format!("https://dev.azure.com/o/_apis/wit/workItems/{child}")
            }));
        }
        for parent in parents {
            relations.push(json!({
                "rel": "System.LinkTypes.Hierarchy-Reverse",
                "url": format!("https://dev.azure.com/o/_apis/wit/workItems/{parent}")
            }));
        }
        serde_json::from_value(json!({
            "id": id,
            "fields": {
                "System.Title": format!("item {id}"),
                "System.State": "New",
                "System.WorkItemType": kind
            },
            "relations": relations
        }))
        .unwrap()
    }

    #[test]
    fn flat_fetch_chunks_by_batch_size_and_keeps_input_order() {
        let items: Vec<RawWorkItem> = (1..=5).map(|id| item(id, "Task", &[], &[])).collect();
        let api = Canned::new(items);

        let fetched = fetch_flat(&api, &[5, 4, 3, 2, 1, 5], 2, &CancelToken::new()).unwrap();

        let ids: Vec<u32> = fetched.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);
        let mut sizes: Vec<usize> = api.calls().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[test]
    fn flat_fetch_of_nothing_makes_no_calls() {
        let api = Canned::new(Vec::new());
        assert!(fetch_flat(&api, &[], 200, &CancelToken::new()).unwrap().is_empty());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn tree_fetch_follows_children_in_waves_without_refetching() {
        // 1 -> {2, 3}, 2 -> {4}, 4 -> {1} (back edge to an already-fetched id)
        let api = Canned::new(vec![
            item(1, "Epic", &[2, 3], &[]),
            item(2, "Feature", &[4], &[1]),
            item(3, "Feature", &[], &[1]),
            item(4, "User Story", &[1], &[2]),
        ]);

        let graph = fetch_tree(
            &api,
            &[1],
            Traversal::Children,
            FetchLimits::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(api.calls(), vec![vec![1], vec![2, 3], vec![4]]);
        let order: Vec<u32> = graph.iter().map(|i| i.info.id).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(graph.get(1).unwrap().children, vec![2, 3]);
    }

    #[test]
    fn tree_fetch_upwards_follows_reverse_links_only() {
        let api = Canned::new(vec![
            item(10, "User Story", &[11], &[20]),
            item(20, "Feature", &[], &[30]),
            item(30, "Epic", &[], &[]),
        ]);

        let graph = fetch_tree(
            &api,
            &[10],
            Traversal::Parents,
            FetchLimits::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(graph.contains(30));
        assert!(!graph.contains(11));
        assert_eq!(api.calls().len(), 3);
    }

    #[test]
    fn wave_cap_stops_runaway_traversal() {
        let chain: Vec<RawWorkItem> = (1..=10).map(|id| item(id, "Epic", &[id + 1], &[])).collect();
        let api = Canned::new(chain);
        let limits = FetchLimits {
            batch_size: 200,
            max_waves: 3,
        };

        let err = fetch_tree(&api, &[1], Traversal::Children, limits, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DevOpsError::WaveLimitExceeded {
                waves: 3,
                pending: 1
            }
        ));
    }

    #[test]
    fn failing_chunk_aborts_the_fetch() {
        let mut api = Canned::new((1..=4).map(|id| item(id, "Task", &[], &[])).collect());
        api.fail_on = Some(3);

        let result = fetch_flat(&api, &[1, 2, 3, 4], 2, &CancelToken::new());
        assert!(matches!(result, Err(DevOpsError::Http { status: 500, .. })));
    }

    #[test]
    fn wide_tree_wave_is_split_into_batches() {
        let mut items = vec![item(1, "Epic", &[2, 3, 4, 5, 6], &[])];
        items.extend((2..=6).map(|id| item(id, "Feature", &[], &[1])));
        let api = Canned::new(items);
        let limits = FetchLimits {
            batch_size: 2,
            max_waves: 8,
        };

        let graph = fetch_tree(&api, &[1], Traversal::Children, limits, &CancelToken::new())
            .unwrap();

        assert_eq!(graph.len(), 6);
        let mut calls = api.calls();
        assert_eq!(calls.remove(0), vec![1]);
        calls.sort();
        assert_eq!(calls, vec![vec![2, 3], vec![4, 5], vec![6]]);
    }

    #[test]
    fn failing_chunk_in_later_wave_discards_the_tree() {
        let mut items = vec![item(1, "Epic", &[2, 3, 4], &[])];
        items.extend((2..=4).map(|id| item(id, "Feature", &[], &[1])));
        let mut api = Canned::new(items);
        api.fail_on = Some(4);
        let limits = FetchLimits {
            batch_size: 2,
            max_waves: 8,
        };

        let result = fetch_tree(&api, &[1], Traversal::Children, limits, &CancelToken::new());

        assert!(matches!(result, Err(DevOpsError::Http { status: 500, .. })));
        assert_eq!(api.calls().len(), 3);
    }

    #[test]
    fn cancelled_token_stops_before_any_request() {
        let api = Canned::new(vec![item(1, "Epic", &[], &[])]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = fetch_tree(
            &api,
            &[1],
            Traversal::Children,
            FetchLimits::default(),
            &cancel,
        );
        assert!(matches!(result, Err(DevOpsError::Cancelled)));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn first_parent_where_walks_link_order() {
        let graph: FetchedGraph = [
            item(1, "User Story", &[], &[2, 3]),
            item(2, "Epic", &[], &[]),
            item(3, "Feature", &[], &[]),
        ]
        .iter()
        .map(|raw| FetchedItem::from_raw(raw).unwrap())
        .collect();

        let feature = graph
            .first_parent_where(1, |info| info.work_item_type.as_str() == "Feature")
            .unwrap();
        assert_eq!(feature.info.id, 3);
        assert!(graph.first_parent_where(2, |_| true).is_none());
    }
}
