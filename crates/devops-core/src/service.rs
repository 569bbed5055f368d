//! Request orchestration: query → fetch → assemble → propagate.
//!
//! One [`HierarchyService`] call corresponds to one user action. All
//! accumulators live inside the call; nothing is shared between calls, so no
//! locking is needed.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use crate::area::normalize_area_path;
use crate::client::WorkItemApi;
use crate::config::FetchConfig;
use crate::error::DevOpsError;
use crate::fetch::{CancelToken, FetchLimits, Traversal, fetch_flat, fetch_tree};
use crate::hierarchy::assemble;
use crate::model::{
    StoryHierarchyDetails, WorkItemDetails, WorkItemInfo, WorkItemNode, WorkItemState,
    WorkItemType,
};
use crate::status::{invalid_nodes, propagate};
use crate::wiql;

/// A state correction planned or applied by [`HierarchyService::fix_states`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub id: u32,
    pub title: String,
    pub from: WorkItemState,
    pub to: WorkItemState,
    pub applied: bool,
}

pub struct HierarchyService<A> {
    api: A,
    limits: FetchLimits,
}

impl<A: WorkItemApi> HierarchyService<A> {
    #[must_use]
    pub fn new(api: A, fetch: &FetchConfig) -> Self {
        Self {
            api,
            limits: FetchLimits::from(fetch),
        }
    }

    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Open epics under `area` with their full descendant trees, every node
    /// propagated.
    ///
    /// # Errors
    ///
    /// Any query, fetch or assembly failure. Nothing partial is returned.
    #[instrument(skip(self, cancel))]
    pub fn epic_hierarchy(
        &self,
        area: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemNode>, DevOpsError> {
        let area = normalize_area_path(area);
        self.tree_from_query(&wiql::build_epics_wiql(&area), cancel)
    }

    /// Trees rooted in the result of a generic recursive link query.
    ///
    /// # Errors
    ///
    /// Any query, fetch or assembly failure.
    #[instrument(skip(self, cancel))]
    pub fn tree(
        &self,
        area: &str,
        state: &str,
        tags: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemNode>, DevOpsError> {
        let area = normalize_area_path(area);
        self.tree_from_query(&wiql::build_wiql(&area, state, tags), cancel)
    }

    /// Epics, features and stories in `states`, as flat rows.
    ///
    /// # Errors
    ///
    /// Any query or fetch failure.
    #[instrument(skip(self, cancel))]
    pub fn validation_items(
        &self,
        area: &str,
        states: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemDetails>, DevOpsError> {
        let area = normalize_area_path(area);
        self.details_from_query(&wiql::build_validation_wiql(&area, states), cancel)
    }

    /// User stories with the feature and epic above each of them.
    ///
    /// # Errors
    ///
    /// Any query or fetch failure.
    #[instrument(skip(self, cancel))]
    pub fn story_hierarchy(
        &self,
        area: &str,
        states: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<StoryHierarchyDetails>, DevOpsError> {
        cancel.check()?;
        let area = normalize_area_path(area);
        let seeds = self
            .api
            .run_wiql(&wiql::build_stories_wiql(&area, states))?
            .ids();

        let graph = fetch_tree(&self.api, &seeds, Traversal::Parents, self.limits, cancel)?;

        let stories = seeds
            .iter()
            .filter_map(|id| graph.get(*id))
            .filter(|item| item.info.work_item_type == WorkItemType::UserStory)
            .map(|story| {
                let feature = graph.first_parent_where(story.info.id, of_type(WorkItemType::Feature));
                let epic_anchor = feature.map_or(story.info.id, |f| f.info.id);
                let epic = graph.first_parent_where(epic_anchor, of_type(WorkItemType::Epic));

                StoryHierarchyDetails {
                    story: story.info.clone(),
                    feature: feature.map(|f| f.info.clone()),
                    epic: epic.map(|e| e.info.clone()),
                }
            })
            .collect::<Vec<_>>();

        info!(stories = stories.len(), "story hierarchy resolved");
        Ok(stories)
    }

    /// Title or id search under `area`.
    ///
    /// # Errors
    ///
    /// Any query or fetch failure.
    #[instrument(skip(self, cancel))]
    pub fn search(
        &self,
        area: &str,
        term: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemDetails>, DevOpsError> {
        let area = normalize_area_path(area);
        self.details_from_query(&wiql::build_search_wiql(&area, term), cancel)
    }

    /// Stories and bugs closed on or after `since`.
    ///
    /// # Errors
    ///
    /// Any query or fetch failure.
    #[instrument(skip(self, cancel))]
    pub fn closed_since(
        &self,
        area: &str,
        since: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemDetails>, DevOpsError> {
        let area = normalize_area_path(area);
        self.details_from_query(&wiql::build_metrics_wiql(&area, since), cancel)
    }

    /// Move every inconsistent node of a propagated forest to its expected
    /// state. With `dry_run` nothing is written.
    ///
    /// Updates are applied in pre-order and stop at the first failure.
    ///
    /// # Errors
    ///
    /// The first failing update, or cancellation.
    #[instrument(skip(self, roots, cancel))]
    pub fn fix_states(
        &self,
        roots: &[WorkItemNode],
        dry_run: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<StateChange>, DevOpsError> {
        let mut changes = Vec::new();
        for mismatch in invalid_nodes(roots) {
            if !dry_run {
                cancel.check()?;
                self.api.update_state(mismatch.id, &mismatch.expected)?;
                info!(id = mismatch.id, to = %mismatch.expected, "state updated");
            }
            changes.push(StateChange {
                id: mismatch.id,
                title: mismatch.title,
                from: mismatch.actual,
                to: mismatch.expected,
                applied: !dry_run,
            });
        }
        Ok(changes)
    }

    /// Set one work item's state.
    ///
    /// # Errors
    ///
    /// Any non-success response.
    pub fn set_state(&self, id: u32, state: &WorkItemState) -> Result<(), DevOpsError> {
        self.api.update_state(id, state)
    }

    fn tree_from_query(
        &self,
        query: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemNode>, DevOpsError> {
        cancel.check()?;
        let seeds = self.api.run_wiql(query)?.ids();
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let graph = fetch_tree(&self.api, &seeds, Traversal::Children, self.limits, cancel)?;
        let mut roots = assemble(&graph)?;
        propagate(&mut roots);

        info!(items = graph.len(), roots = roots.len(), "hierarchy assembled");
        Ok(roots)
    }

    fn details_from_query(
        &self,
        query: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<WorkItemDetails>, DevOpsError> {
        cancel.check()?;
        let ids = self.api.run_wiql(query)?.ids();
        fetch_flat(&self.api, &ids, self.limits.batch_size, cancel)?
            .iter()
            .map(WorkItemDetails::from_raw)
            .collect()
    }
}

fn of_type(kind: WorkItemType) -> impl Fn(&WorkItemInfo) -> bool {
    move |info| info.work_item_type == kind
}
