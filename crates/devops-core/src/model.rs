//! Typed work-item records.
//!
//! Azure DevOps hands back work items as loosely-typed field dictionaries.
//! Everything in this module is the strongly-typed side of that boundary:
//! states and types are canonicalized once at ingestion (case-insensitive),
//! and required fields are checked when a [`RawWorkItem`] is converted, so
//! downstream code never re-compares raw strings.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DevOpsError;

pub const FIELD_TITLE: &str = "System.Title";
pub const FIELD_STATE: &str = "System.State";
pub const FIELD_TYPE: &str = "System.WorkItemType";
pub const FIELD_AREA_PATH: &str = "System.AreaPath";
pub const FIELD_ITERATION_PATH: &str = "System.IterationPath";
pub const FIELD_TAGS: &str = "System.Tags";
pub const FIELD_PARENT: &str = "System.Parent";

pub const REL_HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";
pub const REL_HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";

// ---------------------------------------------------------------------------
// Canonical state / type
// ---------------------------------------------------------------------------

/// Workflow state of a work item.
///
/// Known states are matched case-insensitively; anything else is kept as
/// [`WorkItemState::Other`] and still compares case-insensitively.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkItemState {
    New,
    Active,
    Resolved,
    Closed,
    Removed,
    Done,
    Other(String),
}

impl WorkItemState {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "active" => Self::Active,
            "resolved" => Self::Resolved,
            "closed" => Self::Closed,
            "removed" => Self::Removed,
            "done" => Self::Done,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "New",
            Self::Active => "Active",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
            Self::Removed => "Removed",
            Self::Done => "Done",
            Self::Other(raw) => raw,
        }
    }

    /// Closed, Removed or Done: nothing left to do.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Removed | Self::Done)
    }

    #[must_use]
    pub const fn is_closed_or_removed(&self) -> bool {
        matches!(self, Self::Closed | Self::Removed)
    }
}

impl PartialEq for WorkItemState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Other(a), Self::Other(b)) => a.eq_ignore_ascii_case(b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Hash for WorkItemState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        if let Self::Other(raw) = self {
            raw.to_ascii_lowercase().hash(state);
        }
    }
}

impl From<String> for WorkItemState {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for WorkItemState {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<WorkItemState> for String {
    fn from(state: WorkItemState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Work item type, canonicalized the same way as [`WorkItemState`].
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkItemType {
    Epic,
    Feature,
    UserStory,
    Task,
    Bug,
    Other(String),
}

impl WorkItemType {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "epic" => Self::Epic,
            "feature" => Self::Feature,
            "user story" => Self::UserStory,
            "task" => Self::Task,
            "bug" => Self::Bug,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::UserStory => "User Story",
            Self::Task => "Task",
            Self::Bug => "Bug",
            Self::Other(raw) => raw,
        }
    }

    /// Tasks and bugs are leaf-level work that never owns children.
    #[must_use]
    pub const fn is_task_or_bug(&self) -> bool {
        matches!(self, Self::Task | Self::Bug)
    }
}

impl PartialEq for WorkItemType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Other(a), Self::Other(b)) => a.eq_ignore_ascii_case(b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Hash for WorkItemType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        if let Self::Other(raw) = self {
            raw.to_ascii_lowercase().hash(state);
        }
    }
}

impl From<String> for WorkItemType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for WorkItemType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<WorkItemType> for String {
    fn from(kind: WorkItemType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// A relation link as returned with `$expand=relations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub rel: String,
    pub url: String,
}

/// Classification of a [`Relation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Parent to child.
    HierarchyForward,
    /// Child to parent.
    HierarchyReverse,
    Other,
}

impl Relation {
    #[must_use]
    pub fn kind(&self) -> RelationKind {
        if self.rel.eq_ignore_ascii_case(REL_HIERARCHY_FORWARD) {
            RelationKind::HierarchyForward
        } else if self.rel.eq_ignore_ascii_case(REL_HIERARCHY_REVERSE) {
            RelationKind::HierarchyReverse
        } else {
            RelationKind::Other
        }
    }

    /// Work item id embedded as the last path segment of `url`.
    #[must_use]
    pub fn target_id(&self) -> Option<u32> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
    }
}

/// One element of a `workitems` batch response, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWorkItem {
    pub id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub relations: Option<Vec<Relation>>,
}

impl RawWorkItem {
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        self.relations.as_deref().unwrap_or_default()
    }

    /// Ids linked with the given relation kind, in link order.
    #[must_use]
    pub fn linked_ids(&self, kind: RelationKind) -> Vec<u32> {
        let mut ids = Vec::new();
        for relation in self.relations() {
            if relation.kind() != kind {
                continue;
            }
            match relation.target_id() {
                Some(id) if !ids.contains(&id) => ids.push(id),
                _ => {}
            }
        }
        ids
    }

    fn required_str(&self, field: &'static str) -> Result<&str, DevOpsError> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .ok_or(DevOpsError::MissingField { id: self.id, field })
    }

    fn optional_str(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

/// `workitems?ids=` response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkItemBatch {
    #[serde(default)]
    pub value: Vec<RawWorkItem>,
}

/// `{ "id": .. }` reference inside a WIQL response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkItemRef {
    pub id: u32,
    #[serde(default)]
    pub url: String,
}

/// Source/target pair returned by a `WorkItemLinks` query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkItemLink {
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default)]
    pub source: Option<WorkItemRef>,
    #[serde(default)]
    pub target: Option<WorkItemRef>,
}

/// Result of executing a WIQL query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResult {
    #[serde(default)]
    pub work_items: Vec<WorkItemRef>,
    #[serde(default)]
    pub work_item_relations: Vec<WorkItemLink>,
}

impl WiqlResult {
    /// Every referenced id, deduplicated, in first-seen order.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let link_ids = self.work_item_relations.iter().flat_map(|link| {
            [link.source.as_ref(), link.target.as_ref()]
                .into_iter()
                .flatten()
                .map(|r| r.id)
        });

        let mut seen = std::collections::HashSet::new();
        self.work_items
            .iter()
            .map(|r| r.id)
            .chain(link_ids)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// The identity and headline fields of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemInfo {
    pub id: u32,
    pub title: String,
    pub state: WorkItemState,
    pub work_item_type: WorkItemType,
    pub url: String,
}

impl WorkItemInfo {
    /// Validate a raw record. Title, state and type are required.
    ///
    /// # Errors
    ///
    /// Returns [`DevOpsError::MissingField`] naming the first absent field.
    pub fn from_raw(raw: &RawWorkItem) -> Result<Self, DevOpsError> {
        Ok(Self {
            id: raw.id,
            title: raw.required_str(FIELD_TITLE)?.to_string(),
            state: WorkItemState::parse(raw.required_str(FIELD_STATE)?),
            work_item_type: WorkItemType::parse(raw.required_str(FIELD_TYPE)?),
            url: raw.url.clone(),
        })
    }
}

/// Flat row used by tabular and validation views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemDetails {
    #[serde(flatten)]
    pub info: WorkItemInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u32>,
}

impl WorkItemDetails {
    /// # Errors
    ///
    /// Same as [`WorkItemInfo::from_raw`].
    pub fn from_raw(raw: &RawWorkItem) -> Result<Self, DevOpsError> {
        let parent_id = raw
            .fields
            .get(FIELD_PARENT)
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .or_else(|| raw.linked_ids(RelationKind::HierarchyReverse).first().copied());

        Ok(Self {
            info: WorkItemInfo::from_raw(raw)?,
            area_path: raw.optional_str(FIELD_AREA_PATH).map(str::to_string),
            iteration_path: raw.optional_str(FIELD_ITERATION_PATH).map(str::to_string),
            tags: raw.optional_str(FIELD_TAGS).map(split_tags).unwrap_or_default(),
            parent_id,
        })
    }
}

/// A user story together with the feature and epic above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryHierarchyDetails {
    pub story: WorkItemInfo,
    pub feature: Option<WorkItemInfo>,
    pub epic: Option<WorkItemInfo>,
}

/// A node of the materialized hierarchy.
///
/// `expected_state` and `status_valid` are filled by
/// [`crate::status::propagate`]; a fresh node starts out as a consistent
/// leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemNode {
    pub info: WorkItemInfo,
    pub children: Vec<WorkItemNode>,
    pub expected_state: WorkItemState,
    pub status_valid: bool,
}

impl WorkItemNode {
    #[must_use]
    pub fn new(info: WorkItemInfo) -> Self {
        let expected_state = info.state.clone();
        Self {
            info,
            children: Vec::new(),
            expected_state,
            status_valid: true,
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
