//! devops-core library.
//!
//! Work-item hierarchy and status engine for Azure DevOps: WIQL builders,
//! area-path normalization, batched relation-expanding fetches, tree
//! assembly, and bottom-up expected-state propagation.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums; [`error::DevOpsError`] is the one
//!   value every public operation returns.
//! - **Logging**: `tracing` macros and `#[instrument]` spans. The PAT is
//!   never logged.
//! - **Configuration**: [`config::Settings`] is passed explicitly; there is
//!   no global state.

pub mod area;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hierarchy;
pub mod model;
pub mod service;
pub mod status;
pub mod wiql;

pub use client::{AzureDevOpsClient, WorkItemApi};
pub use config::Settings;
pub use error::DevOpsError;
pub use fetch::CancelToken;
pub use model::{WorkItemInfo, WorkItemNode, WorkItemState, WorkItemType};
pub use service::HierarchyService;
