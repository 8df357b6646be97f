//! Core domain types and traits for the distbot automation service.
//!
//! This crate contains:
//! - Typed identifiers for persisted resources
//! - Status enums shared by the schema, handlers and API
//! - Project references and package/job configuration types
//! - The typed `Event` produced by the parser
//! - Service traits for forges and build/test/release backends

pub mod backends;
pub mod error;
pub mod event;
pub mod forge;
pub mod id;
pub mod job;
pub mod project;
pub mod result;
pub mod status;

pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use id::ResourceId;
pub use job::{JobConfig, JobTrigger, JobType, PackageConfig};
pub use project::{ForgeKind, ProjectRef};
pub use forge::{CommentTarget, CommitStatus, ForgeResolver, GitForge, Issue, NewPullRequest};
pub use result::TaskResults;
pub use status::{BuildStatus, CommitState};
