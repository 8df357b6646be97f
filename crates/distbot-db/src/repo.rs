//! Repository traits and implementations.

pub mod allowlist;
pub mod copr;
pub mod koji;
pub mod pipeline;
pub mod project;
pub mod srpm;
pub mod sync_release;
pub mod testing_farm;
pub mod vm_image;

pub use allowlist::{AllowlistEntry, AllowlistRepo, PgAllowlistRepo};
pub use copr::{CoprBuildGroup, CoprBuildRepo, CoprBuildTarget, NewCoprBuild, PgCoprBuildRepo};
pub use koji::{KojiBuildGroup, KojiBuildRepo, KojiBuildTarget, NewKojiBuild, PgKojiBuildRepo};
pub use pipeline::{NewPipeline, PgPipelineRepo, Pipeline, PipelineArtifact, PipelineRepo};
pub use project::{GitProject, JobTriggerRecord, PgProjectRepo, ProjectRepo};
pub use srpm::{PgSrpmBuildRepo, SrpmBuild, SrpmBuildRepo};
pub use sync_release::{
    PgSyncReleaseRepo, SyncReleaseRepo, SyncReleaseRun, SyncReleaseTarget, SyncTargetUpdate,
};
pub use testing_farm::{NewTestRun, PgTestRunRepo, TestRunGroup, TestRunRepo, TestRunTarget};
pub use vm_image::{NewVmImageBuild, PgVmImageBuildRepo, VmImageBuild, VmImageBuildRepo};

use chrono::{DateTime, Utc};
use distbot_core::status::BuildStatus;

/// Partial update of a build target; `None` fields are left untouched and
/// `data` is merged into the stored JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildUpdate {
    pub status: Option<BuildStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
    pub web_url: Option<String>,
    pub logs_url: Option<String>,
    pub data: Option<serde_json::Value>,
    pub built_packages: Option<serde_json::Value>,
}

impl BuildUpdate {
    pub fn status(status: BuildStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
