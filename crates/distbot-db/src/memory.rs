//! In-memory repositories for tests.

use async_trait::async_trait;
use chrono::Utc;
use distbot_core::ProjectRef;
use distbot_core::status::{
    AllowlistStatus, BuildStatus, ProjectEventType, SyncReleaseJobType, SyncReleaseStatus,
    SyncReleaseTargetStatus, TestingFarmResult, VmImageBuildStatus,
};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::repo::*;
use crate::{DbError, DbResult, Store};

#[derive(Default)]
struct State {
    projects: Vec<GitProject>,
    triggers: Vec<JobTriggerRecord>,
    pipelines: Vec<Pipeline>,
    srpm_builds: Vec<SrpmBuild>,
    copr_groups: Vec<CoprBuildGroup>,
    copr_builds: Vec<CoprBuildTarget>,
    koji_groups: Vec<KojiBuildGroup>,
    koji_builds: Vec<KojiBuildTarget>,
    test_groups: Vec<TestRunGroup>,
    test_runs: Vec<TestRunTarget>,
    test_copr_links: Vec<(Uuid, Uuid)>,
    sync_runs: Vec<SyncReleaseRun>,
    sync_targets: Vec<SyncReleaseTarget>,
    vm_image_builds: Vec<VmImageBuild>,
    allowlist: Vec<AllowlistEntry>,
}

/// Implements every repository trait over plain vectors.
#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

impl MemoryDb {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store {
    /// A store backed by one shared `MemoryDb`.
    pub fn memory() -> (Self, Arc<MemoryDb>) {
        let db = Arc::new(MemoryDb::default());
        let store = Store {
            projects: db.clone(),
            pipelines: db.clone(),
            srpm_builds: db.clone(),
            copr_builds: db.clone(),
            koji_builds: db.clone(),
            test_runs: db.clone(),
            sync_releases: db.clone(),
            vm_image_builds: db.clone(),
            allowlist: db.clone(),
        };
        (store, db)
    }
}

fn merge(target: &mut serde_json::Value, patch: Option<serde_json::Value>) {
    if let (Some(map), Some(serde_json::Value::Object(patch))) = (target.as_object_mut(), patch) {
        map.extend(patch);
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> DbError {
    DbError::NotFound(format!("{} {}", what, id))
}

fn page<T: Clone>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl ProjectRepo for MemoryDb {
    async fn get_or_create_project(&self, project: &ProjectRef) -> DbResult<GitProject> {
        let mut state = self.state();
        let url = project.project_url();
        if let Some(existing) = state.projects.iter().find(|p| p.project_url == url) {
            return Ok(existing.clone());
        }
        let record = GitProject {
            id: Uuid::now_v7(),
            namespace: project.namespace.clone(),
            repo_name: project.repo.clone(),
            project_url: url,
            instance_url: project.instance_url.clone(),
            created_at: Utc::now(),
        };
        state.projects.push(record.clone());
        Ok(record)
    }

    async fn get_project(&self, id: Uuid) -> DbResult<GitProject> {
        self.state()
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found("project", id))
    }

    async fn get_or_create_trigger(
        &self,
        project_id: Uuid,
        trigger_type: ProjectEventType,
        identifier: &str,
    ) -> DbResult<JobTriggerRecord> {
        let mut state = self.state();
        if let Some(existing) = state.triggers.iter().find(|t| {
            t.project_id == project_id && t.trigger_type == trigger_type && t.identifier == identifier
        }) {
            return Ok(existing.clone());
        }
        let record = JobTriggerRecord {
            id: Uuid::now_v7(),
            trigger_type,
            project_id,
            identifier: identifier.to_string(),
            created_at: Utc::now(),
        };
        state.triggers.push(record.clone());
        Ok(record)
    }

    async fn get_trigger(&self, id: Uuid) -> DbResult<JobTriggerRecord> {
        self.state()
            .triggers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| not_found("job trigger", id))
    }
}

#[async_trait]
impl PipelineRepo for MemoryDb {
    async fn create(&self, pipeline: NewPipeline) -> DbResult<Pipeline> {
        let id = |pick: fn(&PipelineArtifact) -> bool| pipeline.artifact_id(pick);
        let record = Pipeline {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            job_trigger_id: pipeline.job_trigger_id,
            srpm_build_id: pipeline.srpm_build_id,
            copr_build_group_id: id(|a| matches!(a, PipelineArtifact::CoprBuildGroup(_))),
            koji_build_group_id: id(|a| matches!(a, PipelineArtifact::KojiBuildGroup(_))),
            test_run_group_id: id(|a| matches!(a, PipelineArtifact::TestRunGroup(_))),
            sync_release_run_id: id(|a| matches!(a, PipelineArtifact::SyncReleaseRun(_))),
            vm_image_build_id: id(|a| matches!(a, PipelineArtifact::VmImageBuild(_))),
        };
        self.state().pipelines.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> DbResult<Pipeline> {
        self.state()
            .pipelines
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found("pipeline", id))
    }

    async fn find_by_artifact(&self, artifact: PipelineArtifact) -> DbResult<Vec<Pipeline>> {
        Ok(self
            .state()
            .pipelines
            .iter()
            .filter(|p| p.artifact() == Some(artifact))
            .cloned()
            .collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<Pipeline>> {
        Ok(page(self.state().pipelines.iter().rev().cloned(), limit, offset))
    }
}

#[async_trait]
impl SrpmBuildRepo for MemoryDb {
    async fn create(&self, commit_sha: &str, status: BuildStatus) -> DbResult<SrpmBuild> {
        let record = SrpmBuild {
            id: Uuid::now_v7(),
            status,
            logs: None,
            url: None,
            logs_url: None,
            copr_build_id: None,
            copr_web_url: None,
            commit_sha: Some(commit_sha.to_string()),
            submitted_time: Utc::now(),
            start_time: None,
            finished_time: None,
        };
        self.state().srpm_builds.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> DbResult<SrpmBuild> {
        self.state()
            .srpm_builds
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("SRPM build", id))
    }

    async fn get_by_copr_build_id(&self, copr_build_id: &str) -> DbResult<Option<SrpmBuild>> {
        Ok(self
            .state()
            .srpm_builds
            .iter()
            .rev()
            .find(|s| s.copr_build_id.as_deref() == Some(copr_build_id))
            .cloned())
    }

    async fn set_copr_build(&self, id: Uuid, copr_build_id: &str, web_url: &str) -> DbResult<()> {
        let mut state = self.state();
        let srpm = state
            .srpm_builds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("SRPM build", id))?;
        srpm.copr_build_id = Some(copr_build_id.to_string());
        srpm.copr_web_url = Some(web_url.to_string());
        Ok(())
    }

    async fn update(&self, id: Uuid, update: BuildUpdate) -> DbResult<SrpmBuild> {
        let mut state = self.state();
        let srpm = state
            .srpm_builds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("SRPM build", id))?;
        if let Some(status) = update.status {
            srpm.status = status;
        }
        srpm.start_time = update.start_time.or(srpm.start_time);
        srpm.finished_time = update.finished_time.or(srpm.finished_time);
        srpm.logs_url = update.logs_url.or(srpm.logs_url.take());
        if let Some(url) = update
            .data
            .as_ref()
            .and_then(|d| d.get("url"))
            .and_then(|u| u.as_str())
        {
            srpm.url = Some(url.to_string());
        }
        Ok(srpm.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<SrpmBuild>> {
        Ok(page(self.state().srpm_builds.iter().rev().cloned(), limit, offset))
    }
}

#[async_trait]
impl CoprBuildRepo for MemoryDb {
    async fn create_group(&self) -> DbResult<CoprBuildGroup> {
        let group = CoprBuildGroup {
            id: Uuid::now_v7(),
            submitted_time: Utc::now(),
        };
        self.state().copr_groups.push(group.clone());
        Ok(group)
    }

    async fn create_target(&self, build: NewCoprBuild) -> DbResult<CoprBuildTarget> {
        let record = CoprBuildTarget {
            id: Uuid::now_v7(),
            build_id: build.build_id,
            commit_sha: build.commit_sha,
            status: build.status,
            target: build.target,
            owner: build.owner,
            project_name: build.project_name,
            web_url: build.web_url,
            build_logs_url: None,
            built_packages: None,
            data: serde_json::json!({}),
            task_accepted_time: None,
            submitted_time: Utc::now(),
            start_time: None,
            finished_time: None,
            copr_build_group_id: Some(build.group_id),
        };
        self.state().copr_builds.push(record.clone());
        Ok(record)
    }

    async fn get_target(&self, id: Uuid) -> DbResult<CoprBuildTarget> {
        self.state()
            .copr_builds
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| not_found("Copr build", id))
    }

    async fn get_by_build(&self, build_id: &str, target: &str) -> DbResult<Option<CoprBuildTarget>> {
        Ok(self
            .state()
            .copr_builds
            .iter()
            .find(|b| b.build_id == build_id && b.target == target)
            .cloned())
    }

    async fn list_by_build(&self, build_id: &str) -> DbResult<Vec<CoprBuildTarget>> {
        Ok(self
            .state()
            .copr_builds
            .iter()
            .filter(|b| b.build_id == build_id)
            .cloned()
            .collect())
    }

    async fn list_by_commit(&self, commit_sha: &str) -> DbResult<Vec<CoprBuildTarget>> {
        Ok(self
            .state()
            .copr_builds
            .iter()
            .rev()
            .filter(|b| b.commit_sha == commit_sha)
            .cloned()
            .collect())
    }

    async fn targets_of_group(&self, group_id: Uuid) -> DbResult<Vec<CoprBuildTarget>> {
        Ok(self
            .state()
            .copr_builds
            .iter()
            .filter(|b| b.copr_build_group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn set_build_id(&self, group_id: Uuid, build_id: &str, web_url: &str) -> DbResult<()> {
        for build in self
            .state()
            .copr_builds
            .iter_mut()
            .filter(|b| b.copr_build_group_id == Some(group_id))
        {
            build.build_id = build_id.to_string();
            build.web_url = Some(web_url.to_string());
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, update: BuildUpdate) -> DbResult<CoprBuildTarget> {
        let mut state = self.state();
        let build = state
            .copr_builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("Copr build", id))?;
        if let Some(status) = update.status {
            build.status = status;
        }
        build.start_time = update.start_time.or(build.start_time);
        build.finished_time = update.finished_time.or(build.finished_time);
        build.web_url = update.web_url.or(build.web_url.take());
        build.build_logs_url = update.logs_url.or(build.build_logs_url.take());
        build.built_packages = update.built_packages.or(build.built_packages.take());
        merge(&mut build.data, update.data);
        Ok(build.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<CoprBuildTarget>> {
        Ok(page(self.state().copr_builds.iter().rev().cloned(), limit, offset))
    }
}

#[async_trait]
impl KojiBuildRepo for MemoryDb {
    async fn create_group(&self) -> DbResult<KojiBuildGroup> {
        let group = KojiBuildGroup {
            id: Uuid::now_v7(),
            submitted_time: Utc::now(),
        };
        self.state().koji_groups.push(group.clone());
        Ok(group)
    }

    async fn create_target(&self, build: NewKojiBuild) -> DbResult<KojiBuildTarget> {
        let record = KojiBuildTarget {
            id: Uuid::now_v7(),
            build_id: build.build_id,
            commit_sha: build.commit_sha,
            status: build.status,
            target: build.target,
            web_url: build.web_url,
            build_logs_url: build.build_logs_url,
            scratch: build.scratch,
            data: build.data,
            submitted_time: Utc::now(),
            start_time: None,
            finished_time: None,
            koji_build_group_id: Some(build.group_id),
        };
        self.state().koji_builds.push(record.clone());
        Ok(record)
    }

    async fn get_target(&self, id: Uuid) -> DbResult<KojiBuildTarget> {
        self.state()
            .koji_builds
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| not_found("Koji build", id))
    }

    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<KojiBuildTarget>> {
        Ok(self
            .state()
            .koji_builds
            .iter()
            .rev()
            .find(|b| b.build_id == build_id)
            .cloned())
    }

    async fn targets_of_group(&self, group_id: Uuid) -> DbResult<Vec<KojiBuildTarget>> {
        Ok(self
            .state()
            .koji_builds
            .iter()
            .filter(|b| b.koji_build_group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, update: BuildUpdate) -> DbResult<KojiBuildTarget> {
        let mut state = self.state();
        let build = state
            .koji_builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("Koji build", id))?;
        if let Some(status) = update.status {
            build.status = status;
        }
        build.start_time = update.start_time.or(build.start_time);
        build.finished_time = update.finished_time.or(build.finished_time);
        build.web_url = update.web_url.or(build.web_url.take());
        build.build_logs_url = update.logs_url.or(build.build_logs_url.take());
        merge(&mut build.data, update.data);
        Ok(build.clone())
    }

    async fn list(
        &self,
        scratch: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<KojiBuildTarget>> {
        let state = self.state();
        let builds = state
            .koji_builds
            .iter()
            .rev()
            .filter(|b| scratch.is_none_or(|s| b.scratch == s))
            .cloned();
        Ok(page(builds, limit, offset))
    }
}

#[async_trait]
impl TestRunRepo for MemoryDb {
    async fn create_group(&self) -> DbResult<TestRunGroup> {
        let group = TestRunGroup {
            id: Uuid::now_v7(),
            submitted_time: Utc::now(),
        };
        self.state().test_groups.push(group.clone());
        Ok(group)
    }

    async fn create_target(&self, run: NewTestRun) -> DbResult<TestRunTarget> {
        let record = TestRunTarget {
            id: Uuid::now_v7(),
            pipeline_id: None,
            identifier: run.identifier,
            commit_sha: run.commit_sha,
            status: run.status,
            target: run.target,
            web_url: None,
            data: run.data,
            submitted_time: Utc::now(),
            tft_test_run_group_id: Some(run.group_id),
        };
        let mut state = self.state();
        for copr_id in run.copr_build_ids {
            state.test_copr_links.push((copr_id, record.id));
        }
        state.test_runs.push(record.clone());
        Ok(record)
    }

    async fn get_target(&self, id: Uuid) -> DbResult<TestRunTarget> {
        self.state()
            .test_runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found("test run", id))
    }

    async fn get_by_pipeline_id(&self, pipeline_id: &str) -> DbResult<Option<TestRunTarget>> {
        Ok(self
            .state()
            .test_runs
            .iter()
            .find(|r| r.pipeline_id.as_deref() == Some(pipeline_id))
            .cloned())
    }

    async fn set_submitted(&self, id: Uuid, pipeline_id: &str, web_url: &str) -> DbResult<()> {
        let mut state = self.state();
        let run = state
            .test_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("test run", id))?;
        run.pipeline_id = Some(pipeline_id.to_string());
        run.web_url = Some(web_url.to_string());
        run.status = TestingFarmResult::Queued;
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: TestingFarmResult,
        web_url: Option<&str>,
    ) -> DbResult<()> {
        let mut state = self.state();
        let run = state
            .test_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("test run", id))?;
        run.status = status;
        if let Some(url) = web_url {
            run.web_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn targets_of_group(&self, group_id: Uuid) -> DbResult<Vec<TestRunTarget>> {
        Ok(self
            .state()
            .test_runs
            .iter()
            .filter(|r| r.tft_test_run_group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn copr_builds_of(&self, id: Uuid) -> DbResult<Vec<Uuid>> {
        Ok(self
            .state()
            .test_copr_links
            .iter()
            .filter(|(_, tft)| *tft == id)
            .map(|(copr, _)| *copr)
            .collect())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<TestRunTarget>> {
        Ok(page(self.state().test_runs.iter().rev().cloned(), limit, offset))
    }
}

#[async_trait]
impl SyncReleaseRepo for MemoryDb {
    async fn create_run(
        &self,
        job_type: SyncReleaseJobType,
        status: SyncReleaseStatus,
    ) -> DbResult<SyncReleaseRun> {
        let run = SyncReleaseRun {
            id: Uuid::now_v7(),
            status,
            job_type,
            submitted_time: Utc::now(),
        };
        self.state().sync_runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> DbResult<SyncReleaseRun> {
        self.state()
            .sync_runs
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| not_found("sync release run", id))
    }

    async fn set_run_status(&self, id: Uuid, status: SyncReleaseStatus) -> DbResult<()> {
        let mut state = self.state();
        let run = state
            .sync_runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("sync release run", id))?;
        run.status = status;
        Ok(())
    }

    async fn create_target(
        &self,
        run_id: Uuid,
        branch: &str,
        status: SyncReleaseTargetStatus,
    ) -> DbResult<SyncReleaseTarget> {
        let target = SyncReleaseTarget {
            id: Uuid::now_v7(),
            branch: branch.to_string(),
            downstream_pr_url: None,
            status,
            logs: None,
            submitted_time: Utc::now(),
            start_time: None,
            finished_time: None,
            sync_release_id: run_id,
        };
        self.state().sync_targets.push(target.clone());
        Ok(target)
    }

    async fn update_target(&self, id: Uuid, update: SyncTargetUpdate) -> DbResult<SyncReleaseTarget> {
        let mut state = self.state();
        let target = state
            .sync_targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found("sync release target", id))?;
        if let Some(status) = update.status {
            target.status = status;
        }
        target.downstream_pr_url = update.downstream_pr_url.or(target.downstream_pr_url.take());
        target.logs = update.logs.or(target.logs.take());
        target.start_time = update.start_time.or(target.start_time);
        target.finished_time = update.finished_time.or(target.finished_time);
        Ok(target.clone())
    }

    async fn targets_of_run(&self, run_id: Uuid) -> DbResult<Vec<SyncReleaseTarget>> {
        Ok(self
            .state()
            .sync_targets
            .iter()
            .filter(|t| t.sync_release_id == run_id)
            .cloned()
            .collect())
    }

    async fn list_runs(
        &self,
        job_type: Option<SyncReleaseJobType>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<SyncReleaseRun>> {
        let state = self.state();
        let runs = state
            .sync_runs
            .iter()
            .rev()
            .filter(|r| job_type.is_none_or(|t| r.job_type == t))
            .cloned();
        Ok(page(runs, limit, offset))
    }
}

#[async_trait]
impl VmImageBuildRepo for MemoryDb {
    async fn create(&self, build: NewVmImageBuild) -> DbResult<VmImageBuild> {
        let record = VmImageBuild {
            id: Uuid::now_v7(),
            build_id: build.build_id,
            commit_sha: build.commit_sha,
            target: build.target,
            owner: build.owner,
            project_name: build.project_name,
            project_url: build.project_url,
            status: build.status,
            data: build.data,
            submitted_time: Utc::now(),
            start_time: None,
            finished_time: None,
        };
        self.state().vm_image_builds.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> DbResult<VmImageBuild> {
        self.state()
            .vm_image_builds
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| not_found("VM image build", id))
    }

    async fn get_by_build_id(&self, build_id: &str) -> DbResult<Option<VmImageBuild>> {
        Ok(self
            .state()
            .vm_image_builds
            .iter()
            .find(|b| b.build_id == build_id)
            .cloned())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: VmImageBuildStatus,
        data: Option<serde_json::Value>,
    ) -> DbResult<VmImageBuild> {
        let mut state = self.state();
        let build = state
            .vm_image_builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("VM image build", id))?;
        build.status = status;
        merge(&mut build.data, data);
        if status == VmImageBuildStatus::Building && build.start_time.is_none() {
            build.start_time = Some(Utc::now());
        }
        if status.is_final() {
            build.finished_time = Some(Utc::now());
        }
        Ok(build.clone())
    }

    async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<VmImageBuild>> {
        Ok(page(self.state().vm_image_builds.iter().rev().cloned(), limit, offset))
    }
}

#[async_trait]
impl AllowlistRepo for MemoryDb {
    async fn get(&self, namespace: &str) -> DbResult<Option<AllowlistEntry>> {
        Ok(self
            .state()
            .allowlist
            .iter()
            .find(|e| e.namespace == namespace)
            .cloned())
    }

    async fn upsert(
        &self,
        namespace: &str,
        status: AllowlistStatus,
        fas_account: Option<&str>,
    ) -> DbResult<AllowlistEntry> {
        let mut state = self.state();
        if let Some(entry) = state.allowlist.iter_mut().find(|e| e.namespace == namespace) {
            entry.status = status;
            if let Some(account) = fas_account {
                entry.fas_account = Some(account.to_string());
            }
            entry.updated_at = Utc::now();
            return Ok(entry.clone());
        }
        let entry = AllowlistEntry {
            id: Uuid::now_v7(),
            namespace: namespace.to_string(),
            status,
            fas_account: fas_account.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.allowlist.push(entry.clone());
        Ok(entry)
    }

    async fn remove(&self, namespace: &str) -> DbResult<bool> {
        let mut state = self.state();
        let before = state.allowlist.len();
        state.allowlist.retain(|e| e.namespace != namespace);
        Ok(state.allowlist.len() != before)
    }

    async fn list(&self, status: Option<AllowlistStatus>) -> DbResult<Vec<AllowlistEntry>> {
        let mut entries: Vec<_> = self
            .state()
            .allowlist
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distbot_core::ForgeKind;

    #[tokio::test]
    async fn test_trigger_is_reused() {
        let (store, _) = Store::memory();
        let project = ProjectRef::new(ForgeKind::Github, "https://github.com", "packit", "ogr");

        let first = store.projects.get_or_create_project(&project).await.unwrap();
        let second = store.projects.get_or_create_project(&project).await.unwrap();
        assert_eq!(first.id, second.id);

        let a = store
            .projects
            .get_or_create_trigger(first.id, ProjectEventType::PullRequest, "342")
            .await
            .unwrap();
        let b = store
            .projects
            .get_or_create_trigger(first.id, ProjectEventType::PullRequest, "342")
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_build_update_merges_data() {
        let (store, _) = Store::memory();
        let group = store.koji_builds.create_group().await.unwrap();
        let build = store
            .koji_builds
            .create_target(NewKojiBuild {
                group_id: group.id,
                build_id: "79721403".into(),
                commit_sha: "0eb3e12005cb18f15d3054020f7ac934c01eae08".into(),
                target: "f36-candidate".into(),
                scratch: false,
                status: BuildStatus::Pending,
                web_url: None,
                build_logs_url: None,
                data: serde_json::json!({"branch": "f36"}),
            })
            .await
            .unwrap();

        let updated = store
            .koji_builds
            .update(
                build.id,
                BuildUpdate {
                    status: Some(BuildStatus::Running),
                    data: Some(serde_json::json!({"koji_state": "BUILDING"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BuildStatus::Running);
        assert_eq!(updated.data["branch"], "f36");
        assert_eq!(updated.data["koji_state"], "BUILDING");
    }
}
