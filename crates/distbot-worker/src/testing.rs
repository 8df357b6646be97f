//! Fakes of the forge and service traits, shared by the unit tests.

use async_trait::async_trait;
use distbot_config::ServiceConfig;
use distbot_core::backends::{
    BodhiApi, BodhiRelease, BodhiUpdate, ComposeStatus, CoprApi, CoprScmBuild,
    CoprSubmittedBuild, ImageBuilderApi, ImageCompose, KojiApi, ReleaseSyncer,
    SyncReleaseRequest, TestingFarmApi, TestingFarmDetails, TestingFarmRequest,
};
use distbot_core::event::{CommentEvent, PullRequestAction, PullRequestEvent};
use distbot_core::{
    CommentTarget, CommitStatus, Error, Event, ForgeKind, ForgeResolver, GitForge, Issue,
    NewPullRequest, ProjectRef, Result,
};
use distbot_db::Store;
use distbot_db::memory::MemoryDb;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::context::WorkerContext;
use crate::queue::MemoryTaskSink;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn failure(service: &'static str, fail: &Option<(String, bool)>) -> Result<()> {
    match fail {
        Some((msg, true)) => Err(Error::retriable(service, msg.clone())),
        Some((msg, false)) => Err(Error::service(service, msg.clone())),
        None => Ok(()),
    }
}

#[derive(Default)]
struct ForgeState {
    files: HashMap<String, String>,
    statuses: Vec<(String, CommitStatus)>,
    comments: Vec<(CommentTarget, String)>,
    issues: Vec<Issue>,
    pull_requests: Vec<NewPullRequest>,
    private: bool,
    write_access: bool,
    default_branch: Option<String>,
    pr_head: Option<String>,
    latest_release: Option<String>,
}

/// One forge serving every project.
#[derive(Default)]
pub struct FakeForge {
    state: Mutex<ForgeState>,
}

impl FakeForge {
    pub fn set_file(&self, path: &str, content: &str) {
        lock(&self.state)
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn set_private(&self, private: bool) {
        lock(&self.state).private = private;
    }

    pub fn set_write_access(&self, write_access: bool) {
        lock(&self.state).write_access = write_access;
    }

    pub fn set_default_branch(&self, branch: &str) {
        lock(&self.state).default_branch = Some(branch.to_string());
    }

    pub fn set_pr_head(&self, sha: &str) {
        lock(&self.state).pr_head = Some(sha.to_string());
    }

    pub fn set_latest_release(&self, tag: &str) {
        lock(&self.state).latest_release = Some(tag.to_string());
    }

    pub fn statuses(&self) -> Vec<(String, CommitStatus)> {
        lock(&self.state).statuses.clone()
    }

    pub fn comments(&self) -> Vec<(CommentTarget, String)> {
        lock(&self.state).comments.clone()
    }

    pub fn issues(&self) -> Vec<Issue> {
        lock(&self.state).issues.clone()
    }

    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        lock(&self.state).pull_requests.clone()
    }
}

#[async_trait]
impl GitForge for FakeForge {
    async fn get_file_content(
        &self,
        _project: &ProjectRef,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>> {
        Ok(lock(&self.state).files.get(path).cloned())
    }

    async fn is_private(&self, _project: &ProjectRef) -> Result<bool> {
        Ok(lock(&self.state).private)
    }

    async fn default_branch(&self, _project: &ProjectRef) -> Result<String> {
        Ok(lock(&self.state)
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn pr_head_sha(&self, _project: &ProjectRef, pr_id: u64) -> Result<String> {
        lock(&self.state)
            .pr_head
            .clone()
            .ok_or_else(|| Error::NotFound(format!("pull request {}", pr_id)))
    }

    async fn set_commit_status(
        &self,
        _project: &ProjectRef,
        commit_sha: &str,
        status: &CommitStatus,
    ) -> Result<()> {
        lock(&self.state)
            .statuses
            .push((commit_sha.to_string(), status.clone()));
        Ok(())
    }

    async fn comment(
        &self,
        _project: &ProjectRef,
        target: CommentTarget,
        body: &str,
    ) -> Result<()> {
        lock(&self.state).comments.push((target, body.to_string()));
        Ok(())
    }

    async fn has_write_access(&self, _project: &ProjectRef, _login: &str) -> Result<bool> {
        Ok(lock(&self.state).write_access)
    }

    async fn find_issue(&self, _project: &ProjectRef, title: &str) -> Result<Option<Issue>> {
        Ok(lock(&self.state)
            .issues
            .iter()
            .find(|i| i.title == title)
            .cloned())
    }

    async fn create_issue(&self, project: &ProjectRef, title: &str, _body: &str) -> Result<Issue> {
        let mut state = lock(&self.state);
        let id = state.issues.len() as u64 + 1;
        let issue = Issue {
            id,
            title: title.to_string(),
            url: format!("{}/issues/{}", project.project_url(), id),
        };
        state.issues.push(issue.clone());
        Ok(issue)
    }

    async fn latest_release(&self, _project: &ProjectRef) -> Result<Option<String>> {
        Ok(lock(&self.state).latest_release.clone())
    }

    async fn create_pull_request(
        &self,
        project: &ProjectRef,
        pr: &NewPullRequest,
    ) -> Result<String> {
        let mut state = lock(&self.state);
        state.pull_requests.push(pr.clone());
        Ok(format!(
            "{}/pull-request/{}",
            project.project_url(),
            state.pull_requests.len()
        ))
    }
}

pub struct FakeForges(pub Arc<FakeForge>);

impl ForgeResolver for FakeForges {
    fn forge_for(&self, _project: &ProjectRef) -> Result<Arc<dyn GitForge>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct FakeCopr {
    pub submitted: Mutex<Vec<CoprScmBuild>>,
    pub projects: Mutex<Vec<(String, String, Vec<String>)>>,
    pub fail: Mutex<Option<(String, bool)>>,
}

impl FakeCopr {
    pub fn submitted(&self) -> Vec<CoprScmBuild> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl CoprApi for FakeCopr {
    async fn ensure_project(
        &self,
        owner: &str,
        project: &str,
        chroots: &[String],
        _description: &str,
    ) -> Result<()> {
        lock(&self.projects).push((owner.to_string(), project.to_string(), chroots.to_vec()));
        Ok(())
    }

    async fn submit_scm_build(&self, build: &CoprScmBuild) -> Result<CoprSubmittedBuild> {
        failure("copr", &lock(&self.fail))?;
        let mut submitted = lock(&self.submitted);
        submitted.push(build.clone());
        let build_id = 1000 + submitted.len() as u64;
        Ok(CoprSubmittedBuild {
            build_id,
            web_url: self.build_web_url(&build.owner, &build.project, build_id),
        })
    }

    async fn built_packages(&self, _build_id: u64, _chroot: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!([{"name": "python-ogr", "arch": "noarch"}]))
    }

    fn build_web_url(&self, owner: &str, project: &str, build_id: u64) -> String {
        format!(
            "https://copr.fedorainfracloud.org/coprs/{}/{}/build/{}/",
            owner, project, build_id
        )
    }

    fn build_logs_url(&self, owner: &str, project: &str, build_id: u64, chroot: &str) -> String {
        format!("{}#{}", self.build_web_url(owner, project, build_id), chroot)
    }

    fn repo_download_url(&self, owner: &str, project: &str, chroot: &str) -> String {
        format!(
            "https://copr.fedorainfracloud.org/coprs/{}/{}/repo/{}/",
            owner, project, chroot
        )
    }
}

#[derive(Default)]
pub struct FakeKoji {
    /// (scm_url, target, scratch)
    pub builds: Mutex<Vec<(String, String, bool)>>,
    pub fail: Mutex<Option<(String, bool)>>,
    /// Targets whose submissions fail with a retriable error.
    pub unavailable_targets: Mutex<Vec<String>>,
}

impl FakeKoji {
    pub fn builds(&self) -> Vec<(String, String, bool)> {
        lock(&self.builds).clone()
    }

    fn submit(&self, scm_url: &str, target: &str, scratch: bool) -> Result<u64> {
        failure("koji", &lock(&self.fail))?;
        if lock(&self.unavailable_targets).iter().any(|t| t == target) {
            return Err(Error::retriable("koji", format!("{} is unavailable", target)));
        }
        let mut builds = lock(&self.builds);
        builds.push((scm_url.to_string(), target.to_string(), scratch));
        Ok(80000 + builds.len() as u64)
    }
}

#[async_trait]
impl KojiApi for FakeKoji {
    async fn scratch_build(&self, scm_url: &str, target: &str) -> Result<u64> {
        self.submit(scm_url, target, true)
    }

    async fn build(&self, scm_url: &str, target: &str) -> Result<u64> {
        self.submit(scm_url, target, false)
    }

    fn task_web_url(&self, task_id: u64) -> String {
        format!("https://koji.fedoraproject.org/koji/taskinfo?taskID={}", task_id)
    }

    fn task_logs_url(&self, task_id: u64) -> String {
        format!(
            "https://kojipkgs.fedoraproject.org//work/tasks/{}/{}/build.log",
            task_id % 10000,
            task_id
        )
    }
}

#[derive(Default)]
pub struct FakeBodhi {
    /// (branch, update type, builds)
    pub updates: Mutex<Vec<(String, String, Vec<String>)>>,
    pub fail: Mutex<Option<(String, bool)>>,
}

impl FakeBodhi {
    pub fn updates(&self) -> Vec<(String, String, Vec<String>)> {
        lock(&self.updates).clone()
    }
}

pub fn releases() -> Vec<BodhiRelease> {
    let release = |name: &str, branch: &str, prefix: &str, state: &str, version: &str| {
        BodhiRelease {
            name: name.to_string(),
            branch: branch.to_string(),
            id_prefix: prefix.to_string(),
            state: state.to_string(),
            version: version.to_string(),
        }
    };
    vec![
        release("F36", "f36", "FEDORA", "current", "36"),
        release("F37", "f37", "FEDORA", "current", "37"),
        release("F38", "rawhide", "FEDORA", "pending", "38"),
        release("EPEL-9", "epel9", "FEDORA-EPEL", "current", "9"),
    ]
}

#[async_trait]
impl BodhiApi for FakeBodhi {
    async fn active_releases(&self) -> Result<Vec<BodhiRelease>> {
        Ok(releases())
    }

    async fn create_update(
        &self,
        dist_git_branch: &str,
        update_type: &str,
        builds: &[String],
    ) -> Result<BodhiUpdate> {
        failure("bodhi", &lock(&self.fail))?;
        let mut updates = lock(&self.updates);
        updates.push((
            dist_git_branch.to_string(),
            update_type.to_string(),
            builds.to_vec(),
        ));
        let alias = format!("FEDORA-2022-{:04}", updates.len());
        Ok(BodhiUpdate {
            url: format!("https://bodhi.fedoraproject.org/updates/{}", alias),
            alias,
        })
    }
}

#[derive(Default)]
pub struct FakeTestingFarm {
    pub submitted: Mutex<Vec<TestingFarmRequest>>,
    pub details: Mutex<Option<TestingFarmDetails>>,
    pub fail: Mutex<Option<(String, bool)>>,
}

impl FakeTestingFarm {
    pub fn submitted(&self) -> Vec<TestingFarmRequest> {
        lock(&self.submitted).clone()
    }

    pub fn set_details(&self, state: &str, overall: Option<&str>) {
        *lock(&self.details) = Some(TestingFarmDetails {
            state: state.to_string(),
            overall_result: overall.map(String::from),
            run_url: None,
            summary: None,
        });
    }
}

#[async_trait]
impl TestingFarmApi for FakeTestingFarm {
    async fn submit(&self, request: &TestingFarmRequest) -> Result<String> {
        failure("testing-farm", &lock(&self.fail))?;
        let mut submitted = lock(&self.submitted);
        submitted.push(request.clone());
        Ok(format!("request-{}", submitted.len()))
    }

    async fn request_details(&self, request_id: &str) -> Result<TestingFarmDetails> {
        lock(&self.details)
            .clone()
            .ok_or_else(|| Error::NotFound(format!("request {}", request_id)))
    }

    fn web_url(&self, request_id: &str) -> String {
        format!("https://artifacts.dev.testing-farm.io/{}", request_id)
    }
}

#[derive(Default)]
pub struct FakeImageBuilder {
    pub composes: Mutex<Vec<ImageCompose>>,
    pub status: Mutex<Option<ComposeStatus>>,
}

impl FakeImageBuilder {
    pub fn composes(&self) -> Vec<ImageCompose> {
        lock(&self.composes).clone()
    }

    pub fn set_status(&self, status: &str, error: Option<&str>) {
        *lock(&self.status) = Some(ComposeStatus {
            status: status.to_string(),
            error: error.map(String::from),
        });
    }
}

#[async_trait]
impl ImageBuilderApi for FakeImageBuilder {
    async fn create_image(&self, compose: &ImageCompose) -> Result<String> {
        let mut composes = lock(&self.composes);
        composes.push(compose.clone());
        Ok(format!("compose-{}", composes.len()))
    }

    async fn compose_status(&self, compose_id: &str) -> Result<ComposeStatus> {
        lock(&self.status)
            .clone()
            .ok_or_else(|| Error::NotFound(format!("compose {}", compose_id)))
    }

    fn compose_url(&self, compose_id: &str) -> String {
        format!("https://console.redhat.com/api/image-builder/v1/composes/{}", compose_id)
    }
}

#[derive(Default)]
pub struct FakeSyncer {
    pub requests: Mutex<Vec<SyncReleaseRequest>>,
    /// Branches whose sync fails.
    pub failing: Mutex<Vec<String>>,
}

impl FakeSyncer {
    pub fn requests(&self) -> Vec<SyncReleaseRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ReleaseSyncer for FakeSyncer {
    async fn sync_release(&self, request: &SyncReleaseRequest) -> Result<String> {
        if lock(&self.failing).contains(&request.branch) {
            return Err(Error::service("dist-git", "push rejected"));
        }
        let mut requests = lock(&self.requests);
        requests.push(request.clone());
        Ok(format!(
            "{}/pull-request/{}",
            request.dist_git.project_url(),
            requests.len()
        ))
    }
}

/// A `WorkerContext` wired to fakes, with handles to inspect them.
pub struct TestEnv {
    pub ctx: WorkerContext,
    pub db: Arc<MemoryDb>,
    pub forge: Arc<FakeForge>,
    pub copr: Arc<FakeCopr>,
    pub koji: Arc<FakeKoji>,
    pub bodhi: Arc<FakeBodhi>,
    pub testing_farm: Arc<FakeTestingFarm>,
    pub image_builder: Arc<FakeImageBuilder>,
    pub syncer: Arc<FakeSyncer>,
    pub tasks: Arc<MemoryTaskSink>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let mut config = ServiceConfig {
            deployment: "prod".to_string(),
            server_name: "distbot.example.com".to_string(),
            ..Default::default()
        };
        configure(&mut config);

        let (store, db): (Store, Arc<MemoryDb>) = Store::memory();
        let forge = Arc::new(FakeForge::default());
        let copr = Arc::new(FakeCopr::default());
        let koji = Arc::new(FakeKoji::default());
        let bodhi = Arc::new(FakeBodhi::default());
        let testing_farm = Arc::new(FakeTestingFarm::default());
        let image_builder = Arc::new(FakeImageBuilder::default());
        let syncer = Arc::new(FakeSyncer::default());
        let tasks = Arc::new(MemoryTaskSink::new());

        let ctx = WorkerContext {
            config: Arc::new(config),
            store,
            forges: Arc::new(FakeForges(forge.clone())),
            copr: copr.clone(),
            koji: koji.clone(),
            bodhi: bodhi.clone(),
            testing_farm: testing_farm.clone(),
            image_builder: image_builder.clone(),
            syncer: syncer.clone(),
            tasks: tasks.clone(),
        };

        Self {
            ctx,
            db,
            forge,
            copr,
            koji,
            bodhi,
            testing_farm,
            image_builder,
            syncer,
            tasks,
        }
    }

    pub fn with_package_config(self, kdl: &str) -> Self {
        self.forge
            .set_file(distbot_config::PACKAGE_CONFIG_FILE, kdl);
        self
    }

    /// Approve the whole upstream namespace used by the fixtures.
    pub async fn allow_packit(&self) {
        use distbot_core::status::AllowlistStatus;
        self.ctx
            .store
            .allowlist
            .upsert("github.com/packit", AllowlistStatus::ApprovedManually, None)
            .await
            .unwrap();
    }
}

pub fn upstream() -> ProjectRef {
    ProjectRef::new(ForgeKind::Github, "https://github.com", "packit", "ogr")
}

pub fn dist_git() -> ProjectRef {
    ProjectRef::new(
        ForgeKind::Pagure,
        "https://src.fedoraproject.org",
        "rpms",
        "python-ogr",
    )
}

pub fn pull_request() -> Event {
    Event::PullRequest(PullRequestEvent {
        action: PullRequestAction::Opened,
        project: upstream(),
        source_project: None,
        pr_id: 342,
        target_branch: "main".into(),
        commit_sha: "528b803be6f93e19ca4130bf4976f2800a3004c4".into(),
        actor: "lbarcziova".into(),
    })
}

pub fn pr_comment(comment: &str) -> Event {
    Event::PullRequestComment(CommentEvent {
        project: upstream(),
        number: 342,
        comment_id: 1,
        comment: comment.to_string(),
        actor: "lbarcziova".into(),
        commit_sha: Some("528b803be6f93e19ca4130bf4976f2800a3004c4".into()),
        target_branch: Some("main".into()),
    })
}
