//! Copr REST API (v3) client.

use async_trait::async_trait;
use distbot_config::service::CoprConfig;
use distbot_core::Result;
use distbot_core::backends::{CoprApi, CoprScmBuild, CoprSubmittedBuild};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::http::{Auth, HttpClient};

const SERVICE: &str = "copr";

pub struct CoprClient {
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct CoprProject {
    #[serde(default)]
    chroot_repos: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CoprBuild {
    id: u64,
}

impl CoprClient {
    pub fn new(config: &CoprConfig) -> Self {
        let auth = match (&config.login, &config.token) {
            (Some(login), Some(token)) => Auth::Basic(login.clone(), token.clone()),
            _ => Auth::None,
        };
        Self {
            http: HttpClient::new(&config.url, auth),
        }
    }

    /// Group owners (`@group`) live under `/coprs/g/<group>`.
    fn owner_path(owner: &str) -> String {
        match owner.strip_prefix('@') {
            Some(group) => format!("g/{group}"),
            None => owner.to_string(),
        }
    }
}

/// `fedora-37-x86_64` -> `fedora-37`
fn chroot_distro(chroot: &str) -> &str {
    chroot.rsplit_once('-').map(|(distro, _)| distro).unwrap_or(chroot)
}

#[async_trait]
impl CoprApi for CoprClient {
    async fn ensure_project(
        &self,
        owner: &str,
        project: &str,
        chroots: &[String],
        description: &str,
    ) -> Result<()> {
        let existing: Option<CoprProject> = self
            .http
            .get_optional(&format!(
                "/api_3/project?ownername={}&projectname={}",
                urlencoding::encode(owner),
                urlencoding::encode(project)
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))?;

        match existing {
            None => {
                let _: serde_json::Value = self
                    .http
                    .post(
                        &format!("/api_3/project/add/{}", urlencoding::encode(owner)),
                        &json!({
                            "projectname": project,
                            "chroots": chroots,
                            "description": description,
                            "unlisted_on_hp": true,
                        }),
                    )
                    .await
                    .map_err(|e| e.into_core(SERVICE))?;
                info!(owner = %owner, project = %project, "Created Copr project");
            }
            Some(existing) => {
                let enabled: BTreeSet<&str> =
                    existing.chroot_repos.keys().map(String::as_str).collect();
                if chroots.iter().all(|c| enabled.contains(c.as_str())) {
                    return Ok(());
                }
                let merged: BTreeSet<&str> = enabled
                    .into_iter()
                    .chain(chroots.iter().map(String::as_str))
                    .collect();
                let _: serde_json::Value = self
                    .http
                    .post(
                        &format!(
                            "/api_3/project/edit/{}/{}",
                            urlencoding::encode(owner),
                            urlencoding::encode(project)
                        ),
                        &json!({ "chroots": merged }),
                    )
                    .await
                    .map_err(|e| e.into_core(SERVICE))?;
                info!(owner = %owner, project = %project, "Enabled new chroots in Copr project");
            }
        }
        Ok(())
    }

    async fn submit_scm_build(&self, build: &CoprScmBuild) -> Result<CoprSubmittedBuild> {
        let created: CoprBuild = self
            .http
            .post(
                "/api_3/build/create/scm",
                &json!({
                    "ownername": build.owner,
                    "projectname": build.project,
                    "clone_url": build.clone_url,
                    "committish": build.committish,
                    "spec": build.spec,
                    "scm_type": "git",
                    "source_build_method": "rpkg",
                    "chroots": build.chroots,
                }),
            )
            .await
            .map_err(|e| e.into_core(SERVICE))?;

        info!(
            build_id = created.id,
            owner = %build.owner,
            project = %build.project,
            "Submitted Copr build"
        );
        Ok(CoprSubmittedBuild {
            build_id: created.id,
            web_url: self.build_web_url(&build.owner, &build.project, created.id),
        })
    }

    async fn built_packages(&self, build_id: u64, chroot: &str) -> Result<serde_json::Value> {
        self.http
            .get(&format!(
                "/api_3/build-chroot/built-packages/?build_id={}&chrootname={}",
                build_id,
                urlencoding::encode(chroot)
            ))
            .await
            .map_err(|e| e.into_core(SERVICE))
    }

    fn build_web_url(&self, owner: &str, project: &str, build_id: u64) -> String {
        format!(
            "{}/coprs/{}/{}/build/{}/",
            self.http.base_url(),
            Self::owner_path(owner),
            project,
            build_id
        )
    }

    fn build_logs_url(&self, owner: &str, project: &str, build_id: u64, chroot: &str) -> String {
        format!(
            "{}/coprs/{}/{}/build/{}/#{}",
            self.http.base_url(),
            Self::owner_path(owner),
            project,
            build_id,
            chroot
        )
    }

    fn repo_download_url(&self, owner: &str, project: &str, chroot: &str) -> String {
        let distro = chroot_distro(chroot);
        let file_owner = match owner.strip_prefix('@') {
            Some(group) => format!("group_{group}"),
            None => owner.to_string(),
        };
        format!(
            "{}/coprs/{}/{}/repo/{}/{}-{}-{}.repo",
            self.http.base_url(),
            Self::owner_path(owner),
            project,
            distro,
            file_owner,
            project,
            distro
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CoprClient {
        CoprClient::new(&CoprConfig {
            url: "https://copr.fedorainfracloud.org/".into(),
            owner: "distbot".into(),
            login: None,
            token: None,
        })
    }

    #[test]
    fn test_build_web_url() {
        assert_eq!(
            client().build_web_url("distbot", "packit-ogr-42", 123),
            "https://copr.fedorainfracloud.org/coprs/distbot/packit-ogr-42/build/123/"
        );
        assert_eq!(
            client().build_web_url("@copr", "copr-dev", 5),
            "https://copr.fedorainfracloud.org/coprs/g/copr/copr-dev/build/5/"
        );
    }

    #[test]
    fn test_repo_download_url() {
        assert_eq!(
            client().repo_download_url("@copr", "copr-dev", "fedora-37-x86_64"),
            "https://copr.fedorainfracloud.org/coprs/g/copr/copr-dev/repo/fedora-37/group_copr-copr-dev-fedora-37.repo"
        );
    }
}
