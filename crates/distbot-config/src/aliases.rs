//! Dist-git branch and build target aliases.
//!
//! Aliases such as `fedora-stable` are resolved against the active
//! releases reported by Bodhi.

use distbot_core::backends::BodhiRelease;
use std::collections::BTreeSet;

pub const RAWHIDE: &str = "rawhide";

const DEFAULT_ARCH: &str = "x86_64";

pub const ALIASES: &[&str] = &[
    "fedora-all",
    "fedora-stable",
    "fedora-development",
    "fedora-latest",
    "fedora-latest-stable",
    "fedora-branched",
    "epel-all",
];

fn is_fedora(release: &BodhiRelease) -> bool {
    release.id_prefix == "FEDORA" && release.state != "archived"
}

fn is_epel(release: &BodhiRelease) -> bool {
    release.id_prefix.starts_with("FEDORA-EPEL") && release.state != "archived"
}

fn is_rawhide(release: &BodhiRelease) -> bool {
    release.branch == RAWHIDE
}

fn version_number(release: &BodhiRelease) -> u32 {
    release.version.parse().unwrap_or(0)
}

/// Releases an alias stands for, or `None` when `name` is not an alias.
fn alias_releases<'a>(name: &str, releases: &'a [BodhiRelease]) -> Option<Vec<&'a BodhiRelease>> {
    let fedora = releases.iter().filter(|r| is_fedora(r));
    let selected: Vec<&BodhiRelease> = match name {
        "fedora-all" => fedora.collect(),
        "fedora-stable" => fedora.filter(|r| r.state == "current").collect(),
        "fedora-development" => fedora
            .filter(|r| r.state == "pending" || is_rawhide(r))
            .collect(),
        "fedora-branched" => fedora.filter(|r| !is_rawhide(r)).collect(),
        "fedora-latest" => fedora
            .filter(|r| !is_rawhide(r))
            .max_by_key(|r| version_number(r))
            .into_iter()
            .collect(),
        "fedora-latest-stable" => fedora
            .filter(|r| r.state == "current")
            .max_by_key(|r| version_number(r))
            .into_iter()
            .collect(),
        "epel-all" => releases.iter().filter(|r| is_epel(r)).collect(),
        _ => return None,
    };
    Some(selected)
}

/// Expand branch aliases into dist-git branch names.
///
/// An empty list means `fedora-stable`. Non-alias names pass through.
pub fn resolve_branches(names: &[String], releases: &[BodhiRelease]) -> BTreeSet<String> {
    let default = ["fedora-stable".to_string()];
    let names = if names.is_empty() { &default[..] } else { names };

    let mut branches = BTreeSet::new();
    for name in names {
        match alias_releases(name, releases) {
            Some(selected) => branches.extend(selected.into_iter().map(|r| r.branch.clone())),
            None if name == "main" => {
                branches.insert(RAWHIDE.to_string());
            }
            None => {
                branches.insert(name.clone());
            }
        }
    }
    branches
}

/// Expand target aliases into build chroots, e.g. `fedora-all` into
/// `fedora-37-x86_64`, `fedora-rawhide-x86_64`.
///
/// An alias may carry an architecture suffix (`fedora-stable-aarch64`).
pub fn resolve_targets(names: &[String], releases: &[BodhiRelease]) -> BTreeSet<String> {
    let mut targets = BTreeSet::new();
    for name in names {
        let (alias, arch) = split_arch(name);
        match alias_releases(alias, releases) {
            Some(selected) => targets.extend(selected.into_iter().map(|r| chroot_for(r, arch))),
            None if is_short_chroot(name) => {
                targets.insert(format!("{}-{}", name, DEFAULT_ARCH));
            }
            None => {
                targets.insert(name.clone());
            }
        }
    }
    targets
}

fn split_arch(name: &str) -> (&str, &str) {
    let mut aliases = ALIASES.to_vec();
    // `fedora-latest-stable` must win over `fedora-latest`
    aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
    for alias in aliases {
        if let Some(rest) = name.strip_prefix(alias) {
            if rest.is_empty() {
                return (alias, DEFAULT_ARCH);
            }
            if let Some(arch) = rest.strip_prefix('-') {
                return (alias, arch);
            }
        }
    }
    (name, DEFAULT_ARCH)
}

/// `fedora-37` or `epel-9` without an architecture.
fn is_short_chroot(name: &str) -> bool {
    name.split('-').count() == 2 && (name.starts_with("fedora-") || name.starts_with("epel-"))
}

fn chroot_for(release: &BodhiRelease, arch: &str) -> String {
    if is_rawhide(release) {
        format!("fedora-rawhide-{}", arch)
    } else if is_epel(release) {
        format!("epel-{}-{}", release.version, arch)
    } else {
        format!("fedora-{}-{}", release.version, arch)
    }
}

/// Koji build target for a dist-git branch.
pub fn koji_target_for_branch(branch: &str) -> String {
    if branch == RAWHIDE || branch == "main" {
        RAWHIDE.to_string()
    } else {
        format!("{}-candidate", branch)
    }
}

/// Dist-git branch of a Koji build target (`f37-candidate` → `f37`).
pub fn branch_for_koji_target(target: &str) -> &str {
    target.strip_suffix("-candidate").unwrap_or(target)
}

/// Koji target used for a scratch build of a Copr-style chroot
/// (`fedora-37-x86_64` → `f37`, `epel-9-x86_64` → `epel9`).
pub fn koji_target_for_chroot(chroot: &str) -> String {
    let parts: Vec<&str> = chroot.split('-').collect();
    match parts.as_slice() {
        ["fedora", "rawhide", ..] => RAWHIDE.to_string(),
        ["fedora", version, ..] => format!("f{}", version),
        ["epel", version, ..] => format!("epel{}", version),
        _ => chroot.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, branch: &str, prefix: &str, state: &str, version: &str) -> BodhiRelease {
        BodhiRelease {
            name: name.to_string(),
            branch: branch.to_string(),
            id_prefix: prefix.to_string(),
            state: state.to_string(),
            version: version.to_string(),
        }
    }

    fn releases() -> Vec<BodhiRelease> {
        vec![
            release("F36", "f36", "FEDORA", "current", "36"),
            release("F37", "f37", "FEDORA", "current", "37"),
            release("F38", "f38", "FEDORA", "pending", "38"),
            release("F39", "rawhide", "FEDORA", "pending", "39"),
            release("F35", "f35", "FEDORA", "archived", "35"),
            release("EPEL-9", "epel9", "FEDORA-EPEL", "current", "9"),
        ]
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_is_fedora_stable() {
        let branches = resolve_branches(&[], &releases());
        assert_eq!(branches.into_iter().collect::<Vec<_>>(), vec!["f36", "f37"]);
    }

    #[test]
    fn test_branch_aliases() {
        let releases = releases();
        let dev = resolve_branches(&names(&["fedora-development"]), &releases);
        assert_eq!(dev.into_iter().collect::<Vec<_>>(), vec!["f38", "rawhide"]);

        let latest = resolve_branches(&names(&["fedora-latest", "epel-all"]), &releases);
        assert_eq!(latest.into_iter().collect::<Vec<_>>(), vec!["epel9", "f38"]);

        let latest_stable = resolve_branches(&names(&["fedora-latest-stable"]), &releases);
        assert_eq!(latest_stable.into_iter().collect::<Vec<_>>(), vec!["f37"]);

        let explicit = resolve_branches(&names(&["main", "f36"]), &releases);
        assert_eq!(explicit.into_iter().collect::<Vec<_>>(), vec!["f36", "rawhide"]);
    }

    #[test]
    fn test_target_aliases() {
        let targets = resolve_targets(
            &names(&["fedora-development-aarch64", "epel-9", "centos-stream-9-x86_64"]),
            &releases(),
        );
        assert_eq!(
            targets.into_iter().collect::<Vec<_>>(),
            vec![
                "centos-stream-9-x86_64",
                "epel-9-x86_64",
                "fedora-38-aarch64",
                "fedora-rawhide-aarch64",
            ]
        );
    }

    #[test]
    fn test_koji_targets() {
        assert_eq!(koji_target_for_branch("f37"), "f37-candidate");
        assert_eq!(koji_target_for_branch("rawhide"), "rawhide");
        assert_eq!(branch_for_koji_target("f37-candidate"), "f37");
        assert_eq!(branch_for_koji_target("rawhide"), "rawhide");
        assert_eq!(koji_target_for_chroot("fedora-rawhide-x86_64"), "rawhide");
        assert_eq!(koji_target_for_chroot("fedora-37-x86_64"), "f37");
        assert_eq!(koji_target_for_chroot("epel-9-x86_64"), "epel9");
    }
}
