//! `distbot allowlist ...`

use anyhow::Result;
use distbot_worker::Allowlist;
use distbot_worker::allowlist::{PathKind, path_variants, strip_scheme};

use super::prompt::Prompt;

/// Strip the scheme from `input` and have the operator confirm what kind
/// of path is being changed. `None` when they decline.
fn confirm_path(prompt: &dyn Prompt, input: &str) -> Result<Option<String>> {
    let (path, had_scheme) = strip_scheme(input);
    if had_scheme {
        prompt.note("Protocol ignored when allowlisting.");
    }
    if path.is_empty() {
        return Ok(None);
    }
    let kind = PathKind::from_path(&path);
    if prompt.confirm(&format!("Are you manipulating with {} ‹{}›?", kind, path))? {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

fn construct_path(prompt: &dyn Prompt) -> Result<String> {
    let domain = prompt.input("Please input domain (e.g. github.com, gitlab.com)")?;
    let namespace = prompt.input(
        "Please input namespace (for a specific repository type the whole path \
         suffixed with ‹.git›, e.g. ‹packit/ogr.git›)",
    )?;
    Ok(format!("{}/{}", domain.trim(), namespace.trim()))
}

pub async fn approve(allowlist: &Allowlist, prompt: &dyn Prompt, path: Option<String>) -> Result<()> {
    let input = match path {
        Some(path) => path,
        None => construct_path(prompt)?,
    };
    let Some(path) = confirm_path(prompt, &input)? else {
        println!("Aborted");
        return Ok(());
    };
    allowlist.approve(&path).await?;
    println!("Approved {}", path);
    Ok(())
}

pub async fn deny(allowlist: &Allowlist, prompt: &dyn Prompt, path: &str) -> Result<()> {
    let Some(path) = confirm_path(prompt, path)? else {
        println!("Aborted");
        return Ok(());
    };
    allowlist.deny(&path).await?;
    println!("Denied {}", path);
    Ok(())
}

pub async fn remove(allowlist: &Allowlist, prompt: &dyn Prompt, path: &str) -> Result<()> {
    let Some(path) = confirm_path(prompt, path)? else {
        println!("Aborted");
        return Ok(());
    };
    if allowlist.remove(&path).await? {
        println!("Removed {}", path);
    } else {
        println!("{} is not on the allowlist", path);
    }
    Ok(())
}

/// List waiting namespaces, then approve the one (or a variant of it) the
/// operator picks.
pub async fn waiting(allowlist: &Allowlist, prompt: &dyn Prompt) -> Result<()> {
    let entries = allowlist.waiting().await?;
    if entries.is_empty() {
        println!("No namespaces waiting for approval");
        return Ok(());
    }

    let items: Vec<String> = entries
        .iter()
        .map(|e| match &e.fas_account {
            Some(fas) => format!("{} (FAS: {})", e.namespace, fas),
            None => e.namespace.clone(),
        })
        .collect();
    let Some(choice) = prompt.select("Accounts waiting for approval", &items)? else {
        return Ok(());
    };

    let variants = path_variants(&entries[choice].namespace);
    let Some(variant) = prompt.select("Choose variant you want to allowlist", &variants)? else {
        return Ok(());
    };
    approve(allowlist, prompt, Some(variants[variant].clone())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::prompt::scripted::ScriptedPrompt;
    use distbot_core::status::AllowlistStatus;
    use distbot_db::Store;

    fn allowlist() -> (Allowlist, Store) {
        let (store, _db) = Store::memory();
        (Allowlist::new(store.allowlist.clone()), store)
    }

    #[tokio::test]
    async fn test_approve_strips_protocol() {
        let (allowlist, store) = allowlist();
        let prompt = ScriptedPrompt::confirming(&[true]);
        approve(&allowlist, &prompt, Some("https://github.com/packit/".into()))
            .await
            .unwrap();

        assert_eq!(*prompt.notes.borrow(), vec!["Protocol ignored when allowlisting."]);
        assert_eq!(
            prompt.asked.borrow()[0],
            "Are you manipulating with a namespace ‹github.com/packit›?"
        );
        let entry = store.allowlist.get("github.com/packit").await.unwrap().unwrap();
        assert_eq!(entry.status, AllowlistStatus::ApprovedManually);
    }

    #[tokio::test]
    async fn test_declined_confirmation_changes_nothing() {
        let (allowlist, store) = allowlist();
        let prompt = ScriptedPrompt::confirming(&[false]);
        deny(&allowlist, &prompt, "github.com").await.unwrap();

        assert!(prompt.asked.borrow()[0].contains("with a whole domain"));
        assert!(store.allowlist.get("github.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_approve_prompts_for_path() {
        let (allowlist, store) = allowlist();
        let prompt = ScriptedPrompt::confirming(&[true]);
        prompt
            .inputs
            .borrow_mut()
            .extend(["gitlab.com".to_string(), "packit-service/hello-world.git".to_string()]);
        approve(&allowlist, &prompt, None).await.unwrap();

        assert!(prompt.asked.borrow()[2].contains("with a specific repository"));
        assert!(
            store
                .allowlist
                .get("gitlab.com/packit-service/hello-world.git")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_waiting_approves_chosen_variant() {
        let (allowlist, store) = allowlist();
        store
            .allowlist
            .upsert("github.com/packit", AllowlistStatus::Waiting, Some("lbarcziova"))
            .await
            .unwrap();

        let prompt = ScriptedPrompt::confirming(&[true]);
        prompt.selections.borrow_mut().extend([Some(0), Some(1)]);
        waiting(&allowlist, &prompt).await.unwrap();

        let offered = prompt.offered.borrow();
        assert_eq!(offered[0], vec!["github.com/packit (FAS: lbarcziova)"]);
        assert_eq!(offered[1], vec!["github.com", "github.com/packit"]);
        let entry = store.allowlist.get("github.com/packit").await.unwrap().unwrap();
        assert_eq!(entry.status, AllowlistStatus::ApprovedManually);
    }

    #[tokio::test]
    async fn test_remove_missing_entry() {
        let (allowlist, _store) = allowlist();
        let prompt = ScriptedPrompt::confirming(&[true]);
        remove(&allowlist, &prompt, "github.com/nobody").await.unwrap();
        assert_eq!(prompt.asked.borrow().len(), 1);
    }
}
