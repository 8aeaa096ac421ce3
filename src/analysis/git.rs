use crate::models::history::GitInfo;
use git2::Repository;
use std::path::Path;

/// Branch and commit of HEAD. Every field degrades to `"unknown"` when the
/// project is not a repository or HEAD cannot be resolved.
pub fn read_git_info(project_root: &Path) -> GitInfo {
    let repo = match Repository::discover(project_root) {
        Ok(repo) => repo,
        Err(e) => {
            log::debug!("No git repository at {}: {}", project_root.display(), e);
            return GitInfo::unknown();
        }
    };

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) => {
            log::debug!("Failed to resolve HEAD: {}", e);
            return GitInfo::unknown();
        }
    };

    let branch = head
        .shorthand()
        .map(|name| if repo.head_detached().unwrap_or(false) { "HEAD" } else { name })
        .unwrap_or("unknown")
        .to_string();

    let Ok(commit) = head.peel_to_commit() else {
        return GitInfo {
            branch,
            ..GitInfo::unknown()
        };
    };

    let commit_short = commit
        .as_object()
        .short_id()
        .ok()
        .and_then(|buf| buf.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    GitInfo {
        branch,
        commit: commit.id().to_string(),
        commit_short,
    }
}

/// Subject line of `commit`, or an empty string.
pub fn commit_message(project_root: &Path, commit: &str) -> String {
    if commit.is_empty() || commit == "unknown" {
        return String::new();
    }

    let Ok(repo) = Repository::discover(project_root) else {
        return String::new();
    };
    let message = git2::Oid::from_str(commit)
        .and_then(|oid| repo.find_commit(oid))
        .ok()
        .and_then(|c| c.message().map(str::to_string));

    match message {
        Some(message) => message.trim().lines().next().unwrap_or("").to_string(),
        None => {
            log::debug!("Failed to read message of commit {}", commit);
            String::new()
        }
    }
}

/// Resolves the acting user: git `user.name`, then `$USER`, then `$USERNAME`.
pub fn current_user(project_root: &Path) -> String {
    if let Some(name) = git_user_name(project_root) {
        return name;
    }

    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn git_user_name(project_root: &Path) -> Option<String> {
    let config = Repository::discover(project_root)
        .and_then(|repo| repo.config())
        .or_else(|_| git2::Config::open_default())
        .ok()?;

    config
        .get_string("user.name")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
