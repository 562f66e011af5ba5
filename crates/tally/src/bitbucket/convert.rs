//! Conversion from Bitbucket payloads to connector types.

use crate::connector::{CommitStats, CommitSummary, RepositoryDescriptor};

use super::types::{BitbucketAuthor, BitbucketCommit, BitbucketRepo, DiffStatEntry};

/// Fallback author when the raw string and the account name are both empty.
pub const UNKNOWN_AUTHOR: &str = "unknown";

pub fn to_repository(repo: BitbucketRepo) -> RepositoryDescriptor {
    RepositoryDescriptor {
        full_name: repo.full_name,
        name: repo.name,
        slug: repo.slug,
        project_key: repo.project.map(|p| p.key),
    }
}

/// Split a raw git author into name and email.
///
/// `"Ada Lovelace <ada@example.com>"` gives both parts. A missing name part
/// falls back to the account display name, then to [`UNKNOWN_AUTHOR`].
pub fn parse_author(author: Option<&BitbucketAuthor>) -> (String, Option<String>) {
    let raw = author.and_then(|a| a.raw.as_deref()).unwrap_or("").trim();
    let display_name = author
        .and_then(|a| a.user.as_ref())
        .and_then(|u| u.display_name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let (name_part, email) = match raw.find('<') {
        Some(open) => {
            let email = raw[open + 1..]
                .find('>')
                .map(|close| raw[open + 1..open + 1 + close].trim())
                .filter(|email| !email.is_empty())
                .map(str::to_string);
            (raw[..open].trim(), email)
        }
        None => (raw, None),
    };

    let name = Some(name_part)
        .filter(|name| !name.is_empty())
        .or(display_name)
        .unwrap_or(UNKNOWN_AUTHOR)
        .to_string();

    (name, email)
}

/// Summarise a listed commit. Commits without a date cannot be windowed and are dropped.
pub fn to_commit_summary(commit: BitbucketCommit) -> Option<CommitSummary> {
    let Some(committed_at) = commit.date else {
        tracing::warn!(sha = %commit.hash, "Commit has no date, skipping");
        return None;
    };
    let (author_name, author_email) = parse_author(commit.author.as_ref());

    Some(CommitSummary {
        sha: commit.hash,
        author_name,
        author_email,
        committed_at,
    })
}

/// Running totals over diffstat pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffStatTotals {
    lines_added: u32,
    lines_removed: u32,
    files_changed: u32,
}

impl DiffStatTotals {
    pub fn add(&mut self, entries: &[DiffStatEntry]) {
        for entry in entries {
            self.lines_added = self.lines_added.saturating_add(entry.lines_added);
            self.lines_removed = self.lines_removed.saturating_add(entry.lines_removed);
            self.files_changed = self.files_changed.saturating_add(1);
        }
    }

    pub fn into_stats(self) -> CommitStats {
        CommitStats::new(self.lines_added, self.lines_removed, self.files_changed)
    }
}
