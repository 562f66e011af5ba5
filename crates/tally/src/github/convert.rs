//! Conversion from GitHub payloads to connector types.

use chrono::{DateTime, Utc};

use crate::connector::{CommitStats, CommitSummary, RepositoryActivity, RepositoryDescriptor};

use super::types::{ContributorActivity, GitHubCommit, GitHubRepo};

/// Fallback author when neither the commit nor the account names one.
pub const UNKNOWN_AUTHOR: &str = "unknown";

pub fn to_repository(repo: GitHubRepo) -> RepositoryDescriptor {
    RepositoryDescriptor {
        slug: repo.name.clone(),
        name: repo.name,
        full_name: repo.full_name,
        project_key: None,
    }
}

/// Summarise a listed commit.
///
/// Author name prefers the git author, then the account login. The commit
/// time prefers the committer date, then the author date, then `now`.
pub fn to_commit_summary(commit: GitHubCommit, now: DateTime<Utc>) -> CommitSummary {
    let git_author = commit.commit.author.as_ref();

    let author_name = git_author
        .and_then(|a| a.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| commit.author.as_ref().map(|account| account.login.clone()))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let author_email = git_author
        .and_then(|a| a.email.as_deref())
        .filter(|email| !email.is_empty())
        .map(str::to_string);

    let committed_at = commit
        .commit
        .committer
        .as_ref()
        .and_then(|c| c.date)
        .or_else(|| git_author.and_then(|a| a.date))
        .unwrap_or(now);

    CommitSummary {
        sha: commit.sha,
        author_name,
        author_email,
        committed_at,
    }
}

/// Line and file counts from the single-commit payload.
pub fn to_commit_stats(commit: &GitHubCommit) -> CommitStats {
    match commit.stats {
        Some(stats) => CommitStats {
            lines_added: Some(stats.additions),
            lines_removed: Some(stats.deletions),
            files_changed: commit
                .files
                .as_ref()
                .map(|files| u32::try_from(files.len()).unwrap_or(u32::MAX)),
        },
        None => CommitStats::unavailable(),
    }
}

pub fn to_activity(contributors: &[ContributorActivity]) -> RepositoryActivity {
    RepositoryActivity {
        total_commits: contributors.iter().map(|c| c.total).sum(),
        contributor_count: u32::try_from(contributors.len()).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn commit(value: serde_json::Value) -> GitHubCommit {
        serde_json::from_value(value).expect("valid commit payload")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_uses_git_author_and_committer_date() {
        let summary = to_commit_summary(
            commit(json!({
                "sha": "abc1234def",
                "commit": {
                    "author": {"name": "Ada", "email": "ada@example.com", "date": "2024-03-01T10:00:00Z"},
                    "committer": {"name": "GitHub", "email": "noreply@github.com", "date": "2024-03-02T10:00:00Z"}
                },
                "author": {"login": "ada-l"}
            })),
            now(),
        );

        assert_eq!(summary.author_name, "Ada");
        assert_eq!(summary.author_email.as_deref(), Some("ada@example.com"));
        assert_eq!(
            summary.committed_at,
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_summary_falls_back_to_login_then_unknown() {
        let with_login = to_commit_summary(
            commit(json!({
                "sha": "1",
                "commit": {"author": {"name": "  ", "date": "2024-03-01T10:00:00Z"}},
                "author": {"login": "octocat"}
            })),
            now(),
        );
        assert_eq!(with_login.author_name, "octocat");
        assert_eq!(
            with_login.committed_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );

        let anonymous = to_commit_summary(
            commit(json!({"sha": "2", "commit": {}, "author": null})),
            now(),
        );
        assert_eq!(anonymous.author_name, UNKNOWN_AUTHOR);
        assert_eq!(anonymous.author_email, None);
        assert_eq!(anonymous.committed_at, now());
    }

    #[test]
    fn test_commit_stats_from_detail() {
        let detail = commit(json!({
            "sha": "1",
            "commit": {},
            "stats": {"additions": 12, "deletions": 3, "total": 15},
            "files": [{"filename": "a.rs"}, {"filename": "b.rs"}]
        }));
        assert_eq!(to_commit_stats(&detail), CommitStats::new(12, 3, 2));

        let bare = commit(json!({"sha": "1", "commit": {}}));
        assert_eq!(to_commit_stats(&bare), CommitStats::unavailable());
    }

    #[test]
    fn test_activity_sums_contributors() {
        let contributors: Vec<ContributorActivity> = serde_json::from_value(json!([
            {"total": 10, "author": {"login": "a"}},
            {"total": 5, "author": null}
        ]))
        .unwrap();

        assert_eq!(
            to_activity(&contributors),
            RepositoryActivity {
                total_commits: 15,
                contributor_count: 2
            }
        );
    }
}
