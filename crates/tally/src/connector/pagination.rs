//! Lazy, restartable sequences over a connector's page functions.
//!
//! Each call starts a fresh walk from the first page. Pages are only
//! requested while the consumer keeps polling, so dropping the stream (or
//! ending it with an early-termination condition) stops all further requests.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use url::Url;

use super::errors::Result;
use super::types::{
    CommitOrdering, CommitSummary, Page, PageRequest, RepositoryDescriptor, SourceConnector,
};

/// A lazily fetched sequence of items; the first error ends it.
pub type ItemStream<'a, T> = BoxStream<'a, Result<T>>;

struct Cursor<T> {
    buffer: VecDeque<T>,
    next: Option<PageRequest>,
    visited: HashSet<String>,
}

impl<T> Cursor<T> {
    fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            next: Some(PageRequest::First),
            visited: HashSet::new(),
        }
    }

    /// Queue the next page, refusing references that would loop.
    fn advance(&mut self, page: Page<T>) {
        self.buffer.extend(page.items);

        self.next = match page.next {
            Some(url) if !self.visited.insert(url.as_str().to_string()) => {
                tracing::warn!(url = %url, "Next page reference repeats an earlier page, stopping");
                None
            }
            Some(url) => Some(PageRequest::Next(url)),
            None => None,
        };
    }
}

/// Drive a page function until the provider runs out of pages.
pub fn paginate<'a, T, F, Fut>(fetch: F) -> ItemStream<'a, T>
where
    T: Send + 'a,
    F: Fn(PageRequest) -> Fut + Send + Sync + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    let fetch = Arc::new(fetch);

    stream::try_unfold(Cursor::new(), move |mut cursor| {
        let fetch = Arc::clone(&fetch);
        async move {
            loop {
                if let Some(item) = cursor.buffer.pop_front() {
                    return Ok(Some((item, cursor)));
                }
                let Some(request) = cursor.next.take() else {
                    return Ok(None);
                };
                let page = (*fetch)(request).await?;
                cursor.advance(page);
            }
        }
    })
    .boxed()
}

/// Repositories matching `filter`, page by page.
pub fn repositories<'a>(
    connector: &'a dyn SourceConnector,
    filter: &'a str,
) -> ItemStream<'a, RepositoryDescriptor> {
    paginate(move |page| connector.list_repositories_page(filter, page))
}

/// Commits in `repo` at or after `since`.
///
/// For [`CommitOrdering::NewestFirst`] the stream ends at the first commit
/// strictly older than `since`, without requesting later pages. Otherwise
/// every page is read and out-of-window commits are dropped.
pub fn commits_since<'a>(
    connector: &'a dyn SourceConnector,
    repo: &'a RepositoryDescriptor,
    since: DateTime<Utc>,
) -> ItemStream<'a, CommitSummary> {
    let pages = paginate(move |page| connector.list_commits_page(repo, since, page));

    match connector.commit_ordering() {
        CommitOrdering::NewestFirst => pages
            .take_while(move |item| {
                let in_window = !matches!(item, Ok(commit) if commit.committed_at < since);
                if !in_window {
                    tracing::debug!(
                        repo = %repo.full_name,
                        since = %since,
                        "Reached commits older than since"
                    );
                }
                futures::future::ready(in_window)
            })
            .boxed(),
        CommitOrdering::Unspecified => pages
            .try_filter(move |commit| futures::future::ready(commit.committed_at >= since))
            .boxed(),
    }
}

/// Validate a provider-supplied next-page reference.
///
/// Anything that is not an absolute URL on `base`'s host ends the walk.
pub fn next_page_url(base: &Url, raw: Option<&str>) -> Option<Url> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    match Url::parse(raw) {
        Ok(url) if url.host_str() == base.host_str() && url.scheme() == base.scheme() => Some(url),
        Ok(url) => {
            tracing::warn!(url = %url, "Next page reference points at another host, stopping");
            None
        }
        Err(e) => {
            tracing::warn!(
                reference = raw,
                error = %e,
                "Unparseable next page reference, stopping"
            );
            None
        }
    }
}
