//! GitHub `Link` header parsing.

use url::Url;

use crate::connector::pagination::next_page_url;
use crate::http::{HttpHeaders, header_get};

/// Relations extracted from GitHub's `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRelations {
    /// Target of `rel="next"`.
    pub next: Option<String>,
    /// Target of `rel="last"`.
    pub last: Option<String>,
}

/// Parse the Link header.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/organizations/123/repos?per_page=100&page=2>; rel="next", <...&page=3>; rel="last"`
pub fn parse_link_header(link_header: &str) -> LinkRelations {
    let mut relations = LinkRelations::default();

    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel)) = (url, rel) {
            match rel {
                "next" => relations.next = Some(url.to_string()),
                "last" => relations.last = Some(url.to_string()),
                _ => {}
            }
        }
    }

    relations
}

/// The validated `rel="next"` target of a response, if any.
pub fn next_link(base: &Url, headers: &HttpHeaders) -> Option<Url> {
    let relations = parse_link_header(header_get(headers, "link")?);
    next_page_url(base, relations.next.as_deref())
}
