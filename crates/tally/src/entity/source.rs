//! Source enum identifying which provider a record came from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Supported commit-history sources.
///
/// Each variant is one provider API style, not a specific deployment: a
/// GitHub Enterprise host is still `Source::GitHub`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum Source {
    /// GitHub-style organization API.
    #[sea_orm(string_value = "github")]
    GitHub,
    /// Bitbucket-style workspace API.
    #[sea_orm(string_value = "bitbucket_cloud")]
    BitbucketCloud,
}

impl Source {
    /// Human-facing provider name used in logs and error contexts.
    pub fn display_name(self) -> &'static str {
        match self {
            Source::GitHub => "GitHub",
            Source::BitbucketCloud => "BitbucketCloud",
        }
    }

    /// Every known source, in run order.
    pub fn all() -> [Source; 2] {
        [Source::GitHub, Source::BitbucketCloud]
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::GitHub => write!(f, "github"),
            Source::BitbucketCloud => write!(f, "bitbucket_cloud"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Source::GitHub),
            "bitbucket" | "bitbucket_cloud" | "bitbucketcloud" | "bitbucket-cloud" => {
                Ok(Source::BitbucketCloud)
            }
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}
