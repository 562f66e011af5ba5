//! Coarse error classification persisted with every error record.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a failure was classified, and therefore how far it propagated.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum ErrorKind {
    /// Provider throttled us. Aborts the filter run.
    #[sea_orm(string_value = "rate_limit")]
    RateLimit,
    /// Provider is still computing the resource; retried with a bounded budget.
    #[sea_orm(string_value = "transient_not_ready")]
    TransientNotReady,
    /// Resource absent. Informational.
    #[sea_orm(string_value = "not_found")]
    NotFound,
    #[sea_orm(string_value = "network")]
    Network,
    #[sea_orm(string_value = "timeout")]
    Timeout,
    /// Source misconfigured or unauthenticated. Aborts the filter run.
    #[sea_orm(string_value = "auth_or_config")]
    AuthOrConfig,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this kind ends the whole filter run.
    pub fn is_run_aborting(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::AuthOrConfig)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::TransientNotReady => "TRANSIENT_NOT_READY",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::AuthOrConfig => "AUTH_OR_CONFIG",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
