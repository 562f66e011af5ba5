use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entity::error_kind::ErrorKind;
use crate::http::{HttpError, HttpHeaders, HttpResponse, header_get};

/// Quota details a provider attached to a throttling response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests left in the current window.
    pub remaining: Option<u32>,
    /// When the window resets.
    pub reset_at: Option<DateTime<Utc>>,
    /// Seconds the provider asked us to wait.
    pub retry_after_secs: Option<u64>,
}

impl RateLimitInfo {
    /// Read `x-ratelimit-*` and `retry-after` headers.
    pub fn from_headers(headers: &HttpHeaders) -> Self {
        let remaining = header_get(headers, "x-ratelimit-remaining")
            .and_then(|v| v.trim().parse::<u32>().ok());
        let reset_at = header_get(headers, "x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0));
        let retry_after_secs =
            header_get(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            remaining,
            reset_at,
            retry_after_secs,
        }
    }

    /// Whether the headers say the quota is spent.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0) || self.retry_after_secs.is_some()
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(remaining) = self.remaining {
            parts.push(format!("remaining {}", remaining));
        }
        if let Some(reset_at) = self.reset_at {
            parts.push(format!("resets at {}", reset_at.to_rfc3339()));
        }
        if let Some(secs) = self.retry_after_secs {
            parts.push(format!("retry after {}s", secs));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" ({})", parts.join(", "))
        }
    }
}

/// Errors raised while talking to a provider.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Provider is throttling us.
    #[error("HTTP {status}: rate limit exceeded{}", .limit.describe())]
    RateLimited { status: u16, limit: RateLimitInfo },

    /// Provider is still computing the resource.
    #[error("HTTP {status}: {resource} is not ready yet")]
    NotReady { status: u16, resource: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Credentials rejected.
    #[error("HTTP {status}: authentication failed: {message}")]
    Auth { status: u16, message: String },

    /// Connector cannot run with its current settings.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Failed to decode {resource}: {message}")]
    Decode { resource: String, message: String },
}

impl ConnectorError {
    /// Create a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Classify a non-success response.
    pub fn from_response(response: &HttpResponse, resource: &str) -> Self {
        let status = response.status;
        let limit = RateLimitInfo::from_headers(&response.headers);
        let body = String::from_utf8_lossy(&response.body).trim().to_string();

        match status {
            429 => Self::RateLimited { status, limit },
            403 if limit.is_exhausted() => Self::RateLimited { status, limit },
            202 => Self::NotReady {
                status,
                resource: resource.to_string(),
            },
            401 | 403 => Self::Auth {
                status,
                message: if body.is_empty() {
                    resource.to_string()
                } else {
                    body
                },
            },
            404 | 410 => Self::not_found(resource),
            _ => Self::Api {
                status,
                message: if body.is_empty() {
                    format!("unexpected response for {}", resource)
                } else {
                    body
                },
            },
        }
    }

    /// Map onto the persisted error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::NotReady { .. } => ErrorKind::TransientNotReady,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Auth { .. } | Self::Config(_) => ErrorKind::AuthOrConfig,
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Api { .. } | Self::Decode { .. } => ErrorKind::Unknown,
        }
    }

    /// HTTP status behind this error, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::NotReady { status, .. }
            | Self::Auth { status, .. }
            | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure is source-wide: throttling or rejected credentials.
    #[inline]
    pub fn is_run_aborting(&self) -> bool {
        self.kind().is_run_aborting()
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<HttpError> for ConnectorError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(message) => Self::Timeout(message),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;
