use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::http::{HttpHeaders, HttpRequest, HttpResponse, HttpTransport};

use super::errors::ConnectorError;
use super::rate_limit::ApiRateLimiter;
use super::types::FetchOutcome;

/// A decoded body together with the response headers.
#[derive(Debug, Clone)]
pub struct JsonResponse<T> {
    pub body: T,
    pub headers: HttpHeaders,
}

/// Authenticated JSON `GET` client shared by the provider connectors.
///
/// Every response is classified into a [`FetchOutcome`]:
/// - 2xx except 202/204 → `Data`
/// - 202 → `Retryable` (not yet computed)
/// - 204, 404, 409, 410 → `Empty`
/// - anything else → `Failed`
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    headers: HttpHeaders,
    rate_limiter: Option<ApiRateLimiter>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        headers: HttpHeaders,
        rate_limiter: Option<ApiRateLimiter>,
    ) -> Self {
        Self {
            transport,
            headers,
            rate_limiter,
        }
    }

    async fn send(&self, url: &str) -> Result<HttpResponse, ConnectorError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        tracing::trace!(url, "GET");
        let response = self
            .transport
            .send(HttpRequest {
                url: url.to_string(),
                headers: self.headers.clone(),
            })
            .await?;
        Ok(response)
    }

    /// `GET` a URL and decode the JSON body.
    ///
    /// `resource` names the thing being fetched in error messages.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
    ) -> FetchOutcome<JsonResponse<T>> {
        let response = match self.send(url).await {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Failed(err),
        };

        match response.status {
            202 => FetchOutcome::Retryable(ConnectorError::NotReady {
                status: 202,
                resource: resource.to_string(),
            }),
            204 | 404 | 409 | 410 => {
                tracing::debug!(status = response.status, resource, "No content");
                FetchOutcome::Empty
            }
            _ if response.is_success() => match serde_json::from_slice::<T>(&response.body) {
                Ok(body) => FetchOutcome::Data(JsonResponse {
                    body,
                    headers: response.headers,
                }),
                Err(e) => FetchOutcome::Failed(ConnectorError::Decode {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }),
            },
            _ => FetchOutcome::Failed(ConnectorError::from_response(&response, resource)),
        }
    }
}
