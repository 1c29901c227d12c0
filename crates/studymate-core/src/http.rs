use std::time::Duration;

use reqwest::{Client, Response};
use studymate_traits::ServiceError;
use tracing::warn;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) fn build_client(timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);
    if cfg!(test) || std::env::var_os("STUDYMATE_DISABLE_SYSTEM_PROXY").is_some() {
        builder = builder.no_proxy();
    }
    match builder.build() {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "Failed to build HTTP client, using defaults");
            Client::new()
        }
    }
}

pub(crate) fn transport(service: &str, err: reqwest::Error) -> ServiceError {
    ServiceError::transport(service, err)
}

/// Pass successful responses through; turn the rest into [`ServiceError::Http`].
pub(crate) async fn check(service: &str, response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(ServiceError::Http {
        service: service.to_string(),
        status: status.as_u16(),
        message,
    })
}
