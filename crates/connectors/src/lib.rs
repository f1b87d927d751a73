//! HTTP-backed collaborators. Every client is blocking with a short timeout;
//! the pipeline calls them from worker threads.

mod google_translate;
mod line_notify;
mod llm_translate;
mod places;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use tabi_core::CollaboratorError;

pub use google_translate::GoogleTranslateClient;
pub use line_notify::{format_escalation, LineNotifier};
pub use llm_translate::{build_prompt, strip_preamble, LlmTranslateClient};
pub use places::{parse_places, PlacesClient, MAX_RESULTS};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .build()
        .context("failed building HTTP client")
}

pub(crate) fn send_error(service: &'static str, error: reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::Timeout { service }
    } else {
        CollaboratorError::unavailable(service, error.to_string())
    }
}

/// Non-2xx responses become `Unavailable` with the status and a body excerpt.
pub(crate) fn check_status(service: &'static str, response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(CollaboratorError::unavailable(
        service,
        format!("HTTP {}: {}", status.as_u16(), excerpt),
    ))
}
