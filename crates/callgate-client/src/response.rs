//! Response decoding shared by both clients.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Decode a successful response. `204` and empty bodies yield `None`.
pub(crate) async fn read_body<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

/// Error body of a failed response: message plus parsed JSON, if any.
pub(crate) async fn error_parts(
    response: reqwest::Response,
) -> (u16, Option<String>, Option<serde_json::Value>) {
    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let text = response.text().await.unwrap_or_default();
    if is_json && let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());
        return (status, Some(message), Some(value));
    }

    let message = Some(text).filter(|t| !t.trim().is_empty());
    (status, message, None)
}

/// Turn a failed response into [`Error::Api`].
pub(crate) async fn api_error(response: reqwest::Response) -> Error {
    let (status, message, details) = error_parts(response).await;
    Error::Api {
        status,
        message: message.unwrap_or_else(|| "Request failed".to_string()),
        details,
    }
}
