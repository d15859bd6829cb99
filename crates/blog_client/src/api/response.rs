use log::{debug, warn};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};

/// Decode a JSON body, or turn a non-success status into an `ApiError`.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Drop the body of a successful response.
pub(crate) async fn expect_empty(response: Response) -> ApiResult<()> {
    ensure_success(response).await.map(|_| ())
}

async fn ensure_success(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!("Failed to read error body from {}: {}", url, err);
            String::new()
        }
    };
    debug!("{} returned {}: {}", url, status, body);
    Err(ApiError::from_status(status.as_u16(), &body))
}
