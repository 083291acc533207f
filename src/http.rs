use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use reqwest::StatusCode;
use tracing::warn;

const RETRY_BASE_DELAY_MS: u64 = 250;
const RETRY_MAX_DELAY_MS: u64 = 4_000;

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("prior-art/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Exponential backoff with full jitter, capped.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let ceiling = RETRY_BASE_DELAY_MS
        .saturating_mul(1u64 << attempt.min(8))
        .min(RETRY_MAX_DELAY_MS);
    let jittered = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
    Duration::from_millis(jittered)
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// GET a JSON document from an idempotent lookup endpoint.
///
/// Transport errors, 429 and 5xx are retried up to `retries` times with jittered
/// backoff; other non-2xx statuses fail immediately.
pub async fn get_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
    retries: u32,
) -> Result<serde_json::Value> {
    let mut attempt = 0u32;
    loop {
        let outcome = client.get(url).query(params).send().await;
        match outcome {
            Ok(resp) if resp.status().is_success() => {
                let text = resp.text().await.context("Failed to read lookup response")?;
                return serde_json::from_str(&text).context("Failed to parse lookup JSON");
            }
            Ok(resp) if is_retryable(resp.status()) && attempt < retries => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                warn!(url, status = %resp.status(), attempt, delay_ms = delay.as_millis() as u64, "Lookup throttled, retrying");
                tokio::time::sleep(delay).await;
            }
            Ok(resp) => {
                anyhow::bail!("lookup {} returned {}", url, resp.status());
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                warn!(url, attempt, delay_ms = delay.as_millis() as u64, "Lookup transport error: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("lookup request to {} failed", url)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_bounded() {
        for attempt in 0..20 {
            let delay = backoff_delay(attempt);
            assert!(delay <= Duration::from_millis(RETRY_MAX_DELAY_MS));
            assert!(delay >= Duration::from_millis(RETRY_BASE_DELAY_MS / 2));
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/works")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        // Matched after the 503 mock has used up its single expected hit.
        let ok = server
            .mock("GET", "/works")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/works", server.url());
        let value = get_json_with_retry(&client, &url, &[], 2).await.unwrap();

        failing.assert_async().await;
        ok.assert_async().await;
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let not_found = server
            .mock("GET", "/works")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/works", server.url());
        let err = get_json_with_retry(&client, &url, &[], 3).await.unwrap_err();
        assert!(err.to_string().contains("404"));
        not_found.assert_async().await;
    }
}
