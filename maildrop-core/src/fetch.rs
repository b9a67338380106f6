//! One-shot URL fetch used to answer the engine's HTTP_GET callback.

use crate::RUNTIME;

/// Fetch `url` with a single GET and return the response body.
///
/// Any connection or read failure comes back as empty bytes: the engine
/// reads an empty reply as "no content" and must not be stalled by a
/// network error.
pub fn fetch_url(url: &str) -> Vec<u8> {
    RUNTIME.block_on(async {
        match get(url).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("GET {url} failed: {err}");
                Vec::new()
            }
        }
    })
}

async fn get(url: &str) -> reqwest::Result<Vec<u8>> {
    let response = reqwest::get(url).await?;
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_yields_empty_body() {
        // Port 1 on loopback refuses the connection immediately.
        assert!(fetch_url("http://127.0.0.1:1/nothing").is_empty());
    }

    #[test]
    fn malformed_url_yields_empty_body() {
        assert!(fetch_url("not a url").is_empty());
    }
}
