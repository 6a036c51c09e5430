//! Shared HTTP client construction.

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client with the standard connect/request timeouts.
#[must_use]
pub fn default_client() -> reqwest::Client {
    client_with_timeout(REQUEST_TIMEOUT)
}

/// Build a client whose whole-request timeout is `request_timeout`.
///
/// Connect timeout is capped at the request timeout so a short rerank budget
/// is not outlived by a slow TCP handshake.
#[must_use]
pub fn client_with_timeout(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .user_agent(concat!("sintesi/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("HTTP client construction must not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_short_timeout() {
        let client = client_with_timeout(Duration::from_millis(250));
        let dbg = format!("{client:?}");
        assert!(dbg.contains("Client"));
    }
}
