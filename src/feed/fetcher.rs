use crate::feed::parser::{parse_feed, ParseError, RssFeed};
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// Request timeout used when the config does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors raised while retrieving a feed document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// No complete response within the client timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

/// Anything that stops [`FeedClient::fetch`] from producing an [`RssFeed`].
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// `gator/<crate version>`
pub fn default_user_agent() -> String {
    format!("gator/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP client for RSS sources. Stateless apart from the connection pool,
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl FeedClient {
    /// Build a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// [`FetchError::Network`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect_policy())
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch `url` once and parse the body as RSS.
    ///
    /// No retries: a failed fetch is reported and the caller decides when to
    /// try again. The store is never touched.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection, DNS or TLS errors
    /// - [`FetchError::Timeout`] - No complete response within the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded 10MB
    /// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
    /// - [`ParseError`] - Body is not a readable RSS document
    pub async fn fetch(&self, url: &str) -> Result<RssFeed, FeedError> {
        let bytes = self.fetch_bytes(url).await?;
        let feed = parse_feed(&bytes)?;

        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = feed.items.len(),
            "Fetched feed"
        );
        Ok(feed)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        // The reqwest timeout covers the whole exchange; the outer one also
        // bounds DNS resolution and body streaming on every platform.
        let response = tokio::time::timeout(self.timeout, self.http.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <link>https://example.com/</link>
    <item>
        <title>Hello</title>
        <link>https://example.com/hello</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
    </item>
</channel></rss>"#;

    fn test_client() -> FeedClient {
        FeedClient::new(Duration::from_secs(5), "gator-test/1.0").unwrap()
    }

    async fn serve(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .await;

        let feed = test_client()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(feed.title, "Test Feed");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link, "https://example.com/hello");
        assert_eq!(feed.items[0].pub_date, "Mon, 02 Jan 2006 15:04:05 -0700");
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "gator-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = test_client().fetch(&mock_server.uri()).await;
        assert!(result.is_ok(), "got {result:?}");
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = serve(ResponseTemplate::new(404)).await;

        let err = test_client()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();

        match err {
            FeedError::Fetch(FetchError::HttpStatus(404)) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = test_client().fetch(&mock_server.uri()).await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = serve(ResponseTemplate::new(200).set_body_string("<not valid xml")).await;

        let err = test_client()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();

        match err {
            FeedError::Parse(_) => {}
            e => panic!("Expected Parse error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = serve(
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_millis(500)),
        )
        .await;

        let client = FeedClient::new(Duration::from_millis(100), "gator-test/1.0").unwrap();
        let err = client
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();

        match err {
            FeedError::Fetch(FetchError::Timeout) => {}
            e => panic!("Expected Timeout, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server =
            serve(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; MAX_FEED_SIZE + 1])).await;

        let err = test_client()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FeedError::Fetch(FetchError::ResponseTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let err = test_client()
            .fetch("http://127.0.0.1:1/feed")
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Fetch(FetchError::Network(_))));
    }

    #[test]
    fn test_default_user_agent() {
        assert!(default_user_agent().starts_with("gator/"));
    }
}
