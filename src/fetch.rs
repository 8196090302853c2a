use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::config::{CONNECT_TIMEOUT_SECS, INSECURE_SSL_ENV, REQUEST_TIMEOUT_SECS, USER_AGENT};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("URL did not return HTML")]
    NotHtml,
    #[error("upstream returned HTTP {0}")]
    Upstream(u16),
    #[error("{0}")]
    Request(String),
    #[error("renderer error (status {status}): {message}")]
    Renderer { status: u16, message: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Request(format!("TimeoutError: {}", e))
        } else if e.is_connect() {
            FetchError::Request(format!("ConnectError: {}", e))
        } else {
            FetchError::Request(format!("RequestError: {}", e))
        }
    }
}

// ── Page source contract ─────────────────────────────────────────────────────

/// Whatever turns a listing URL into rendered HTML and image bytes.
#[async_trait]
pub trait PageSource {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed =
        Url::parse(url).map_err(|_| FetchError::InvalidUrl(format!("Invalid URL: {url}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl(format!(
            "Only http(s) URLs are allowed, got {other}"
        ))),
    }
}

fn build_client() -> Result<reqwest::Client, FetchError> {
    let insecure = std::env::var(INSECURE_SSL_ENV).as_deref() == Ok("1");

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        reqwest::header::HeaderValue::from_static("pt-PT,pt;q=0.9,en;q=0.8"),
    );

    let mut builder = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(USER_AGENT)
        .default_headers(headers);

    if insecure {
        tracing::warn!("{} is set, TLS certificates are not verified", INSECURE_SSL_ENV);
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| FetchError::Request(e.to_string()))
}

/// Formats the deck can embed come first, so content-negotiating CDNs do not
/// answer with WebP or AVIF.
const IMAGE_ACCEPT: &str = "image/jpeg,image/png,image/gif;q=0.9,*/*;q=0.1";

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    validate_url(url)?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, IMAGE_ACCEPT)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(FetchError::Upstream(response.status().as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}

// ── Direct HTTP ──────────────────────────────────────────────────────────────

/// Plain GET with browser-like headers. Enough for portals that render
/// server-side.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        validate_url(url)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Upstream(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if !content_type.contains("text/html") {
            return Err(FetchError::NotHtml);
        }

        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        get_bytes(&self.client, url).await
    }
}

// ── Headless browser ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ContentRequest<'a> {
    url: &'a str,
}

/// Renders pages in headless Chromium through a Browserless `/content`
/// endpoint, for portals that only fill in the listing client-side.
pub struct BrowserlessRenderer {
    client: reqwest::Client,
    endpoint: Url,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client()?,
            endpoint: content_endpoint(base_url, token)?,
        })
    }
}

fn content_endpoint(base_url: &str, token: Option<&str>) -> Result<Url, FetchError> {
    let raw = format!("{}/content", base_url.trim_end_matches('/'));
    let mut endpoint = validate_url(&raw)?;
    if let Some(token) = token {
        endpoint.query_pairs_mut().append_pair("token", token);
    }
    Ok(endpoint)
}

#[async_trait]
impl PageSource for BrowserlessRenderer {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        validate_url(url)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ContentRequest { url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Renderer {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        get_bytes(&self.client, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://www.imovirtual.com/pt/anuncio/x").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/a"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_content_endpoint() {
        let endpoint = content_endpoint("http://localhost:3000/", Some("secret")).unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:3000/content?token=secret");

        let endpoint = content_endpoint("http://localhost:3000", None).unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:3000/content");
    }

    #[test]
    fn test_content_endpoint_encodes_token() {
        let endpoint = content_endpoint("http://localhost:3000", Some("a&b=c d")).unwrap();
        assert_eq!(endpoint.query(), Some("token=a%26b%3Dc+d"));
        assert!(content_endpoint("not a url", None).is_err());
    }

    /// Serve one canned HTTP response on a local port; the handle yields the
    /// raw request that was received.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}", addr), handle)
    }

    fn response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_fetch_html_ok() {
        let (base, server) =
            serve_once(response("200 OK", "text/html; charset=utf-8", "<h1>T2</h1>")).await;
        let html = HttpFetcher::new()
            .unwrap()
            .fetch_html(&format!("{base}/anuncio"))
            .await
            .unwrap();
        assert_eq!(html, "<h1>T2</h1>");
        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /anuncio http/1.1"));
        assert!(request.contains("accept: text/html"));
    }

    #[tokio::test]
    async fn test_fetch_html_rejects_error_status() {
        let (base, server) = serve_once(response("404 Not Found", "text/html", "gone")).await;
        let err = HttpFetcher::new()
            .unwrap()
            .fetch_html(&format!("{base}/anuncio"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Upstream(404)));
        assert_eq!(err.to_string(), "upstream returned HTTP 404");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_html_rejects_non_html() {
        let (base, server) =
            serve_once(response("200 OK", "application/json", r#"{"ok":true}"#)).await;
        let err = HttpFetcher::new()
            .unwrap()
            .fetch_html(&format!("{base}/api"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotHtml));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_bytes_prefers_embeddable_formats() {
        let (base, server) = serve_once(response("200 OK", "image/jpeg", "jpeg")).await;
        let bytes = HttpFetcher::new()
            .unwrap()
            .fetch_bytes(&format!("{base}/photo.jpg"))
            .await
            .unwrap();
        assert_eq!(bytes, b"jpeg");

        let request = server.await.unwrap().to_lowercase();
        let accept = request
            .lines()
            .find_map(|l| l.strip_prefix("accept:"))
            .unwrap()
            .trim()
            .to_string();
        assert!(accept.starts_with("image/jpeg"));
        assert!(!accept.contains("image/webp"));
        assert!(!accept.contains("image/avif"));
    }

    #[tokio::test]
    async fn test_renderer_surfaces_error_body() {
        let (base, server) =
            serve_once(response("500 Internal Server Error", "text/plain", "browser crashed")).await;
        let renderer = BrowserlessRenderer::new(&base, Some("secret")).unwrap();
        let err = renderer
            .fetch_html("https://www.imovirtual.com/pt/anuncio/x")
            .await
            .unwrap_err();
        match err {
            FetchError::Renderer { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "browser crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /content?token=secret HTTP/1.1"));
        assert!(request.ends_with(r#"{"url":"https://www.imovirtual.com/pt/anuncio/x"}"#));
    }
}
