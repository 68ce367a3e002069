use std::future::Future;
use std::time::Duration;

use derive_builder::Builder;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{Result, ScrapeError};

pub const DEFAULT_ENDPOINT: &str = "https://results.biserawalpindi.edu.pk/Result_Detail";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_SESSION: u32 = 2;
pub const DEFAULT_YEAR: u32 = 2025;

/// Anything that can produce the raw markup of one student's result page.
pub trait PageFetcher {
    fn fetch(&self, roll: u64, session: u32, year: u32)
        -> impl Future<Output = Result<String>> + Send;
}

/// How the three parameters reach the endpoint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UrlStyle {
    /// `?p=..&q=..&r=..` appended by the HTTP client.
    #[default]
    Query,
    /// The parameters are written into the URL string directly.
    Inline,
}

#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct FetchConfig {
    #[builder(default = "DEFAULT_ENDPOINT.to_string()")]
    endpoint: String,
    #[builder(default)]
    url_style: UrlStyle,
    #[builder(default = "DEFAULT_USER_AGENT.to_string()")]
    user_agent: String,
    #[builder(default = "Some(DEFAULT_ACCEPT.to_string())")]
    accept: Option<String>,
    #[builder(default)]
    referer: Option<String>,
    #[builder(default = "30")]
    timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            url_style: UrlStyle::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: Some(DEFAULT_ACCEPT.to_string()),
            referer: None,
            timeout_secs: 30,
        }
    }
}

/// Single-attempt HTTP fetcher for the result detail endpoint.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(accept) = &config.accept {
            headers.insert(ACCEPT, header_value(accept)?);
        }
        if let Some(referer) = &config.referer {
            headers.insert(REFERER, header_value(referer)?);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, roll: u64, session: u32, year: u32) -> Result<String> {
        let request = match self.config.url_style {
            UrlStyle::Query => self
                .client
                .get(&self.config.endpoint)
                .query(&[("p", roll), ("q", session.into()), ("r", year.into())]),
            UrlStyle::Inline => self
                .client
                .get(get_url(&self.config.endpoint, roll, session, year)),
        };
        debug!(roll, session, year, "fetching result page");

        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::transport(roll, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::transport(roll, format!("HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| ScrapeError::transport(roll, e))
    }
}

fn get_url(endpoint: &str, roll: u64, session: u32, year: u32) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{sep}p={roll}&q={session}&r={year}")
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ScrapeError::Config(format!("{value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    /// Answers every connection once and hands back the request head.
    /// Roll number 500 gets a server error.
    async fn serve(listener: TcpListener, heads: mpsc::UnboundedSender<String>) {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut head = vec![];
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8_lossy(&head).into_owned();
            let (status, body) = if head.contains("p=500&") {
                ("500 Internal Server Error", "")
            } else {
                ("200 OK", "<p>Roll No</p><span>103683</span>")
            };
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            heads.send(head).unwrap();
        }
    }

    async fn local_fetcher(style: UrlStyle) -> (HttpFetcher, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(serve(listener, tx));

        let config = FetchConfigBuilder::default()
            .endpoint(format!("http://{addr}/Result_Detail"))
            .url_style(style)
            .referer(format!("http://{addr}/"))
            .timeout_secs(5u64)
            .build()
            .unwrap();
        (HttpFetcher::new(config).unwrap(), rx)
    }

    #[test]
    fn inline_url_should_work() {
        assert_eq!(
            get_url(DEFAULT_ENDPOINT, 103683, 2, 2025),
            "https://results.biserawalpindi.edu.pk/Result_Detail?p=103683&q=2&r=2025"
        );
        assert_eq!(
            get_url("http://localhost/r?x=1", 1, 1, 2024),
            "http://localhost/r?x=1&p=1&q=1&r=2024"
        );
    }

    #[test]
    fn config_builder_should_fill_defaults() {
        let config = FetchConfigBuilder::default()
            .url_style(UrlStyle::Inline)
            .build()
            .unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.url_style, UrlStyle::Inline);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert!(HttpFetcher::new(config).is_ok());
    }

    #[test]
    fn url_style_should_parse() {
        assert_eq!("query".parse::<UrlStyle>().unwrap(), UrlStyle::Query);
        assert_eq!("INLINE".parse::<UrlStyle>().unwrap(), UrlStyle::Inline);
        assert_eq!(UrlStyle::Inline.to_string(), "inline");
    }

    #[tokio::test]
    async fn fetch_should_send_params_and_browser_headers() {
        for style in [UrlStyle::Query, UrlStyle::Inline] {
            let (fetcher, mut heads) = local_fetcher(style).await;
            let page = fetcher.fetch(103683, 2, 2025).await.unwrap();
            assert!(page.contains("103683"), "{style}");

            let head = heads.recv().await.unwrap();
            let request_line = head.lines().next().unwrap();
            assert_eq!(
                request_line,
                "GET /Result_Detail?p=103683&q=2&r=2025 HTTP/1.1",
                "{style}"
            );
            let head = head.to_ascii_lowercase();
            assert!(head.contains("\r\nuser-agent: mozilla/5.0"), "{style}");
            assert!(head.contains("\r\naccept: text/html,"), "{style}");
            assert!(head.contains("\r\nreferer: http://127.0.0.1:"), "{style}");
        }
    }

    #[tokio::test]
    async fn server_error_should_be_transport_error() {
        for style in [UrlStyle::Query, UrlStyle::Inline] {
            let (fetcher, _heads) = local_fetcher(style).await;
            let err = fetcher.fetch(500, 2, 2025).await.unwrap_err();
            assert!(
                matches!(err, ScrapeError::Transport { roll: 500, ref reason } if reason.contains("500")),
                "{style}"
            );
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_should_be_transport_error() {
        let config = FetchConfigBuilder::default()
            .endpoint("http://127.0.0.1:9/Result_Detail")
            .timeout_secs(2u64)
            .build()
            .unwrap();
        let fetcher = HttpFetcher::new(config).unwrap();
        let err = fetcher.fetch(1, 2, 2025).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Transport { roll: 1, .. }));
    }
}
