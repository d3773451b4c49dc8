//! HTTP transport towards the scan target
//!
//! Wraps a `reqwest::Client` bound to a single target origin. Responses of any
//! status are returned as [`Fetched`]; only transport failures are errors.

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, SERVER};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Allowed URL schemes
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// A response read to completion
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub headers: HeaderMap,
    /// Body decoded lossily, so binary payloads never fail the read
    pub body: String,
}

impl Fetched {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Header value as text, if present and valid
    pub fn header(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    pub fn server(&self) -> Option<&str> {
        self.header(SERVER)
    }
}

/// Client for one target origin
#[derive(Debug, Clone)]
pub struct TargetClient {
    client: Client,
    origin: Url,
}

impl TargetClient {
    /// Build a client for the origin of `url`
    ///
    /// A missing scheme defaults to https. Paths, queries and fragments are
    /// dropped: every probe addresses paths relative to the origin root.
    pub async fn new(url: &str, config: &ScanConfig) -> Result<Self> {
        let origin = parse_origin(url)?;

        if !config.allow_private {
            validate_host(&origin).await?;
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Absolute URL for a path under the origin
    pub fn url(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", path, e)))
    }

    pub async fn get(&self, path: &str) -> Result<Fetched> {
        let url = self.url(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;
        read(response).await
    }

    /// POST an XML document (XML-RPC)
    pub async fn post_xml(&self, path: &str, body: String) -> Result<Fetched> {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;
        read(response).await
    }
}

async fn read(response: reqwest::Response) -> Result<Fetched> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::HttpRequest(e.to_string()))?;
    Ok(Fetched {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Parse user input into a bare origin URL (`scheme://host[:port]/`)
pub fn parse_origin(url: &str) -> Result<Url> {
    // Auto-add https:// if no scheme provided
    let url_with_scheme = if !url.contains("://") {
        format!("https://{}", url)
    } else {
        url.to_string()
    };

    let parsed = Url::parse(&url_with_scheme).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(Error::InvalidUrl(format!(
            "scheme '{}' not allowed (use http or https)",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(Error::InvalidUrl("missing host".to_string()));
    }

    let origin = parsed.origin().ascii_serialization();
    Url::parse(&format!("{}/", origin)).map_err(|e| Error::InvalidUrl(e.to_string()))
}

/// Validate that the host is not an internal/private address (SSRF protection)
async fn validate_host(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?;

    if host == "localhost" || host.ends_with(".localhost") {
        return Err(Error::InvalidUrl("localhost not allowed".to_string()));
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(addrs) = tokio::net::lookup_host((host, port)).await {
        for addr in addrs {
            if is_internal_ip(addr.ip()) {
                return Err(Error::InvalidUrl(format!(
                    "internal/private IP address not allowed: {}",
                    addr.ip()
                )));
            }
        }
    }

    Ok(())
}

/// Check if an IP address is internal/private (RFC 1918, link-local, loopback, etc.)
fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let [a, b, ..] = ipv4.octets();
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                // Shared address space 100.64.0.0/10
                || (a == 100 && (64..=127).contains(&b))
                || (a == 192 && b == 0)
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique local (fc00::/7) and link-local (fe80::/10)
                || (ipv6.segments()[0] & 0xfe00) == 0xfc00
                || (ipv6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
