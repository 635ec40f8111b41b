//! Endpoint discovery.
//!
//! A configured base URL is resolved through the server's `/signalk`
//! document into a stream URL and an HTTP API base. Base URLs written with
//! a `ws:`/`wss:` scheme by older configurations are treated as their
//! `http:`/`https:` equivalents.

use std::time::Duration;

use async_trait::async_trait;
use signalk_protocol::{decode_discovery, DiscoveryResponse};
use tracing::debug;
use url::Url;

use crate::error::{DiscoveryError, TransportError};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Map a legacy stream scheme to HTTP and drop any trailing slash.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    let normalized = if let Some(rest) = url.strip_prefix("ws:") {
        format!("http:{rest}")
    } else if let Some(rest) = url.strip_prefix("wss:") {
        format!("https:{rest}")
    } else {
        url.to_string()
    };
    normalized.trim_end_matches('/').to_string()
}

/// Where the discovery document for `base_url` lives.
pub fn discovery_url(base_url: &str) -> String {
    format!("{}/signalk", normalize_base_url(base_url))
}

/// Endpoints selected from a discovery document.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    /// Stream endpoint without query parameters.
    pub stream_base: String,
    /// REST API base, always ending in `/`.
    pub http_url: Option<String>,
}

impl ResolvedEndpoint {
    /// The URL to open: no implicit subscription, and our update rates.
    ///
    /// `updateRate` is in seconds and `staticUpdateRate` in minutes.
    pub fn stream_url(
        &self,
        update_period: Duration,
        static_period: Duration,
    ) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: self.stream_base.clone(),
            reason,
        };

        let mut url = Url::parse(&self.stream_base).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }

        url.query_pairs_mut()
            .append_pair("subscribe", "none")
            .append_pair("updateRate", &update_period.as_secs().to_string())
            .append_pair("staticUpdateRate", &(static_period.as_secs() / 60).to_string());
        Ok(url)
    }
}

/// Pick the stream and HTTP endpoints, secure variants first.
pub fn select_endpoints(doc: &DiscoveryResponse) -> Result<ResolvedEndpoint, DiscoveryError> {
    let v1 = &doc.endpoints.v1;
    let stream_base = v1
        .stream_endpoint()
        .ok_or(DiscoveryError::MissingEndpoint("signalk-ws"))?
        .to_string();

    let http_url = v1.http_endpoint().map(|url| {
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        }
    });

    Ok(ResolvedEndpoint {
        stream_base,
        http_url,
    })
}

/// Resolves a configured base URL to connectable endpoints.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, base_url: &str) -> Result<ResolvedEndpoint, DiscoveryError>;
}

/// Resolver that fetches the discovery document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new() -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, base_url: &str) -> Result<ResolvedEndpoint, DiscoveryError> {
        let url = discovery_url(base_url);
        debug!(url = %url, "Fetching discovery document");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let doc = decode_discovery(&body).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;
        debug!(url = %url, endpoints = ?doc.endpoints.v1, "Discovery document received");
        select_endpoints(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalk_protocol::{DiscoveryEndpoints, DiscoveryV1};

    fn doc(v1: DiscoveryV1) -> DiscoveryResponse {
        DiscoveryResponse {
            endpoints: DiscoveryEndpoints { v1 },
        }
    }

    #[test]
    fn test_normalize_legacy_schemes() {
        assert_eq!(normalize_base_url("ws://cloud.signalk.org"), "http://cloud.signalk.org");
        assert_eq!(normalize_base_url("wss://cloud.signalk.org/"), "https://cloud.signalk.org");
        assert_eq!(normalize_base_url("http://host:3000"), "http://host:3000");
        assert_eq!(discovery_url("wss://cloud.signalk.org"), "https://cloud.signalk.org/signalk");
    }

    #[test]
    fn test_select_prefers_secure() {
        let resolved = select_endpoints(&doc(DiscoveryV1 {
            signalk_ws: Some("ws://h/signalk/v1/stream".to_string()),
            signalk_wss: Some("wss://h/signalk/v1/stream".to_string()),
            signalk_http: Some("http://h/signalk/v1/api".to_string()),
            signalk_https: Some("https://h/signalk/v1/api".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(resolved.stream_base, "wss://h/signalk/v1/stream");
        assert_eq!(resolved.http_url.as_deref(), Some("https://h/signalk/v1/api/"));
    }

    #[test]
    fn test_select_falls_back_to_plain() {
        let resolved = select_endpoints(&doc(DiscoveryV1 {
            signalk_ws: Some("ws://h/signalk/v1/stream".to_string()),
            signalk_http: Some("http://h/signalk/v1/api/".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(resolved.stream_base, "ws://h/signalk/v1/stream");
        assert_eq!(resolved.http_url.as_deref(), Some("http://h/signalk/v1/api/"));
    }

    #[test]
    fn test_select_requires_stream() {
        assert!(matches!(
            select_endpoints(&doc(DiscoveryV1::default())),
            Err(DiscoveryError::MissingEndpoint(_))
        ));
    }

    #[test]
    fn test_stream_url_query() {
        let resolved = ResolvedEndpoint {
            stream_base: "wss://h/signalk/v1/stream".to_string(),
            http_url: None,
        };
        let url = resolved
            .stream_url(Duration::from_secs(30), Duration::from_secs(300))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://h/signalk/v1/stream?subscribe=none&updateRate=30&staticUpdateRate=5"
        );
    }

    #[test]
    fn test_stream_url_rejects_garbage() {
        let bad = ResolvedEndpoint {
            stream_base: "not a url".to_string(),
            http_url: None,
        };
        assert!(matches!(
            bad.stream_url(Duration::from_secs(30), Duration::from_secs(300)),
            Err(TransportError::InvalidUrl { .. })
        ));

        let http = ResolvedEndpoint {
            stream_base: "http://h/stream".to_string(),
            http_url: None,
        };
        assert!(http.stream_url(Duration::from_secs(30), Duration::from_secs(300)).is_err());
    }
}
