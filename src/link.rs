// src/link.rs - Shareable connection links for inbounds

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::types::InboundConfig;

/// Hosts under this suffix are cloud-IDE port forwards that are only
/// reachable on the public HTTPS port.
pub const FORWARDED_HOST_SUFFIX: &str = ".app.github.dev";

/// Replaced with the inbound's port when present in the configured host.
pub const PORT_PLACEHOLDER: &str = "{port}";

pub const LINK_SCHEME: &str = "vless";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParams {
    pub encryption: String,
    pub security: String,
    pub transport: String,
    pub label_prefix: String,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            encryption: "none".to_string(),
            security: "tls".to_string(),
            transport: "ws".to_string(),
            label_prefix: "X-CORE-".to_string(),
        }
    }
}

/// How links are addressed. Fixed at startup, never re-derived per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPolicy {
    host: String,
    connect_port: Option<u16>,
    params: LinkParams,
}

impl LinkPolicy {
    /// Links point at `host` on each inbound's own port.
    pub fn direct(host: impl Into<String>, params: LinkParams) -> Self {
        Self {
            host: host.into(),
            connect_port: None,
            params,
        }
    }

    /// Links point at `host` on `port` regardless of the inbound's listener port.
    pub fn forwarded(host: impl Into<String>, port: u16, params: LinkParams) -> Self {
        Self {
            host: host.into(),
            connect_port: Some(port),
            params,
        }
    }

    /// Pick [`forwarded`](Self::forwarded) for cloud-IDE hosts and
    /// [`direct`](Self::direct) for everything else.
    pub fn detect(host: impl Into<String>, public_port: u16, params: LinkParams) -> Self {
        let host = host.into();
        if is_forwarded_host(&host) {
            Self::forwarded(host, public_port, params)
        } else {
            Self::direct(host, params)
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn connect_port(&self) -> Option<u16> {
        self.connect_port
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    fn host_for(&self, port: u16) -> String {
        self.host.replace(PORT_PLACEHOLDER, &port.to_string())
    }
}

pub fn is_forwarded_host(host: &str) -> bool {
    host.trim_end_matches('.')
        .to_ascii_lowercase()
        .ends_with(FORWARDED_HOST_SUFFIX)
}

/// Compose the connection URI a client app imports for `inbound`.
pub fn build_connection_uri(inbound: &InboundConfig, policy: &LinkPolicy) -> String {
    let host = policy.host_for(inbound.port);
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = policy.connect_port.unwrap_or(inbound.port);
    let params = &policy.params;

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("encryption", &params.encryption)
        .append_pair("security", &params.security)
        .append_pair("type", &params.transport)
        .append_pair("host", host)
        .append_pair("sni", host)
        .append_pair("path", &inbound.path)
        .finish();

    // IPv6 literals need brackets in the authority, never in the query.
    let authority = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };

    format!(
        "{}://{}@{}:{}?{}#{}{}",
        LINK_SCHEME, inbound.uuid, authority, port, query, params.label_prefix, inbound.port
    )
}
