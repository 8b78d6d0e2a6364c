//! Outbound (upstream proxy) configuration.
//!
//! One outbound is rendered per parsed share link. The field layout follows
//! the V2Ray config schema: VLESS/VMess targets live under `settings.vnext`,
//! Shadowsocks targets under `settings.servers`, and transport/security
//! material under `streamSettings`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::ConnectionDescriptor;

// ============================================================================
// Outbound
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Outbound {
    /// Human-readable tag (the share link's remark, when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    pub protocol: String,

    pub settings: OutboundSettings,

    #[serde(
        rename = "streamSettings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_settings: Option<StreamSettings>,
}

/// Protocol-specific target settings
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum OutboundSettings {
    /// VLESS/VMess server list
    Vnext { vnext: Vec<VnextServer> },
    /// Shadowsocks server list
    Servers { servers: Vec<ShadowsocksServer> },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VnextServer {
    pub address: String,
    pub port: u16,
    pub users: Vec<VnextUser>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct VnextUser {
    pub id: String,

    /// VLESS encryption mode (always "none" in practice)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,

    /// VLESS flow control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    /// VMess encryption method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,

    /// VMess alter ID
    #[serde(rename = "alterId", default, skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShadowsocksServer {
    pub address: String,
    pub port: u16,
    pub method: String,
    pub password: String,
}

// ============================================================================
// Stream Settings
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StreamSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,

    #[serde(rename = "tlsSettings", default, skip_serializing_if = "Option::is_none")]
    pub tls_settings: Option<TlsSettings>,

    #[serde(
        rename = "realitySettings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reality_settings: Option<RealitySettings>,

    #[serde(rename = "wsSettings", default, skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TlsSettings {
    #[serde(rename = "serverName", default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RealitySettings {
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    #[serde(rename = "shortId", default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,

    #[serde(rename = "serverName", default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

// ============================================================================
// Builders From a Descriptor
// ============================================================================

impl Outbound {
    /// VLESS outbound from a parsed descriptor
    pub fn vless(descriptor: &ConnectionDescriptor) -> Self {
        let user = VnextUser {
            id: descriptor.identity.clone(),
            encryption: Some(
                descriptor
                    .params
                    .get("encryption")
                    .cloned()
                    .unwrap_or_else(|| "none".to_string()),
            ),
            flow: descriptor.params.get("flow").cloned(),
            ..Default::default()
        };

        Self {
            tag: descriptor.params.get("remark").cloned(),
            protocol: "vless".to_string(),
            settings: OutboundSettings::Vnext {
                vnext: vec![VnextServer {
                    address: descriptor.address.clone(),
                    port: descriptor.port,
                    users: vec![user],
                }],
            },
            stream_settings: stream_settings(descriptor),
        }
    }

    /// VMess outbound from a parsed descriptor
    pub fn vmess(descriptor: &ConnectionDescriptor) -> Self {
        let user = VnextUser {
            id: descriptor.identity.clone(),
            security: Some(
                descriptor
                    .params
                    .get("security")
                    .cloned()
                    .unwrap_or_else(|| "auto".to_string()),
            ),
            alter_id: descriptor
                .params
                .get("aid")
                .and_then(|a| a.parse().ok())
                .or(Some(0)),
            ..Default::default()
        };

        Self {
            tag: descriptor.params.get("remark").cloned(),
            protocol: "vmess".to_string(),
            settings: OutboundSettings::Vnext {
                vnext: vec![VnextServer {
                    address: descriptor.address.clone(),
                    port: descriptor.port,
                    users: vec![user],
                }],
            },
            stream_settings: stream_settings(descriptor),
        }
    }

    /// Shadowsocks outbound from a parsed descriptor
    pub fn shadowsocks(descriptor: &ConnectionDescriptor) -> Self {
        Self {
            tag: descriptor.params.get("remark").cloned(),
            protocol: "shadowsocks".to_string(),
            settings: OutboundSettings::Servers {
                servers: vec![ShadowsocksServer {
                    address: descriptor.address.clone(),
                    port: descriptor.port,
                    method: descriptor.params.get("method").cloned().unwrap_or_default(),
                    password: descriptor.identity.clone(),
                }],
            },
            stream_settings: None,
        }
    }
}

/// Derives `streamSettings` from a descriptor's transport/security params.
///
/// VLESS carries the network under `type` and TLS under `security`; VMess
/// uses `net` and `tls`. Returns `None` when the link declares neither a
/// non-TCP transport nor a security layer.
fn stream_settings(descriptor: &ConnectionDescriptor) -> Option<StreamSettings> {
    let params = &descriptor.params;

    let network = params.get("type").or_else(|| params.get("net")).cloned();

    let security = params
        .get("security")
        .filter(|s| *s == "tls" || *s == "reality")
        .cloned()
        .or_else(|| params.get("tls").filter(|t| *t == "tls").cloned());

    let is_ws = matches!(network.as_deref(), Some("ws" | "websocket"));

    if network.is_none() && security.is_none() {
        return None;
    }

    let tls_settings = security.as_ref().map(|_| TlsSettings {
        server_name: params.get("sni").or_else(|| params.get("host")).cloned(),
        alpn: params
            .get("alpn")
            .map(|s| s.split(',').map(|a| a.trim().to_string()).collect())
            .unwrap_or_default(),
        fingerprint: params.get("fp").cloned(),
    });

    let reality_settings = security
        .as_deref()
        .filter(|s| *s == "reality")
        .map(|_| RealitySettings {
            public_key: params.get("pbk").cloned(),
            short_id: params.get("sid").cloned(),
            server_name: params.get("sni").cloned(),
        });

    let ws_settings = if is_ws {
        let mut headers = HashMap::new();
        if let Some(host) = params.get("host")
            && !host.is_empty()
        {
            headers.insert("Host".to_string(), host.clone());
        }
        Some(WsSettings {
            path: params.get("path").cloned(),
            headers,
        })
    } else {
        None
    };

    Some(StreamSettings {
        network,
        security,
        tls_settings,
        reality_settings,
        ws_settings,
    })
}
