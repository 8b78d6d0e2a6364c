//! Inbound (local listener) configuration.

use serde::{Deserialize, Serialize};

use crate::config::util::is_false;

/// A local proxy listener the launcher binds for us.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Inbound {
    pub listen: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub settings: InboundSettings,
}

/// Listener settings; only the fields the launcher cares about.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct InboundSettings {
    /// SOCKS authentication mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    /// Enable UDP relay on SOCKS inbounds
    #[serde(default, skip_serializing_if = "is_false")]
    pub udp: bool,

    /// Idle timeout in seconds for HTTP inbounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl Inbound {
    /// HTTP CONNECT listener on the given address and port
    pub fn http(listen: &str, port: u16) -> Self {
        Self {
            listen: listen.to_string(),
            port,
            protocol: "http".to_string(),
            settings: InboundSettings {
                timeout: Some(300),
                ..Default::default()
            },
        }
    }

    /// SOCKS5 listener on the given address and port
    pub fn socks(listen: &str, port: u16) -> Self {
        Self {
            listen: listen.to_string(),
            port,
            protocol: "socks".to_string(),
            settings: InboundSettings {
                auth: Some("noauth".to_string()),
                udp: true,
                ..Default::default()
            },
        }
    }
}
