//! Probe outcome types.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Error Classification
// ============================================================================

/// Stage-scoped classification of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// No error; the probe succeeded
    #[default]
    None,
    /// Name resolution failed or timed out
    DnsFailure,
    /// TCP connect refused, unreachable, or timed out
    TcpTimeout,
    /// TLS negotiation failed
    TlsError,
    /// The proxied transport failed below the application layer
    TransportError,
    /// The proxy rejected our credentials
    AuthError,
    /// The upstream answered, but with an unusable response
    UpstreamBlocked,
    /// The application-level request timed out
    Timeout,
    Unknown,
}

impl ProbeErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeErrorKind::None => "none",
            ProbeErrorKind::DnsFailure => "dns_failure",
            ProbeErrorKind::TcpTimeout => "tcp_timeout",
            ProbeErrorKind::TlsError => "tls_error",
            ProbeErrorKind::TransportError => "transport_error",
            ProbeErrorKind::AuthError => "auth_error",
            ProbeErrorKind::UpstreamBlocked => "upstream_blocked",
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Probe Result
// ============================================================================

/// Outcome of one probe invocation.
///
/// Constructed fresh per probe call, fully populated by the stage pipeline,
/// and never mutated after it is returned. Exactly one of these holds:
/// success with a positive score, or failure with a non-`none` error kind.
/// Stage durations the pipeline did not reach stay at zero; every measured
/// duration is at least 1 ms so an "instant" reading cannot be mistaken for
/// an unmeasured one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub dns_ms: u64,
    pub tcp_connect_ms: u64,
    pub tls_handshake_ms: u64,
    pub transport_handshake_ms: u64,
    pub proxy_setup_ms: u64,
    pub app_connect_ms: u64,
    pub ttfb_ms: u64,
    /// Sum of the stages actually executed
    pub total_ms: u64,
    /// Caller-requested retry budget (1-5); the engine itself measures once
    pub attempts: u32,
    /// Normalized quality score in [0, 1]
    pub score: f64,
    pub error_kind: ProbeErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self {
            success: false,
            dns_ms: 0,
            tcp_connect_ms: 0,
            tls_handshake_ms: 0,
            transport_handshake_ms: 0,
            proxy_setup_ms: 0,
            app_connect_ms: 0,
            ttfb_ms: 0,
            total_ms: 0,
            attempts: 1,
            score: 0.0,
            error_kind: ProbeErrorKind::None,
            error_detail: None,
        }
    }
}

// ============================================================================
// TTFB Measurement
// ============================================================================

/// Result of a standalone TTFB health check through a running proxy
/// listener.
///
/// Serializes to a fixed five-key JSON object; absent measurements are
/// `null`, never omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtfbMeasurement {
    pub platform: String,
    pub success: bool,
    pub ttfb_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ProbeErrorKind::None.label(), "none");
        assert_eq!(ProbeErrorKind::DnsFailure.label(), "dns_failure");
        assert_eq!(ProbeErrorKind::TcpTimeout.label(), "tcp_timeout");
        assert_eq!(ProbeErrorKind::UpstreamBlocked.label(), "upstream_blocked");
    }

    #[test]
    fn test_error_kind_serializes_as_label() {
        for kind in [
            ProbeErrorKind::None,
            ProbeErrorKind::DnsFailure,
            ProbeErrorKind::TcpTimeout,
            ProbeErrorKind::TlsError,
            ProbeErrorKind::TransportError,
            ProbeErrorKind::AuthError,
            ProbeErrorKind::UpstreamBlocked,
            ProbeErrorKind::Timeout,
            ProbeErrorKind::Unknown,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.label()));
        }
    }

    #[test]
    fn test_probe_result_default() {
        let result = ProbeResult::default();
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error_kind, ProbeErrorKind::None);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_ttfb_measurement_fixed_keys() {
        let measurement = TtfbMeasurement {
            platform: "linux".to_string(),
            success: false,
            ttfb_ms: None,
            http_status: None,
            error_message: Some("proxy refused".to_string()),
        };
        let json = serde_json::to_value(&measurement).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 5);
        for key in ["platform", "success", "ttfb_ms", "http_status", "error_message"] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert!(object["ttfb_ms"].is_null());
        assert!(object["http_status"].is_null());
    }
}
