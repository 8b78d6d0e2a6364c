//! Share-link parsing.
//!
//! This module provides functionality for:
//! - Decoding share-link payloads (strict Base64, percent-encoded queries)
//! - Parsing protocol URIs (vless://, vmess://, ss://) into a normalized
//!   [`ConnectionDescriptor`]
//! - Dynamic dispatch to the appropriate parser based on the URI scheme
//! - Lossy batch parsing where one bad candidate never aborts the batch

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{DEFAULT_HTTP_PORT, DEFAULT_SOCKS_PORT, V2RayConfig, build_config, effective_port};
use crate::validator::{validate_address, validate_port};

pub mod decode;
pub mod shadowsocks;
pub mod vless;
pub mod vmess;

pub use shadowsocks::ShadowsocksParser;
pub use vless::VlessParser;
pub use vmess::VmessParser;

// ============================================================================
// Connection Descriptor
// ============================================================================

/// Proxy protocol carried by a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vless,
    Vmess,
    Shadowsocks,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Vless => write!(f, "vless"),
            Protocol::Vmess => write!(f, "vmess"),
            Protocol::Shadowsocks => write!(f, "shadowsocks"),
        }
    }
}

/// Normalized proxy target extracted from a share link.
///
/// Constructed once per parse call and treated as immutable afterwards.
/// `address` and `port` have always passed validation by the time a
/// descriptor exists; a descriptor with an unreachable server is possible,
/// one with a malformed server is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub protocol: Protocol,
    pub address: String,
    pub port: u16,
    /// UUID for VLESS/VMess, password for Shadowsocks.
    pub identity: String,
    /// Protocol-specific transport/security parameters (TLS flag, network
    /// type, path, host header, cipher method, remark, ...). Keys are never
    /// shared across protocols.
    pub params: BTreeMap<String, String>,
    /// Original input, retained for diagnostics.
    pub raw_uri: String,
}

/// Validates extracted address/port material and assembles a descriptor.
///
/// Every protocol parser funnels through here so that a structurally
/// well-formed URI with a semantically invalid address or port is rejected
/// at parse time instead of surfacing later as a network error.
pub(crate) fn build_validated_descriptor(
    protocol: Protocol,
    address: String,
    port_str: &str,
    identity: String,
    params: BTreeMap<String, String>,
    raw_uri: &str,
) -> Result<ConnectionDescriptor, ParseError> {
    if !validate_address(&address) {
        return Err(ParseError::invalid_field(
            format!("address `{address}` fails validation"),
            raw_uri,
        ));
    }
    if !validate_port(port_str) {
        return Err(ParseError::invalid_field(
            format!("port `{port_str}` fails validation"),
            raw_uri,
        ));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| ParseError::invalid_field(format!("port `{port_str}` fails validation"), raw_uri))?;

    Ok(ConnectionDescriptor {
        protocol,
        address,
        port,
        identity,
        params,
        raw_uri: raw_uri.to_string(),
    })
}

// ============================================================================
// Parse Errors
// ============================================================================

const SNIPPET_LEN: usize = 48;

/// Clips the offending input for error messages without splitting a
/// multi-byte character.
fn snippet(input: &str) -> String {
    if input.len() <= SNIPPET_LEN {
        return input.to_string();
    }
    let mut cut = SNIPPET_LEN;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &input[..cut])
}

/// Why a share link failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A required structural delimiter is missing or misplaced.
    #[error("invalid URI: {reason} (in `{snippet}`)")]
    InvalidUri { reason: String, snippet: String },

    /// Base64, UTF-8, or embedded JSON is malformed.
    #[error("invalid encoding: {reason} (in `{snippet}`)")]
    InvalidEncoding { reason: String, snippet: String },

    /// A structurally present field fails validation or a required field is
    /// absent.
    #[error("invalid field: {reason} (in `{snippet}`)")]
    InvalidField { reason: String, snippet: String },

    /// The URI scheme is not one of vless/vmess/ss.
    #[error("unsupported protocol scheme `{scheme}`")]
    UnsupportedProtocol { scheme: String },
}

impl ParseError {
    pub(crate) fn invalid_uri(reason: impl Into<String>, input: &str) -> Self {
        ParseError::InvalidUri {
            reason: reason.into(),
            snippet: snippet(input),
        }
    }

    pub(crate) fn invalid_encoding(reason: impl Into<String>, input: &str) -> Self {
        ParseError::InvalidEncoding {
            reason: reason.into(),
            snippet: snippet(input),
        }
    }

    pub(crate) fn invalid_field(reason: impl Into<String>, input: &str) -> Self {
        ParseError::InvalidField {
            reason: reason.into(),
            snippet: snippet(input),
        }
    }
}

// ============================================================================
// Protocol Parser Trait
// ============================================================================

/// Trait for parsing individual protocol URIs
pub trait ProtocolParser: Send + Sync {
    /// Returns the protocol scheme this parser handles (e.g., "ss", "vmess")
    fn scheme(&self) -> &str;

    /// Parses a URI string into a connection descriptor
    fn parse(&self, uri: &str) -> Result<ConnectionDescriptor, ParseError>;

    /// Checks if this parser can handle the given URI
    fn can_parse(&self, uri: &str) -> bool {
        uri.starts_with(&format!("{}://", self.scheme()))
    }
}

// ============================================================================
// Protocol Registry
// ============================================================================

/// Registry for protocol parsers with dynamic dispatch
#[derive(Default)]
pub struct ProtocolRegistry {
    parsers: HashMap<String, Arc<dyn ProtocolParser>>,
}

impl ProtocolRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in parsers registered
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ShadowsocksParser));
        registry.register(Arc::new(VmessParser));
        registry.register(Arc::new(VlessParser));
        registry
    }

    /// Registers a protocol parser
    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers.insert(parser.scheme().to_string(), parser);
    }

    /// Gets a parser for the given scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProtocolParser>> {
        self.parsers.get(scheme)
    }

    /// Parses a URI using the appropriate parser
    pub fn parse_uri(&self, uri: &str) -> Result<ConnectionDescriptor, ParseError> {
        let scheme = extract_scheme(uri)?;
        debug!("Parsing URI with scheme '{}'", scheme);

        let parser = self
            .parsers
            .get(scheme)
            .ok_or_else(|| ParseError::UnsupportedProtocol {
                scheme: scheme.to_string(),
            })?;

        let result = parser.parse(uri);
        match &result {
            Ok(descriptor) => {
                debug!(
                    "Successfully parsed {} URI -> {}:{}",
                    scheme, descriptor.address, descriptor.port
                );
            }
            Err(e) => {
                debug!("Failed to parse {} URI: {}", scheme, e);
            }
        }
        result
    }

    /// Parses multiple URIs from content (one per line)
    pub fn parse_uri_list(&self, content: &str) -> Vec<Result<ConnectionDescriptor, ParseError>> {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        debug!("Parsing {} URI lines from content", lines.len());

        lines.into_iter().map(|line| self.parse_uri(line)).collect()
    }

    /// Parses multiple URIs, collecting only successful results.
    ///
    /// Individual decode or validation failures are logged and the candidate
    /// is skipped; a single malformed entry never aborts the batch.
    pub fn parse_uri_list_lossy(&self, content: &str) -> Vec<ConnectionDescriptor> {
        let results = self.parse_uri_list(content);
        let total = results.len();

        let descriptors: Vec<ConnectionDescriptor> = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!("Skipping unparseable URI: {}", e);
                    None
                }
            })
            .collect();

        let success = descriptors.len();
        debug!(
            "URI list parsing complete: {} total, {} successful, {} skipped",
            total,
            success,
            total - success
        );

        descriptors
    }
}

/// Extracts the scheme from a URI
fn extract_scheme(uri: &str) -> Result<&str, ParseError> {
    let Some((scheme, _)) = uri.split_once("://") else {
        return Err(ParseError::invalid_uri("missing scheme separator `://`", uri));
    };
    if scheme.is_empty() {
        return Err(ParseError::invalid_uri("missing scheme", uri));
    }
    Ok(scheme)
}

// ============================================================================
// Combined Entry Point
// ============================================================================

/// Parses a single share link with the built-in parsers.
pub fn parse_uri(uri: &str) -> Result<ConnectionDescriptor, ParseError> {
    ProtocolRegistry::with_builtin_parsers().parse_uri(uri)
}

/// Parses a share link and renders the launcher config artifact in one step.
///
/// Non-positive port arguments fall back to the defaults (2300 HTTP /
/// 2301 SOCKS).
pub fn parse_config_string(
    uri: &str,
    http_port: i32,
    socks_port: i32,
) -> Result<(ConnectionDescriptor, V2RayConfig), ParseError> {
    let descriptor = parse_uri(uri)?;
    let http = effective_port(http_port, DEFAULT_HTTP_PORT);
    let socks = effective_port(socks_port, DEFAULT_SOCKS_PORT);
    let config = build_config(&descriptor, http, socks);
    Ok((descriptor, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_with_builtin_parsers() {
        let registry = ProtocolRegistry::with_builtin_parsers();

        assert!(registry.get("ss").is_some());
        assert!(registry.get("vmess").is_some());
        assert!(registry.get("vless").is_some());
        assert!(registry.get("trojan").is_none());
    }

    #[test]
    fn test_extract_scheme() {
        assert_eq!(extract_scheme("ss://example").unwrap(), "ss");
        assert_eq!(extract_scheme("vmess://example").unwrap(), "vmess");
        assert!(extract_scheme("invalid").is_err());
        assert!(extract_scheme("://no-scheme").is_err());
    }

    #[test]
    fn test_unsupported_protocol() {
        let registry = ProtocolRegistry::with_builtin_parsers();
        let err = registry.parse_uri("trojan://pw@host:443").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedProtocol { .. }));
    }

    #[test]
    fn test_parse_uri_list_skips_comments_and_blanks() {
        let registry = ProtocolRegistry::with_builtin_parsers();
        let content = "# comment\n\nss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@host.example:8388\n";
        let results = registry.parse_uri_list(content);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_parse_uri_list_lossy_continues_past_bad_candidates() {
        let registry = ProtocolRegistry::with_builtin_parsers();
        // Middle line is a VMess payload that is not valid Base64 JSON
        let content = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@host-a.example:8388\n\
                       vmess://!!!not-base64!!!\n\
                       ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@host-b.example:8389";
        let descriptors = registry.parse_uri_list_lossy(content);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].address, "host-a.example");
        assert_eq!(descriptors[1].address, "host-b.example");
    }

    #[test]
    fn test_parse_twice_yields_equal_descriptors() {
        let uri = "vless://a1b2c3d4-e5f6-7890-abcd-ef1234567890@example.com:443?security=tls&type=ws";
        let first = parse_uri(uri).unwrap();
        let second = parse_uri(uri).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_config_string_substitutes_default_ports() {
        let uri = "vless://a1b2c3d4-e5f6-7890-abcd-ef1234567890@example.com:443";
        let (descriptor, config) = parse_config_string(uri, 0, -1).unwrap();
        assert_eq!(descriptor.port, 443);
        let ports: Vec<u16> = config.inbounds.iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![2300, 2301]);
    }

    #[test]
    fn test_snippet_clips_long_input() {
        let long = "x".repeat(200);
        let s = snippet(&long);
        assert!(s.len() < 60);
        assert!(s.ends_with("..."));
    }
}
