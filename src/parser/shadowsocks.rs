//! Shadowsocks protocol parser
//!
//! Supports SIP002-style share links:
//! - ss://BASE64(method:password)@host:port#remark
//! - ss://method:password@host:port#remark (userinfo percent-encoded)

use std::collections::BTreeMap;

use tracing::trace;

use super::decode::{decode_base64, decode_uri_component};
use super::{ConnectionDescriptor, ParseError, Protocol, ProtocolParser, build_validated_descriptor};

const MAX_USERINFO_LENGTH: usize = 4096;

// ============================================================================
// Shadowsocks Parser
// ============================================================================

/// Parser for Shadowsocks (ss://) URIs
pub struct ShadowsocksParser;

impl ProtocolParser for ShadowsocksParser {
    fn scheme(&self) -> &str {
        "ss"
    }

    fn parse(&self, uri: &str) -> Result<ConnectionDescriptor, ParseError> {
        let trimmed = uri.trim();
        trace!("Parsing Shadowsocks URI");

        let without_scheme = trimmed
            .strip_prefix("ss://")
            .ok_or_else(|| ParseError::invalid_uri("missing ss:// prefix", uri))?;

        // Extract fragment (remark) if present
        let (main_part, remark) = match without_scheme.rfind('#') {
            Some(pos) => (
                &without_scheme[..pos],
                Some(decode_uri_component(
                    &without_scheme[pos + 1..],
                    MAX_USERINFO_LENGTH,
                )),
            ),
            None => (without_scheme, None),
        };

        let at_pos = main_part
            .rfind('@')
            .ok_or_else(|| ParseError::invalid_uri("missing `@` delimiter", uri))?;
        let userinfo = &main_part[..at_pos];
        let hostport = &main_part[at_pos + 1..];

        let (host, port_digits) = split_host_port(hostport, uri)?;

        let (method, password) = parse_userinfo(userinfo, uri)?;

        let mut params = BTreeMap::new();
        params.insert("method".to_string(), method);
        if let Some(remark) = remark
            && !remark.is_empty()
        {
            params.insert("remark".to_string(), remark);
        }

        build_validated_descriptor(
            Protocol::Shadowsocks,
            host,
            &port_digits,
            password,
            params,
            uri,
        )
    }
}

/// Splits `host:port`, handling bracketed IPv6 addresses.
///
/// The port is the maximal leading digit run after the colon; trailing
/// query/fragment material simply ends the run. An empty run is a hard
/// failure.
fn split_host_port(hostport: &str, uri: &str) -> Result<(String, String), ParseError> {
    let (host, rest) = if let Some(inner) = hostport.strip_prefix('[') {
        let bracket_end = inner
            .find(']')
            .ok_or_else(|| ParseError::invalid_uri("unterminated `[` in IPv6 address", uri))?;
        let host = inner[..bracket_end].to_string();
        let rest = inner[bracket_end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| ParseError::invalid_uri("missing `:` delimiter after IPv6 address", uri))?;
        (host, rest)
    } else {
        let colon_pos = hostport
            .rfind(':')
            .ok_or_else(|| ParseError::invalid_uri("missing `:` delimiter before port", uri))?;
        (hostport[..colon_pos].to_string(), &hostport[colon_pos + 1..])
    };

    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(ParseError::invalid_uri("empty port digit run", uri));
    }

    Ok((host, digits))
}

/// Decodes userinfo, which is Base64(method:password) or plain
/// percent-encoded method:password.
fn parse_userinfo(userinfo: &str, uri: &str) -> Result<(String, String), ParseError> {
    if let Ok(decoded) = decode_base64(userinfo)
        && let Some((method, password)) = decoded.split_once(':')
    {
        return Ok((method.to_string(), password.to_string()));
    }

    let decoded = decode_uri_component(userinfo, MAX_USERINFO_LENGTH);
    let Some((method, password)) = decoded.split_once(':') else {
        return Err(ParseError::invalid_uri(
            "userinfo missing `:` separator",
            uri,
        ));
    };
    Ok((method.to_string(), password.to_string()))
}
