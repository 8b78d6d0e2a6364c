//! VLESS protocol parser
//!
//! Format: vless://uuid@host:port?params#remark

use std::collections::BTreeMap;

use tracing::trace;
use url::Url;

use crate::validator::validate_uuid;

use super::decode::decode_uri_component;
use super::{ConnectionDescriptor, ParseError, Protocol, ProtocolParser, build_validated_descriptor};

const MAX_PARAM_LENGTH: usize = 4096;

// ============================================================================
// VLESS Parser
// ============================================================================

/// Parser for VLESS (vless://) URIs
pub struct VlessParser;

impl ProtocolParser for VlessParser {
    fn scheme(&self) -> &str {
        "vless"
    }

    fn parse(&self, uri: &str) -> Result<ConnectionDescriptor, ParseError> {
        trace!("Parsing VLESS URI");
        let url = Url::parse(uri)
            .map_err(|e| ParseError::invalid_uri(format!("not a parseable URI: {e}"), uri))?;

        let uuid = url.username().to_string();
        if uuid.is_empty() {
            return Err(ParseError::invalid_uri("missing `@` delimiter before host", uri));
        }
        if !validate_uuid(&uuid) {
            return Err(ParseError::invalid_field(
                format!("identity `{uuid}` is not a UUID"),
                uri,
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ParseError::invalid_uri("missing host", uri))?;
        // The url crate keeps IPv6 literals bracketed
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
            .to_string();

        let port = url
            .port()
            .ok_or_else(|| ParseError::invalid_uri("missing `:` delimiter before port", uri))?;

        // Query parameters map to transport/security fields
        let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(fragment) = url.fragment()
            && !fragment.is_empty()
        {
            params.insert(
                "remark".to_string(),
                decode_uri_component(fragment, MAX_PARAM_LENGTH),
            );
        }

        build_validated_descriptor(Protocol::Vless, host, &port.to_string(), uuid, params, uri)
    }
}
