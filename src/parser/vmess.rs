//! VMess protocol parser
//!
//! VMess share links are Base64 encoded JSON:
//! vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": 443, ... })

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::trace;

use crate::validator::validate_uuid;

use super::decode::decode_base64;
use super::{ConnectionDescriptor, ParseError, Protocol, ProtocolParser, build_validated_descriptor};

// ============================================================================
// VMess Parser
// ============================================================================

/// Parser for VMess (vmess://) URIs
pub struct VmessParser;

/// VMess share-link JSON structure
#[derive(Deserialize, Debug)]
struct VmessJson {
    /// Remark/name
    #[serde(default)]
    ps: Option<String>,
    /// Server address
    #[serde(default)]
    add: Option<String>,
    /// Server port (can be string or number)
    #[serde(default, deserialize_with = "deserialize_port")]
    port: Option<i64>,
    /// UUID
    #[serde(default)]
    id: Option<String>,
    /// Alter ID (can be string or number)
    #[serde(default, deserialize_with = "deserialize_option_u32")]
    aid: Option<u32>,
    /// Security/encryption method
    #[serde(default)]
    scy: Option<String>,
    /// Network type (tcp, ws, etc.)
    #[serde(default)]
    net: Option<String>,
    /// TLS setting
    #[serde(default)]
    tls: Option<String>,
    /// SNI
    #[serde(default)]
    sni: Option<String>,
    /// WebSocket host
    #[serde(default)]
    host: Option<String>,
    /// WebSocket path
    #[serde(default)]
    path: Option<String>,
    /// Header type (for various transports)
    #[serde(default, rename = "type")]
    header_type: Option<String>,
}

impl ProtocolParser for VmessParser {
    fn scheme(&self) -> &str {
        "vmess"
    }

    fn parse(&self, uri: &str) -> Result<ConnectionDescriptor, ParseError> {
        trace!("Parsing VMess URI");

        let encoded = uri
            .strip_prefix("vmess://")
            .ok_or_else(|| ParseError::invalid_uri("missing vmess:// prefix", uri))?;

        let decoded = decode_base64(encoded)?;

        let json: VmessJson = serde_json::from_str(&decoded).map_err(|e| {
            ParseError::invalid_encoding(format!("malformed VMess JSON: {e}"), uri)
        })?;

        let address = match json.add {
            Some(ref add) if !add.is_empty() => add.clone(),
            _ => {
                return Err(ParseError::invalid_field(
                    "missing `add` field in VMess JSON",
                    uri,
                ));
            }
        };
        let port = match json.port {
            Some(p) if p > 0 => p,
            Some(_) => {
                return Err(ParseError::invalid_field(
                    "non-positive `port` field in VMess JSON",
                    uri,
                ));
            }
            None => {
                return Err(ParseError::invalid_field(
                    "missing `port` field in VMess JSON",
                    uri,
                ));
            }
        };

        let identity = json.id.unwrap_or_default();
        if !identity.is_empty() && !validate_uuid(&identity) {
            return Err(ParseError::invalid_field(
                format!("identity `{identity}` is not a UUID"),
                uri,
            ));
        }

        let mut params = BTreeMap::new();
        let mut insert = |key: &str, value: Option<String>| {
            if let Some(v) = value
                && !v.is_empty()
            {
                params.insert(key.to_string(), v);
            }
        };
        insert("remark", json.ps);
        insert("aid", json.aid.map(|a| a.to_string()));
        insert("security", json.scy);
        insert("net", json.net);
        insert("tls", json.tls);
        insert("sni", json.sni);
        insert("host", json.host);
        insert("path", json.path);
        insert("type", json.header_type);

        build_validated_descriptor(
            Protocol::Vmess,
            address,
            &port.to_string(),
            identity,
            params,
            uri,
        )
    }
}

/// Custom deserializer for port (handles both string and number)
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(i64),
        String(String),
        Null,
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        Some(PortValue::Number(n)) => Ok(Some(n)),
        Some(PortValue::String(s)) if s.is_empty() => Ok(None),
        Some(PortValue::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(PortValue::Null) | None => Ok(None),
    }
}

/// Custom deserializer for optional u32 (handles both string and number)
fn deserialize_option_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U32Value {
        Number(u32),
        String(String),
        Null,
    }

    match Option::<U32Value>::deserialize(deserializer)? {
        Some(U32Value::Number(n)) => Ok(Some(n)),
        Some(U32Value::String(s)) if s.is_empty() => Ok(None),
        Some(U32Value::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(U32Value::Null) | None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    fn vmess_uri(json: &str) -> String {
        format!("vmess://{}", STANDARD.encode(json))
    }

    #[test]
    fn test_vmess_minimal() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":8080}"#);
        let descriptor = VmessParser.parse(&uri).unwrap();

        assert_eq!(descriptor.protocol, Protocol::Vmess);
        assert_eq!(descriptor.address, "1.2.3.4");
        assert_eq!(descriptor.port, 8080);
        assert!(descriptor.identity.is_empty());
    }

    #[test]
    fn test_vmess_full() {
        let uri = vmess_uri(
            r#"{"v":"2","ps":"Test Server","add":"server.example.com","port":443,
                "id":"a1b2c3d4-e5f6-7890-abcd-ef1234567890","aid":0,"scy":"auto",
                "net":"ws","tls":"tls","sni":"sni.example.com","path":"/ws","host":"ws.example.com"}"#,
        );
        let descriptor = VmessParser.parse(&uri).unwrap();

        assert_eq!(descriptor.address, "server.example.com");
        assert_eq!(descriptor.port, 443);
        assert_eq!(descriptor.identity, "a1b2c3d4-e5f6-7890-abcd-ef1234567890");
        assert_eq!(descriptor.params.get("remark"), Some(&"Test Server".to_string()));
        assert_eq!(descriptor.params.get("net"), Some(&"ws".to_string()));
        assert_eq!(descriptor.params.get("tls"), Some(&"tls".to_string()));
        assert_eq!(descriptor.params.get("path"), Some(&"/ws".to_string()));
        assert_eq!(descriptor.params.get("host"), Some(&"ws.example.com".to_string()));
    }

    #[test]
    fn test_vmess_string_port() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":"8080"}"#);
        let descriptor = VmessParser.parse(&uri).unwrap();
        assert_eq!(descriptor.port, 8080);
    }

    #[test]
    fn test_vmess_missing_port_is_invalid_field() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4"}"#);
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }

    #[test]
    fn test_vmess_zero_port_is_invalid_field() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":0}"#);
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }

    #[test]
    fn test_vmess_out_of_range_port_is_invalid_field() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":70000}"#);
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }

    #[test]
    fn test_vmess_missing_address_is_invalid_field() {
        let uri = vmess_uri(r#"{"port":443}"#);
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }

    #[test]
    fn test_vmess_bad_base64_is_invalid_encoding() {
        let err = VmessParser.parse("vmess://@@@").unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_vmess_malformed_json_is_invalid_encoding() {
        let uri = format!("vmess://{}", STANDARD.encode("{not json"));
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_vmess_multibyte_remark_survives() {
        let uri = vmess_uri(r#"{"ps":"日本 01","add":"1.2.3.4","port":443}"#);
        let descriptor = VmessParser.parse(&uri).unwrap();
        assert_eq!(descriptor.params.get("remark"), Some(&"日本 01".to_string()));
    }

    #[test]
    fn test_vmess_aid_as_string() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":443,"aid":"64"}"#);
        let descriptor = VmessParser.parse(&uri).unwrap();
        assert_eq!(descriptor.params.get("aid"), Some(&"64".to_string()));
    }

    #[test]
    fn test_vmess_bad_uuid_is_invalid_field() {
        let uri = vmess_uri(r#"{"add":"1.2.3.4","port":443,"id":"short"}"#);
        let err = VmessParser.parse(&uri).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { .. }));
    }
}
