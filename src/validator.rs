//! Syntax validation for addresses, ports, and UUIDs.
//!
//! Every validator here is a pure, total function: no side effects, no
//! network lookups, no panics. They answer only "is this string shaped like
//! a valid X" and leave reachability to the probe engine.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Longest raw address input accepted before any further checking.
pub const MAX_ADDRESS_LENGTH: usize = 2048;

/// Longest hostname DNS will carry.
const MAX_HOSTNAME_LENGTH: usize = 253;

// ============================================================================
// Address
// ============================================================================

/// Validates an IP address or hostname.
///
/// A string containing `:` must be a literal IPv6 address. Otherwise it is
/// accepted as a literal IPv4 address, or as a hostname of at most 253 bytes
/// built from ASCII alphanumerics plus `.`, `-`, and `_`.
pub fn validate_address(address: &str) -> bool {
    if address.is_empty() || address.len() > MAX_ADDRESS_LENGTH {
        return false;
    }

    if address.contains(':') {
        return address.parse::<Ipv6Addr>().is_ok();
    }

    if address.parse::<Ipv4Addr>().is_ok() {
        return true;
    }

    if address.len() > MAX_HOSTNAME_LENGTH {
        return false;
    }

    address
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}

// ============================================================================
// Port
// ============================================================================

/// Validates a port number string: all ASCII digits, value in 1..=65535.
pub fn validate_port(port_str: &str) -> bool {
    if port_str.is_empty() || port_str.len() > 5 {
        return false;
    }

    if !port_str.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    matches!(port_str.parse::<u32>(), Ok(1..=65535))
}

// ============================================================================
// UUID
// ============================================================================

/// Validates a UUID string: exactly 36 characters, `-` at byte positions
/// 8/13/18/23, hex digits everywhere else.
pub fn validate_uuid(uuid: &str) -> bool {
    let bytes = uuid.as_bytes();
    if bytes.len() != 36 {
        return false;
    }

    bytes.iter().enumerate().all(|(i, &b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}
