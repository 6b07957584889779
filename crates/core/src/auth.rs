//! HMAC-MD5 authentication (C6): the `syncml:auth-MAC` scheme.
//!
//! `base64(HMAC_MD5(base64(md5(user:pass)), nonce || ':' || base64(md5(body))))`

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use std::collections::HashMap;

use crate::syncml::Cred;

type HmacMd5 = Hmac<Md5>;

/// Compute the SyncML HMAC-MD5 MAC for `body`, keyed by `username:password`
/// and mixed with `nonce`. Returns the Base64-encoded digest.
pub fn compute_hmac(username: &str, password: &str, nonce: &[u8], body: &[u8]) -> String {
    let cred_hash = Md5::digest(format!("{username}:{password}").as_bytes());
    let cred_b64 = BASE64.encode(cred_hash);

    let body_hash = Md5::digest(body);
    let body_b64 = BASE64.encode(body_hash);

    let mut message = Vec::with_capacity(nonce.len() + 1 + body_b64.len());
    message.extend_from_slice(nonce);
    message.push(b':');
    message.extend_from_slice(body_b64.as_bytes());

    // A Base64 digest is always a valid HMAC key length; this cannot fail.
    let mut mac = HmacMd5::new_from_slice(cred_b64.as_bytes()).expect("key of any length is valid");
    mac.update(&message);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Generate a fresh 16-byte server nonce.
pub fn generate_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Decode a Base64 nonce, falling back to the raw bytes of the string if it
/// isn't valid Base64 (clients occasionally send a raw nonce value).
pub fn decode_nonce(value: &str) -> Vec<u8> {
    BASE64.decode(value).unwrap_or_else(|_| value.as_bytes().to_vec())
}

pub fn encode_nonce(nonce: &[u8]) -> String {
    BASE64.encode(nonce)
}

/// Parsed `x-syncml-hmac` transport header: `algorithm=MD5, username=..., mac=...`.
#[derive(Debug, Default, Clone)]
pub struct HmacHeader {
    pub algorithm: Option<String>,
    pub username: Option<String>,
    pub mac: Option<String>,
}

pub fn parse_hmac_header(header: &str) -> HmacHeader {
    let mut fields = HashMap::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    HmacHeader {
        algorithm: fields.remove("algorithm"),
        username: fields.remove("username"),
        mac: fields.remove("mac"),
    }
}

/// The MAC a client presented, and the username it claims, from whichever
/// of the two transports carried it.
pub struct ClientMac {
    pub username: String,
    pub mac: String,
}

/// Extract the client's MAC, preferring the `x-syncml-hmac` transport
/// header and falling back to `SyncHdr/Cred` when a transport strips
/// custom headers.
pub fn extract_client_mac(
    hmac_header: Option<&str>,
    cred: Option<&Cred>,
    default_username: &str,
) -> Option<ClientMac> {
    if let Some(header) = hmac_header {
        let parsed = parse_hmac_header(header);
        if let Some(mac) = parsed.mac {
            return Some(ClientMac {
                username: parsed.username.unwrap_or_else(|| default_username.to_string()),
                mac,
            });
        }
    }

    let cred = cred?;
    let cred_type = cred.cred_type.as_deref().unwrap_or("");
    if cred_type.contains("auth-MAC") {
        let mac = cred.data.clone()?;
        return Some(ClientMac {
            username: default_username.to_string(),
            mac,
        });
    }

    None
}

/// Outcome of verifying a client's MAC against the server's expected value.
#[derive(Debug, PartialEq, Eq)]
pub enum Verification {
    /// No MAC was presented at all (no header, no MAC credential).
    NotPresented,
    Matched,
    Mismatched,
}

/// Verify a client's presented MAC (if any) over the exact raw request
/// bytes, using the server's nonce for this turn.
pub fn verify_client(
    hmac_header: Option<&str>,
    cred: Option<&Cred>,
    default_username: &str,
    password: &str,
    server_nonce: &[u8],
    body: &[u8],
) -> Verification {
    let Some(client_mac) = extract_client_mac(hmac_header, cred, default_username) else {
        return Verification::NotPresented;
    };

    let expected = compute_hmac(&client_mac.username, password, server_nonce, body);
    if expected == client_mac.mac {
        Verification::Matched
    } else {
        Verification::Mismatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_round_trips_with_matching_inputs() {
        let nonce = [0u8; 16];
        let body = b"<SyncML/>";
        let mac = compute_hmac("guest", "guest", &nonce, body);
        let recomputed = compute_hmac("guest", "guest", &nonce, body);
        assert_eq!(mac, recomputed);
    }

    #[test]
    fn mac_changes_when_body_is_perturbed() {
        let nonce = [0u8; 16];
        let mac_a = compute_hmac("guest", "guest", &nonce, b"<SyncML/>");
        let mac_b = compute_hmac("guest", "guest", &nonce, b"<SyncML>x</SyncML>");
        assert_ne!(mac_a, mac_b);
    }

    #[test]
    fn empty_nonce_is_well_defined() {
        let a = compute_hmac("guest", "guest", b"", b"body");
        let b = compute_hmac("guest", "guest", b"", b"body");
        assert_eq!(a, b);
    }

    #[test]
    fn parses_hmac_header_fields() {
        let parsed = parse_hmac_header("algorithm=MD5, username=guest, mac=abc123==");
        assert_eq!(parsed.algorithm.as_deref(), Some("MD5"));
        assert_eq!(parsed.username.as_deref(), Some("guest"));
        assert_eq!(parsed.mac.as_deref(), Some("abc123=="));
    }

    #[test]
    fn verify_client_reports_not_presented_without_credentials() {
        let result = verify_client(None, None, "guest", "guest", b"", b"body");
        assert_eq!(result, Verification::NotPresented);
    }

    #[test]
    fn verify_client_detects_mismatch() {
        let result = verify_client(
            Some("algorithm=MD5, username=guest, mac=not-a-real-mac"),
            None,
            "guest",
            "guest",
            b"",
            b"body",
        );
        assert_eq!(result, Verification::Mismatched);
    }
}
