//! HMAC signatures on webhook bodies sent by the hosted service.

use ring::hmac;

pub const SIGNATURE_HEADER: &str = "x-uploadthing-signature";
const SIGNATURE_PREFIX: &str = "hmac-sha256=";

/// Header value for `body` signed with `api_key`.
pub fn sign(api_key: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, api_key.as_bytes());
    let tag = hmac::sign(&key, body);
    format!("{SIGNATURE_PREFIX}{}", encode_hex(tag.as_ref()))
}

/// Constant-time check of a signature header against `body`.
pub fn verify(api_key: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(signature) = header
        .and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX))
        .and_then(decode_hex)
    else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, api_key.as_bytes());
    hmac::verify(&key, body, &signature).is_ok()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
