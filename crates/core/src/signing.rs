use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of the exact payload bytes.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    // HMAC-SHA256 accepts any key length
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(payload: &[u8], secret: &str, signature: &str) -> bool {
    let expected = sign_payload(payload, secret);
    subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), signature.as_bytes()).into()
}
