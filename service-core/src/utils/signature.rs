//! Webhook payload signatures in GitHub's `X-Hub-Signature-256` format.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix GitHub puts in front of the hex digest.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Generate an HMAC-SHA256 signature of `body`.
///
/// Format: `sha256=` followed by the lowercase hex digest.
pub fn generate_signature(secret: &str, body: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(body);
    let result = mac.finalize();

    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(result.into_bytes())))
}

/// Verify a signature header against `body` using constant-time comparison.
///
/// A header without the `sha256=` prefix or with a digest of the wrong
/// length is reported as invalid, not as an error.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<bool, anyhow::Error> {
    let Some(provided) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return Ok(false);
    };

    let expected_signature = generate_signature(secret, body)?;
    let expected = &expected_signature.as_bytes()[SIGNATURE_PREFIX.len()..];
    let provided = provided.to_ascii_lowercase();

    if expected.len() != provided.len() {
        return Ok(false);
    }

    Ok(expected.ct_eq(provided.as_bytes()).into())
}
