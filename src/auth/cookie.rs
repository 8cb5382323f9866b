//! Session cookie sealing
//!
//! The cookie value is the opaque session identifier wrapped in an
//! HMAC signature. The identifier is strictly a lookup key; no account
//! data ever crosses into the cookie.

use crate::error::AppError;

/// Seal a session identifier into a signed cookie value
///
/// Value format: base64(sid).base64(hmac_sha256(sid))
///
/// # Arguments
/// * `session_id` - Opaque session identifier to seal
/// * `secret` - HMAC secret key
pub fn seal_session_id(session_id: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(session_id.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("invalid cookie secret: {e}")))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify a sealed cookie value and recover the session identifier
///
/// # Errors
/// Returns `Unauthorized` if the value is malformed or the signature
/// does not verify.
pub fn open_session_id(sealed: &str, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let parts: Vec<&str> = sealed.split('.').collect();
    if parts.len() != 2 {
        return Err(AppError::Unauthorized);
    }

    let payload_b64 = parts[0];
    let signature_b64 = parts[1];

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("invalid cookie secret: {e}")))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::Unauthorized)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    String::from_utf8(payload_bytes).map_err(|_| AppError::Unauthorized)
}
