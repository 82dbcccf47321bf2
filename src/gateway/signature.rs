use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &[u8]) -> Result<HmacSha256, GatewayError> {
    // An unset secret would let anyone sign payloads with the empty key.
    if secret.is_empty() {
        return Err(GatewayError::SignatureInvalid);
    }
    HmacSha256::new_from_slice(secret).map_err(|_| GatewayError::SignatureInvalid)
}

/// Hex-encoded HMAC-SHA256 of the concatenated `parts`.
pub fn sign_hex(secret: &[u8], parts: &[&[u8]]) -> Result<String, GatewayError> {
    let mut mac = mac(secret)?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over the concatenated `parts`.
pub fn verify_hex(secret: &[u8], parts: &[&[u8]], signature_hex: &str) -> Result<(), GatewayError> {
    let expected = hex::decode(signature_hex.trim()).map_err(|_| GatewayError::SignatureInvalid)?;
    let mut mac = mac(secret)?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(&expected)
        .map_err(|_| GatewayError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_only_the_signed_body() {
        let sig = sign_hex(b"secret", &[b"{\"a\":1}".as_slice()]).unwrap();
        assert!(verify_hex(b"secret", &[b"{\"a\":1}".as_slice()], &sig).is_ok());
        assert!(verify_hex(b"secret", &[b"{\"a\":2}".as_slice()], &sig).is_err());
        assert!(verify_hex(b"other", &[b"{\"a\":1}".as_slice()], &sig).is_err());
        assert!(verify_hex(b"secret", &[b"{\"a\":1}".as_slice()], "zz-not-hex").is_err());
    }

    #[test]
    fn empty_secret_never_verifies() {
        assert!(sign_hex(b"", &[b"body".as_slice()]).is_err());
        assert!(verify_hex(b"", &[b"body".as_slice()], "00").is_err());
    }
}
