//! Webhook signature verification (HMAC-SHA256)

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::errors::ReceiverError;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm prefix carried by the `X-Hub-Signature-256` header
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies request bodies against a pre-shared secret
pub struct SignatureVerifier {
    keyed: HmacSha256,
}

impl SignatureVerifier {
    /// Key the MAC once. HMAC accepts keys of any length, including empty.
    pub fn new(secret: &SecretString) -> Result<Self, ReceiverError> {
        let keyed = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| ReceiverError::ConfigError(format!("unusable webhook secret: {}", e)))?;
        Ok(Self { keyed })
    }

    /// Compute the header value a sender would attach to `body`
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.keyed.clone();
        mac.update(body);
        format!(
            "{}{}",
            SIGNATURE_PREFIX,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Check `signature_header` against the HMAC of `body`.
    ///
    /// A missing prefix or undecodable hex is a rejection. The digest comparison
    /// is constant time.
    pub fn authenticate(&self, body: &[u8], signature_header: Option<&str>) -> bool {
        let Some(header) = signature_header else {
            warn!("Rejected webhook: missing signature header");
            return false;
        };

        let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
            warn!("Rejected webhook: signature header lacks '{}' prefix", SIGNATURE_PREFIX);
            return false;
        };

        let expected = match hex::decode(hex_digest) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Rejected webhook: malformed signature digest: {}", e);
                return false;
            }
        };

        let mut mac = self.keyed.clone();
        mac.update(body);

        match mac.verify_slice(&expected) {
            Ok(()) => {
                debug!("Webhook signature verified");
                true
            }
            Err(_) => {
                warn!("Rejected webhook: signature mismatch");
                false
            }
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
