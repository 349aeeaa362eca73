//! Shared-key message signing for the cluster join handshake.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies messages with the network-wide key.
pub trait Signer: Send + Sync + 'static {
    /// Signature of `message` under `key`.
    fn sign(&self, message: &str, key: &str) -> String;

    /// Whether `signature` is the signature of `message` under `key`.
    fn verify(&self, message: &str, key: &str, signature: &str) -> bool;
}

/// Hex-encoded HMAC-SHA256.
#[derive(Clone, Copy, Debug, Default)]
pub struct HmacSigner;

impl Signer for HmacSigner {
    fn sign(&self, message: &str, key: &str) -> String {
        // HMAC accepts keys of any length, so this only fails on a broken build.
        match HmacSha256::new_from_slice(key.as_bytes()) {
            Ok(mut mac) => {
                mac.update(message.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }

    fn verify(&self, message: &str, key: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
            return false;
        };
        mac.update(message.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// Random hex key of `len` bytes (the hex string is `2 * len` chars).
pub fn generate_key(len: usize) -> String {
    let mut key = vec![0u8; len];
    rand::rng().fill_bytes(&mut key);
    hex::encode(key)
}
