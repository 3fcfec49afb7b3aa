//! Per-install secret and per-origin keys.
//!
//! The secret is 32 bytes from the platform CSPRNG, stored hex-encoded and
//! never regenerated once written. Page-world code receives only
//! `HMAC-SHA256(secret, origin)`, which keys its request-level randomness.
//! Persona and fingerprint noise stay seeded from the origin alone.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, ServiceError};
use crate::store::{keys, load, save, KvStore};

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_LEN: usize = 32;

/// Fresh hex secret.
pub fn generate_secret() -> Result<String> {
    let mut bytes = [0u8; SECRET_LEN];
    getrandom::getrandom(&mut bytes).map_err(ServiceError::Entropy)?;
    Ok(hex::encode(bytes))
}

/// Read the install secret, creating and persisting it on first use.
pub async fn get_or_create_secret(store: &dyn KvStore) -> Result<String> {
    if let Some(secret) = load::<String>(store, keys::SECRET).await? {
        if !secret.is_empty() {
            return Ok(secret);
        }
    }
    let secret = generate_secret()?;
    save(store, keys::SECRET, &secret).await?;
    log::info!("generated install secret");
    Ok(secret)
}

/// Hex `HMAC-SHA256` of `origin` under the hex secret's text.
pub fn per_origin_key(secret: &str, origin: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(origin.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
