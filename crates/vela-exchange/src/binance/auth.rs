//! Binance authentication and request signing.
//!
//! Signed endpoints take a URL-encoded query string with a `timestamp`
//! parameter and an appended HMAC-SHA256 `signature` computed over the
//! query with the account's secret key.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
///
/// # Arguments
///
/// * `secret` — the API secret key (UTF-8 string).
/// * `message` — the data to sign (typically the query string).
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

/// Build a URL-encoded, HMAC-SHA256–signed query string.
///
/// Takes a slice of `(key, value)` parameter pairs, joins them with `&`,
/// computes the HMAC-SHA256 signature over the resulting string, and appends
/// `&signature=<hex>`.
///
/// # Arguments
///
/// * `params` — request parameters (must already include `timestamp`).
/// * `secret` — the API secret key.
pub fn build_signed_query(params: &[(&str, &str)], secret: &str) -> String {
    let query: String = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let signature = hmac_sha256_sign(secret, &query);
    format!("{query}&signature={signature}")
}
