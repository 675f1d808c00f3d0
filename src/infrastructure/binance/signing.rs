use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 query-string signature Binance requires on every
/// authenticated USD-M futures endpoint.
pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
