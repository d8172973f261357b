// =============================================================================
// Request signing — bearer token for authenticated endpoints
// =============================================================================
//
// Authenticated requests carry `Authorization: Bearer <jwt>` where the JWT is
// HS256-signed with the secret key. The payload holds the access key and a
// UUID nonce; when the request has query parameters it also carries the
// SHA-512 hash of the query string and the literal "SHA512" algorithm tag.
//
// SECURITY: the secret key is never logged or serialized.
// =============================================================================

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct TokenHeader {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct TokenPayload<'a> {
    access_key: &'a str,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<&'static str>,
}

/// Hex-encoded SHA-512 of a query string.
pub fn query_hash(query: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the bearer token for an authenticated request.
///
/// `query` is the exact query string that will be sent (without the leading
/// `?`); pass `None` for requests with no parameters.
pub fn bearer_token(access_key: &str, secret_key: &str, query: Option<&str>) -> String {
    let payload = TokenPayload {
        access_key,
        nonce: Uuid::new_v4().to_string(),
        query_hash: query.map(query_hash),
        query_hash_alg: query.map(|_| "SHA512"),
    };

    sign_hs256(secret_key, &payload)
}

fn sign_hs256(secret_key: &str, payload: &TokenPayload<'_>) -> String {
    let header = TokenHeader {
        alg: "HS256",
        typ: "JWT",
    };

    let header_json = serde_json::to_vec(&header).expect("header serializes");
    let payload_json = serde_json::to_vec(payload).expect("payload serializes");

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    );

    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts any key size");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{signature}")
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_hash_is_sha512_hex() {
        let h = query_hash("market=KRW-BTC&count=10");
        assert_eq!(h.len(), 128);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic.
        assert_eq!(h, query_hash("market=KRW-BTC&count=10"));
    }

    #[test]
    fn token_has_three_segments() {
        let token = bearer_token("ak", "sk", Some("a=1"));
        assert_eq!(token.matches('.').count(), 2);
    }

    #[test]
    fn token_payload_carries_query_hash_only_with_params() {
        let with_params = bearer_token("ak", "sk", Some("a=1"));
        let payload_b64 = with_params.split('.').nth(1).unwrap();
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["access_key"], "ak");
        assert_eq!(json["query_hash_alg"], "SHA512");
        assert_eq!(json["query_hash"], query_hash("a=1"));

        let without = bearer_token("ak", "sk", None);
        let payload_b64 = without.split('.').nth(1).unwrap();
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(json.get("query_hash").is_none());
        assert!(json.get("query_hash_alg").is_none());
    }

    #[test]
    fn nonce_differs_between_tokens() {
        let a = bearer_token("ak", "sk", None);
        let b = bearer_token("ak", "sk", None);
        assert_ne!(a, b);
    }
}
