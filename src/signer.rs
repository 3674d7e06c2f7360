//! Deterministic request signing for the catalog API.
//!
//! Every outbound API call is authenticated with a per-request signature
//! computed from a long-lived credential, the request itself, a timestamp,
//! and a single-use nonce. There is no shared session: the signature is a
//! pure function of its inputs, so any process holding the credential can
//! sign independently.
//!
//! The scheme is the classic OAuth-style HMAC-SHA1 flow: percent-encode,
//! sort, join, HMAC, base64. Percent-encoding is the strict RFC 3986 form
//! that also escapes `!`, `'`, `(`, `)` and `*`, because the signature must
//! be byte-stable across implementations.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngExt;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Scheme token prefixing the authentication header value.
const AUTH_SCHEME: &str = "OAuth";

/// Signature method advertised in the authentication parameters.
const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// Protocol version advertised in the authentication parameters.
const PROTOCOL_VERSION: &str = "1.0";

/// Nonce length in characters. The protocol requires at least 22.
const NONCE_LEN: usize = 32;

/// Alphabet for nonce generation.
const NONCE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Long-lived API credential.
///
/// All four fields are opaque strings supplied externally. The credential is
/// immutable for the process lifetime and is never generated or persisted
/// here. A partially-populated credential is useless: signing is a binary
/// capability, so construction only succeeds with all four fields present.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Consumer key identifying the registered client.
    pub consumer_key: String,
    /// Consumer secret, half of the signing key.
    pub consumer_secret: String,
    /// Access token identifying the authorized account.
    pub access_token: String,
    /// Access secret, the other half of the signing key.
    pub access_secret: String,
}

impl Credential {
    /// Creates a credential from its four fields.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_secret: access_secret.into(),
        }
    }

    /// Loads the credential from the environment.
    ///
    /// Reads `HARVEST_CONSUMER_KEY`, `HARVEST_CONSUMER_SECRET`,
    /// `HARVEST_ACCESS_TOKEN` and `HARVEST_ACCESS_SECRET`. Returns `None`
    /// unless all four are present and non-empty: callers must treat a
    /// missing credential as "cannot sign" and fall back to unsigned
    /// requests rather than attempt partial signing.
    pub fn from_env() -> Option<Self> {
        let consumer_key = non_empty_env("HARVEST_CONSUMER_KEY")?;
        let consumer_secret = non_empty_env("HARVEST_CONSUMER_SECRET")?;
        let access_token = non_empty_env("HARVEST_ACCESS_TOKEN")?;
        let access_secret = non_empty_env("HARVEST_ACCESS_SECRET")?;

        Some(Self {
            consumer_key,
            consumer_secret,
            access_token,
            access_secret,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Computes per-request authentication headers from a credential.
///
/// Holds no state beyond the credential; a single signer can be shared
/// across tasks freely.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credential: Credential,
}

impl RequestSigner {
    /// Creates a signer from an explicit credential.
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Signs a request, producing the authentication header value.
    ///
    /// A fresh timestamp and nonce are generated for every call and are
    /// never reused. `params` are the request's own query parameters;
    /// their names must not collide with the reserved `oauth_*` keys.
    pub fn sign(&self, method: &str, base_url: &str, params: &[(String, String)]) -> String {
        let timestamp = Utc::now().timestamp().max(0) as u64;
        let nonce = generate_nonce();
        self.sign_at(method, base_url, params, timestamp, &nonce)
    }

    /// Signs a request with an explicit timestamp and nonce.
    ///
    /// Identical inputs always produce identical output, which is what
    /// makes the protocol verifiable on the remote side.
    pub fn sign_at(
        &self,
        method: &str,
        base_url: &str,
        params: &[(String, String)],
        timestamp: u64,
        nonce: &str,
    ) -> String {
        let timestamp = timestamp.to_string();
        let auth_params: [(&str, &str); 6] = [
            ("oauth_consumer_key", &self.credential.consumer_key),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", &timestamp),
            ("oauth_token", &self.credential.access_token),
            ("oauth_version", PROTOCOL_VERSION),
        ];

        // Merge request and auth parameters, percent-encode both sides,
        // then sort lexicographically by encoded key.
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (percent_encode(k).into_owned(), percent_encode(v).into_owned()))
            .chain(
                auth_params
                    .iter()
                    .map(|(k, v)| (percent_encode(k).into_owned(), percent_encode(v).into_owned())),
            )
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            percent_encode(base_url),
            percent_encode(&param_string)
        );

        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.credential.consumer_secret),
            percent_encode(&self.credential.access_secret)
        );

        let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(base_string.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        // Header carries the six auth parameters plus the signature,
        // each value double-quoted and percent-encoded.
        let mut header_params: Vec<(String, String)> = auth_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        header_params.push(("oauth_signature".to_string(), signature));
        header_params.sort();

        let joined = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect::<Vec<_>>()
            .join(",");

        format!("{} {}", AUTH_SCHEME, joined)
    }
}

/// Strict percent-encoding for signature construction.
///
/// Encodes everything outside `A-Z a-z 0-9 - . _ ~`, which covers the
/// characters (`!`, `'`, `(`, `)`, `*`) that looser URI encoders leave
/// alone.
fn percent_encode(input: &str) -> Cow<'_, str> {
    urlencoding::encode(input)
}

/// Generates a fresh random alphanumeric nonce.
fn generate_nonce() -> String {
    let mut rng = rand::rng();
    (0..NONCE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..NONCE_CHARS.len());
            NONCE_CHARS[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credential() -> Credential {
        Credential::new("ck-1234", "cs-secret", "at-5678", "as-secret")
    }

    fn test_params() -> Vec<(String, String)> {
        vec![
            ("region".to_string(), "north".to_string()),
            ("page".to_string(), "1".to_string()),
        ]
    }

    #[test]
    fn test_signature_deterministic_with_fixed_inputs() {
        let signer = RequestSigner::new(test_credential());
        let params = test_params();

        let a = signer.sign_at("get", "https://api.example.com/search", &params, 1700000000, "abcdefghijklmnopqrstuv");
        let b = signer.sign_at("get", "https://api.example.com/search", &params, 1700000000, "abcdefghijklmnopqrstuv");

        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_changes_with_any_input() {
        let signer = RequestSigner::new(test_credential());
        let params = test_params();
        let base = signer.sign_at("GET", "https://api.example.com/search", &params, 1700000000, "nonce0000000000000000000");

        let other_method =
            signer.sign_at("POST", "https://api.example.com/search", &params, 1700000000, "nonce0000000000000000000");
        assert_ne!(base, other_method);

        let other_url =
            signer.sign_at("GET", "https://api.example.com/detail", &params, 1700000000, "nonce0000000000000000000");
        assert_ne!(base, other_url);

        let mut changed = test_params();
        changed[0].1 = "south".to_string();
        let other_params =
            signer.sign_at("GET", "https://api.example.com/search", &changed, 1700000000, "nonce0000000000000000000");
        assert_ne!(base, other_params);

        let other_ts =
            signer.sign_at("GET", "https://api.example.com/search", &params, 1700000001, "nonce0000000000000000000");
        assert_ne!(base, other_ts);

        let other_nonce =
            signer.sign_at("GET", "https://api.example.com/search", &params, 1700000000, "nonce1111111111111111111");
        assert_ne!(base, other_nonce);
    }

    #[test]
    fn test_method_is_uppercased() {
        let signer = RequestSigner::new(test_credential());
        let params = test_params();

        let lower = signer.sign_at("get", "https://api.example.com/s", &params, 1, "n0000000000000000000000");
        let upper = signer.sign_at("GET", "https://api.example.com/s", &params, 1, "n0000000000000000000000");

        assert_eq!(lower, upper);
    }

    #[test]
    fn test_percent_encoding_reserved_characters() {
        assert_eq!(percent_encode("!'()* "), "%21%27%28%29%2A%20");
        assert_eq!(percent_encode("safe-chars_0.9~"), "safe-chars_0.9~");
        assert_eq!(percent_encode("a=b&c"), "a%3Db%26c");
    }

    #[test]
    fn test_header_shape() {
        let signer = RequestSigner::new(test_credential());
        let header = signer.sign_at("GET", "https://api.example.com/search", &test_params(), 1700000000, "abcdefghijklmnopqrstuv");

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"ck-1234\""));
        assert!(header.contains("oauth_token=\"at-5678\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
        assert!(header.contains("oauth_nonce=\"abcdefghijklmnopqrstuv\""));
        assert!(header.contains("oauth_version=\"1.0\""));
        assert!(header.contains("oauth_signature=\""));
        // Seven comma-separated key="value" entries.
        assert_eq!(header.matches("=\"").count(), 7);
        assert_eq!(header.matches(',').count(), 6);
    }

    #[test]
    fn test_nonce_length_and_alphabet() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.len() >= 22);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonces_are_not_reused() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
    }

    #[test]
    fn test_credential_from_parts() {
        let cred = test_credential();
        assert_eq!(cred.consumer_key, "ck-1234");
        assert_eq!(cred.access_token, "at-5678");
    }
}
