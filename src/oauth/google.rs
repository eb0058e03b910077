//! Google ID token verification against Google's published JWKS

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rsa::{pkcs1v15::VerifyingKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

use super::{ProviderProfile, ProviderTokenError, ProviderTokenVerifier};
use crate::settings::GoogleSettings;

/// Issuer values Google places in ID tokens
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const FETCH_RETRY_BACKOFF: Duration = Duration::from_secs(300);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    kid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    iss: Option<String>,
    aud: Option<serde_json::Value>, // string or array
    exp: Option<i64>,
    nbf: Option<i64>,
    sub: Option<String>,
    email: Option<String>,
    email_verified: Option<serde_json::Value>, // bool, or "true" in older tokens
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Google's signing keys, keyed by `kid`, with fetch-failure back-off
pub struct JwksCache {
    keys: HashMap<String, JsonWebKey>,
    last_updated: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    cache_duration: Duration,
    retry_backoff: Duration,
}

impl JwksCache {
    #[must_use]
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            keys: HashMap::new(),
            last_updated: None,
            last_failure: None,
            cache_duration,
            retry_backoff: FETCH_RETRY_BACKOFF,
        }
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.last_updated.is_some_and(|at| {
            Utc::now()
                .signed_duration_since(at)
                .to_std()
                .unwrap_or(Duration::MAX)
                < self.cache_duration
        })
    }

    #[must_use]
    pub fn should_retry_fetch(&self) -> bool {
        self.last_failure.is_none_or(|at| {
            Utc::now()
                .signed_duration_since(at)
                .to_std()
                .unwrap_or(Duration::MAX)
                >= self.retry_backoff
        })
    }

    #[must_use]
    pub fn get_key(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.get(kid)
    }

    /// Replace the cached key set; keys without a `kid` are unusable and dropped
    pub fn store_keys(&mut self, keys: Vec<JsonWebKey>) {
        self.keys = keys
            .into_iter()
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect();
        debug!("💾 Cached {} Google signing keys", self.keys.len());
        self.last_updated = Some(Utc::now());
        self.last_failure = None;
    }

    pub fn record_fetch_failure(&mut self) {
        self.last_failure = Some(Utc::now());
    }
}

#[derive(Clone)]
pub struct GoogleTokenVerifier {
    client_id: String,
    jwks_uri: String,
    clock_skew: i64,
    cache: Arc<RwLock<JwksCache>>,
    client: reqwest::Client,
}

impl GoogleTokenVerifier {
    /// Build a verifier for `client_id`
    ///
    /// # Errors
    ///
    /// Returns `KeyFetch` if the HTTP client cannot be built
    pub fn new(
        client_id: impl Into<String>,
        settings: &GoogleSettings,
    ) -> Result<Self, ProviderTokenError> {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| ProviderTokenError::KeyFetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id: client_id.into(),
            jwks_uri: settings.jwks_uri.clone(),
            clock_skew: i64::try_from(settings.clock_skew_seconds).unwrap_or(300),
            cache: Arc::new(RwLock::new(JwksCache::new(Duration::from_secs(
                settings.cache_duration_seconds,
            )))),
            client,
        })
    }

    /// Verifier for the configured client id, or `None` when Google sign-in is not configured
    ///
    /// # Errors
    ///
    /// Returns `KeyFetch` if the HTTP client cannot be built
    pub fn from_settings(settings: &GoogleSettings) -> Result<Option<Self>, ProviderTokenError> {
        settings
            .client_id()
            .map(|client_id| Self::new(client_id, settings))
            .transpose()
    }

    /// Seed the key cache without a network fetch
    pub async fn preload_keys(&self, keys: Vec<JsonWebKey>) {
        self.cache.write().await.store_keys(keys);
    }

    async fn fetch_and_cache_jwks(&self) -> Result<(), ProviderTokenError> {
        if !self.cache.read().await.should_retry_fetch() {
            return Err(ProviderTokenError::KeyFetch(
                "skipping fetch due to recent failure".to_string(),
            ));
        }

        debug!("🔑 Fetching Google JWKS from {}", self.jwks_uri);
        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.cache.write().await.store_keys(jwks.keys);
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Google JWKS fetch failed: {e}");
                self.cache.write().await.record_fetch_failure();
                Err(e)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<JsonWebKeySet, ProviderTokenError> {
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| ProviderTokenError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderTokenError::KeyFetch(format!(
                "JWKS request failed with status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderTokenError::KeyFetch(format!("failed to parse JWKS: {e}")))
    }

    async fn signing_key(&self, kid: &str) -> Result<JsonWebKey, ProviderTokenError> {
        let stale = {
            let cache = self.cache.read().await;
            match cache.get_key(kid) {
                Some(key) if cache.is_fresh() => return Ok(key.clone()),
                other => other.cloned(),
            }
        };

        // stale cache or a rotated key: refetch once, keep using a known key if that fails
        if let Err(err) = self.fetch_and_cache_jwks().await {
            return match stale {
                Some(key) => {
                    debug!("Using stale Google signing key {kid}: {err}");
                    Ok(key)
                }
                None => Err(err),
            };
        }
        self.cache
            .read()
            .await
            .get_key(kid)
            .cloned()
            .ok_or_else(|| ProviderTokenError::KeyNotFound(kid.to_string()))
    }

    fn validate_claims(&self, claims: &GoogleClaims, now: i64) -> Result<(), ProviderTokenError> {
        let exp = claims
            .exp
            .ok_or_else(|| ProviderTokenError::Malformed("missing exp".to_string()))?;
        if now > exp + self.clock_skew {
            return Err(ProviderTokenError::Expired);
        }
        if let Some(nbf) = claims.nbf {
            if now < nbf - self.clock_skew {
                return Err(ProviderTokenError::NotYetValid);
            }
        }

        let iss = claims.iss.as_deref().unwrap_or_default();
        if !GOOGLE_ISSUERS.contains(&iss) {
            return Err(ProviderTokenError::ClaimRejected {
                claim: "iss",
                actual: iss.to_string(),
            });
        }

        let audience_ok = match &claims.aud {
            Some(serde_json::Value::String(aud)) => *aud == self.client_id,
            Some(serde_json::Value::Array(auds)) => auds
                .iter()
                .any(|aud| aud.as_str() == Some(self.client_id.as_str())),
            _ => false,
        };
        if !audience_ok {
            return Err(ProviderTokenError::ClaimRejected {
                claim: "aud",
                actual: claims
                    .aud
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ProviderTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<ProviderProfile, ProviderTokenError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
            return Err(ProviderTokenError::Malformed("invalid JWT format".to_string()));
        };

        let header: JwtHeader = decode_segment(header_b64, "header")?;
        if header.alg != "RS256" {
            return Err(ProviderTokenError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .ok_or_else(|| ProviderTokenError::Malformed("missing kid".to_string()))?;

        let key = self.signing_key(&kid).await?;
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| ProviderTokenError::Malformed(format!("invalid signature encoding: {e}")))?;
        verify_rs256(&format!("{header_b64}.{claims_b64}"), &signature, &key)?;

        let claims: GoogleClaims = decode_segment(claims_b64, "claims")?;
        self.validate_claims(&claims, Utc::now().timestamp())?;

        let subject = claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| ProviderTokenError::Malformed("missing sub".to_string()))?;
        let email_verified = match claims.email_verified {
            Some(serde_json::Value::Bool(flag)) => flag,
            Some(serde_json::Value::String(flag)) => flag == "true",
            _ => false,
        };

        info!("✅ Google ID token verified");
        Ok(ProviderProfile {
            subject,
            email: claims.email,
            name: claims.name,
            picture: claims.picture,
            email_verified,
        })
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, ProviderTokenError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ProviderTokenError::Malformed(format!("invalid {what} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderTokenError::Malformed(format!("invalid {what} JSON: {e}")))
}

fn verify_rs256(
    signing_input: &str,
    signature: &[u8],
    key: &JsonWebKey,
) -> Result<(), ProviderTokenError> {
    use rsa::signature::Verifier;

    let decode = |component: Option<&String>, name: &str| {
        let value = component
            .ok_or_else(|| ProviderTokenError::KeyDecoding(format!("missing RSA {name}")))?;
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| ProviderTokenError::KeyDecoding(format!("invalid RSA {name}: {e}")))
    };
    let n = decode(key.n.as_ref(), "modulus")?;
    let e = decode(key.e.as_ref(), "exponent")?;

    let public_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|e| ProviderTokenError::KeyDecoding(format!("invalid RSA key: {e}")))?;

    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| ProviderTokenError::Malformed(format!("invalid signature: {e}")))?;

    VerifyingKey::<Sha256>::new(public_key)
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| ProviderTokenError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::{BigUint, RsaPrivateKey};
    use serde_json::json;

    // 2048-bit key used only to sign test tokens
    const TEST_KEY_N: &str = concat!(
        "b2138c2677385b46d72a91938011af32dbc9cbfc16a29b2b7776db45d16c1996",
        "35ee7ee9a2f1cf6d0c2b8446a54ecc51f76d8d52e2b6b1ca0738cea550382376",
        "52548d170e4b26cf00704be43ea071c21b61abe54ef068d750fd9585d9b1535f",
        "3578c3c2c4f4e35001ca3a81765410126119a3a820f5e88e530f0ba32599f691",
        "94d523498f646c89849ef86416262b72d5f5364c40efb9b2f26a441f91dc4026",
        "3276318339bdfdccda6468116c10c8cb0411d7151c98e7a2191ac1cc1c2ea525",
        "bf5f805c52f868403b9e35120aa47ff4c552bff42c88ebab90791aebb36bc42d",
        "88272d1553101c9156b8366820c5c12b0d79ef2c6184ee33607edf8d86126567",
    );
    const TEST_KEY_D: &str = concat!(
        "4949612efd76bc9df1746bf81bc76b668f6cc3de0a04bebe8b4a67a09ab915e8",
        "ab666d65c2f1289034e77de74326245181765d28a4f452441667cb27ded553c6",
        "e0c83a4ea84bc67b7faf3794862faad19b4a3d9fc03691b737763d809a206ff2",
        "e9833b719f74374ed885bd41458d0016484ef07b03a1a0a55e4a7d5c15e000c8",
        "a5a0ccd6bc0e37a9451ab51b82845487a4cf80bb9a864f017b061d1f82bcaba8",
        "5147a223e75945a97b421bbf579eb0adcbc80e630898790dd1fc4a287ffc86d3",
        "d4075e31e3f1c062815c2710e514b419f88a234bb6f56607509eef9a41de2af3",
        "31be880f94f8698e2d303587c0513249b66bb80aa687a383642a9f12b354f7c9",
    );
    const TEST_KEY_P: &str = concat!(
        "ec8d7c8a25ea7a40654c595734de282b33e4485f66c4dd35ba1ab0aeb8789600",
        "1b03997e4b14a1d0a3d49497a093ad890c143497e85c356c8c3f6eb26a3c99ff",
        "43129567fa6aaf97ccd3357efabce87f63c883af81aae20acf30091e240924b8",
        "856e24cba463a556a25c13b20bc352145c077a76a14fd7dfe7a4b56ff19a6849",
    );
    const TEST_KEY_Q: &str = concat!(
        "c0b75ca479e471999927e5e5c61a99ac423bdab2fc1e8e25f6ddb5b2ff2c5a9a",
        "fae2285d9b51dca037af8ab8192d23438f1525f81fb7669c8110004658b38edb",
        "13b2909ca712189d5484dc91c1726d4463a90972885fc823aa4559fbe712bc12",
        "0ce7af58bd838279d48716595523aadcbb382051498f9561063449ed916f402f",
    );
    const CLIENT_ID: &str = "client-123.apps.googleusercontent.com";
    const KID: &str = "test-kid";

    fn hex(value: &str) -> BigUint {
        BigUint::parse_bytes(value.as_bytes(), 16).unwrap()
    }

    fn exponent() -> BigUint {
        BigUint::from_bytes_be(&[0x01, 0x00, 0x01])
    }

    fn private_key() -> RsaPrivateKey {
        RsaPrivateKey::from_components(
            hex(TEST_KEY_N),
            exponent(),
            hex(TEST_KEY_D),
            vec![hex(TEST_KEY_P), hex(TEST_KEY_Q)],
        )
        .unwrap()
    }

    fn public_jwk() -> JsonWebKey {
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        JsonWebKey {
            kty: "RSA".to_string(),
            kid: Some(KID.to_string()),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: Some(b64.encode(hex(TEST_KEY_N).to_bytes_be())),
            e: Some(b64.encode(exponent().to_bytes_be())),
        }
    }

    fn sign(header: &serde_json::Value, claims: &serde_json::Value) -> String {
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let input = format!(
            "{}.{}",
            b64.encode(header.to_string()),
            b64.encode(claims.to_string())
        );
        let signature = SigningKey::<Sha256>::new(private_key()).sign(input.as_bytes());
        format!("{input}.{}", b64.encode(signature.to_vec()))
    }

    fn claims() -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": "1234567890",
            "email": "a@b.com",
            "email_verified": true,
            "name": "Alice",
            "picture": "https://example.com/a.png",
            "iat": now,
            "exp": now + 3600,
        })
    }

    fn header() -> serde_json::Value {
        json!({ "alg": "RS256", "kid": KID, "typ": "JWT" })
    }

    async fn verifier() -> GoogleTokenVerifier {
        let settings = GoogleSettings {
            client_id: Some(CLIENT_ID.to_string()),
            // nothing listens here; any fetch fails fast
            jwks_uri: "http://127.0.0.1:9/certs".to_string(),
            ..GoogleSettings::default()
        };
        let verifier = GoogleTokenVerifier::new(CLIENT_ID, &settings).unwrap();
        verifier.preload_keys(vec![public_jwk()]).await;
        verifier
    }

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = verifier().await;
        let profile = verifier.verify(&sign(&header(), &claims())).await.unwrap();

        assert_eq!(profile.subject, "1234567890");
        assert_eq!(profile.email.as_deref(), Some("a@b.com"));
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert!(profile.email_verified);
    }

    #[tokio::test]
    async fn test_bare_issuer_and_string_email_verified() {
        let verifier = verifier().await;
        let mut claims = claims();
        claims["iss"] = json!("accounts.google.com");
        claims["email_verified"] = json!("true");

        let profile = verifier.verify(&sign(&header(), &claims)).await.unwrap();
        assert!(profile.email_verified);
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let verifier = verifier().await;
        let mut claims = claims();
        claims["aud"] = json!("someone-else");

        let result = verifier.verify(&sign(&header(), &claims)).await;
        assert!(matches!(
            result,
            Err(ProviderTokenError::ClaimRejected { claim: "aud", .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let verifier = verifier().await;
        let mut claims = claims();
        claims["iss"] = json!("https://evil.example.com");

        let result = verifier.verify(&sign(&header(), &claims)).await;
        assert!(matches!(
            result,
            Err(ProviderTokenError::ClaimRejected { claim: "iss", .. })
        ));
    }

    #[tokio::test]
    async fn test_expiry_respects_clock_skew() {
        let verifier = verifier().await;
        let now = Utc::now().timestamp();

        let mut within_skew = claims();
        within_skew["exp"] = json!(now - 60);
        assert!(verifier.verify(&sign(&header(), &within_skew)).await.is_ok());

        let mut expired = claims();
        expired["exp"] = json!(now - 3600);
        assert!(matches!(
            verifier.verify(&sign(&header(), &expired)).await,
            Err(ProviderTokenError::Expired)
        ));

        let mut future = claims();
        future["nbf"] = json!(now + 3600);
        assert!(matches!(
            verifier.verify(&sign(&header(), &future)).await,
            Err(ProviderTokenError::NotYetValid)
        ));
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let verifier = verifier().await;
        let token = sign(&header(), &claims());
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = claims();
        forged["sub"] = json!("attacker");
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            b64.encode(forged.to_string()),
            parts[2]
        );

        assert!(matches!(
            verifier.verify(&tampered).await,
            Err(ProviderTokenError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_malformed_and_unsupported_tokens() {
        let verifier = verifier().await;
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(ProviderTokenError::Malformed(_))
        ));

        let hs256 = json!({ "alg": "HS256", "kid": KID });
        assert!(matches!(
            verifier.verify(&sign(&hs256, &claims())).await,
            Err(ProviderTokenError::UnsupportedAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_refetch_failure_backs_off() {
        let verifier = verifier().await;
        let header = json!({ "alg": "RS256", "kid": "rotated" });
        let token = sign(&header, &claims());

        assert!(matches!(
            verifier.verify(&token).await,
            Err(ProviderTokenError::KeyFetch(_))
        ));
        assert!(!verifier.cache.read().await.should_retry_fetch());
        // cached keys still serve known kids during back-off
        assert!(verifier.verify(&sign(&self::header(), &claims())).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_key_serves_while_refetch_fails() {
        let settings = GoogleSettings {
            client_id: Some(CLIENT_ID.to_string()),
            jwks_uri: "http://127.0.0.1:9/certs".to_string(),
            cache_duration_seconds: 0,
            ..GoogleSettings::default()
        };
        let verifier = GoogleTokenVerifier::new(CLIENT_ID, &settings).unwrap();
        verifier.preload_keys(vec![public_jwk()]).await;
        assert!(!verifier.cache.read().await.is_fresh());

        let token = sign(&header(), &claims());
        assert!(verifier.verify(&token).await.is_ok());
        assert!(!verifier.cache.read().await.should_retry_fetch());
        // still served inside the back-off window
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[test]
    fn test_from_settings_without_client_id() {
        let settings = GoogleSettings::default();
        assert!(GoogleTokenVerifier::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_cache_drops_keys_without_kid() {
        let mut cache = JwksCache::new(Duration::from_secs(60));
        assert!(!cache.is_fresh());

        let mut anonymous = public_jwk();
        anonymous.kid = None;
        cache.store_keys(vec![public_jwk(), anonymous]);

        assert!(cache.is_fresh());
        assert!(cache.get_key(KID).is_some());
        assert_eq!(cache.keys.len(), 1);
    }
}
