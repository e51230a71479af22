//! Google Cloud credentials shared by the detector, archive and history store

use crate::error::AuthError;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use sightline_core::config::GoogleCloudConfig;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are replaced this long before the issuer's expiry.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key that the token exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::InvalidKey(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let json = std::fs::read_to_string(path).map_err(|source| AuthError::ReadKey {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 JWT-bearer exchange with a cached access token.
struct ServiceAccountTokens {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    fn new(key: ServiceAccountKey) -> Result<Self, AuthError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            key,
            signing_key,
            client,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, issued_at: i64) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.key.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        Ok(encode(&header, &claims, &self.signing_key)?)
    }

    /// Concurrent callers wait on one refresh instead of racing their own.
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response.json().await?;
        let valid_for = Duration::from_secs(body.expires_in).saturating_sub(REFRESH_MARGIN);
        debug!(
            "Obtained access token for {} (expires in {}s)",
            self.key.client_email, body.expires_in
        );
        Ok(CachedToken {
            value: body.access_token,
            refresh_at: Instant::now() + valid_for,
        })
    }
}

enum TokenSource {
    None,
    Static(String),
    ServiceAccount(ServiceAccountTokens),
}

/// API key and bearer token for Google REST calls. A service-account key
/// takes precedence over a fixed access token.
pub struct GoogleAuth {
    api_key: Option<String>,
    tokens: TokenSource,
}

impl GoogleAuth {
    pub fn none() -> Self {
        Self {
            api_key: None,
            tokens: TokenSource::None,
        }
    }

    pub fn with_service_account(key: ServiceAccountKey) -> Result<Self, AuthError> {
        Ok(Self {
            api_key: None,
            tokens: TokenSource::ServiceAccount(ServiceAccountTokens::new(key)?),
        })
    }

    pub fn from_config(google: &GoogleCloudConfig) -> Result<Self, AuthError> {
        let tokens = match (&google.credentials_file, &google.access_token) {
            (Some(path), _) => TokenSource::ServiceAccount(ServiceAccountTokens::new(ServiceAccountKey::from_file(path)?)?),
            (None, Some(token)) => TokenSource::Static(token.clone()),
            (None, None) => TokenSource::None,
        };

        Ok(Self {
            api_key: google.api_key.clone(),
            tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || !matches!(self.tokens, TokenSource::None)
    }

    pub fn describe(&self) -> &'static str {
        match (&self.tokens, &self.api_key) {
            (TokenSource::ServiceAccount(_), _) => "service account",
            (TokenSource::Static(_), _) => "access token",
            (TokenSource::None, Some(_)) => "api key",
            (TokenSource::None, None) => "none",
        }
    }

    /// Current bearer token, refreshed when a service-account token is due.
    pub async fn bearer_token(&self) -> Result<Option<String>, AuthError> {
        match &self.tokens {
            TokenSource::None => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::ServiceAccount(tokens) => tokens.token().await.map(Some),
        }
    }

    /// Attach the `key` query parameter and bearer token, whichever are set.
    pub async fn authorize(&self, mut request: RequestBuilder) -> Result<RequestBuilder, AuthError> {
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoogleCloudConfig {
        GoogleCloudConfig::default()
    }

    #[test]
    fn test_none_is_unconfigured() {
        let auth = GoogleAuth::from_config(&config()).unwrap();
        assert!(!auth.is_configured());
        assert_eq!(auth.describe(), "none");
    }

    #[tokio::test]
    async fn test_static_token_and_api_key() {
        let google = GoogleCloudConfig {
            api_key: Some("k 1".to_string()),
            access_token: Some("ya29.fixed".to_string()),
            ..config()
        };
        let auth = GoogleAuth::from_config(&google).unwrap();
        assert_eq!(auth.describe(), "access token");

        let request = auth
            .authorize(Client::new().post("https://example.test/v1/b/frames/o?uploadType=multipart"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("uploadType=multipart&key=k+1"));
        assert_eq!(request.headers()["authorization"], "Bearer ya29.fixed");
    }

    #[test]
    fn test_missing_credentials_file() {
        let google = GoogleCloudConfig {
            credentials_file: Some("/nonexistent/sightline-key.json".into()),
            ..config()
        };
        assert!(matches!(GoogleAuth::from_config(&google), Err(AuthError::ReadKey { .. })));
    }

    #[test]
    fn test_key_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(
            r#"{"type":"service_account","client_email":"svc@demo.iam.gserviceaccount.com","private_key":"x"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());

        assert!(matches!(ServiceAccountKey::from_json("{}"), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_unparseable_private_key() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"svc@demo.iam.gserviceaccount.com","private_key":"not a pem"}"#,
        )
        .unwrap();
        assert!(matches!(GoogleAuth::with_service_account(key), Err(AuthError::InvalidKey(_))));
    }
}
