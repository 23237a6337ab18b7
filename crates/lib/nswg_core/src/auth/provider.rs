//! Discord OAuth2 identity provider.
//!
//! Token exchange, token refresh and profile lookup. Each call is a single
//! outbound request; retry policy belongs to the caller.

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::AuthError;
use super::config::{ProviderConfig, check_ttl};

/// OAuth scopes requested at login.
const LOGIN_SCOPES: &str = "identify email";

/// Response from the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Relative lifetime in seconds; some providers leave it out.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Present only when the provider rotates or issues a refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// The authenticated user's identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Identity provider operations used by login and the session manager.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Browser URL that starts the consent flow for the given CSRF state.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a token grant.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;

    /// Exchange a refresh token for a renewed grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// Fetch the profile of the user owning `access_token`.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;
}

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// reqwest-backed Discord adapter.
pub struct DiscordProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl DiscordProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, AuthError> {
        Url::parse(&config.authorize_url)
            .map_err(|e| AuthError::Config(format!("invalid authorize URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> Result<TokenGrant, String> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let grant = resp
            .json::<TokenGrant>()
            .await
            .map_err(|e| format!("response parse error: {e}"))?;
        if grant.access_token.is_empty() {
            return Err("response carried an empty access_token".into());
        }
        if let Some(expires_in) = grant.expires_in {
            check_ttl(expires_in).map_err(|e| format!("malformed expires_in: {e}"))?;
        }
        Ok(grant)
    }
}

#[async_trait]
impl IdentityProvider for DiscordProvider {
    fn authorize_url(&self, state: &str) -> String {
        match Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", LOGIN_SCOPES),
                ("state", state),
                ("prompt", "consent"),
            ],
        ) {
            Ok(url) => url.into(),
            // Parsed once in `new`.
            Err(_) => self.config.authorize_url.clone(),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.post_token_form(&params)
            .await
            .map_err(|e| AuthError::ProviderRequestFailed(format!("code exchange: {e}")))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::ProviderRefreshFailed("empty refresh token".into()));
        }
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let grant = self
            .post_token_form(&params)
            .await
            .map_err(AuthError::ProviderRefreshFailed)?;
        debug!(
            rotated = grant.refresh_token.is_some(),
            expires_in = ?grant.expires_in,
            "provider refreshed access token"
        );
        Ok(grant)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let url = format!("{}/users/@me", self.config.api_base.trim_end_matches('/'));
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProviderRequestFailed(format!("profile request: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AuthError::ProviderRequestFailed(format!("profile HTTP {status}")));
        }

        resp.json::<ProviderProfile>()
            .await
            .map_err(|e| AuthError::ProviderRequestFailed(format!("profile parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::{get, post};

    use super::*;

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base: &str) -> DiscordProvider {
        let mut config = ProviderConfig::discord("client-1", "secret-1", "http://localhost/auth/callback").unwrap();
        config.token_url = format!("{base}/oauth2/token");
        config.api_base = base.to_string();
        config.request_timeout = Duration::from_secs(5);
        DiscordProvider::new(config).unwrap()
    }

    async fn echo_refresh(body: String) -> (StatusCode, String) {
        let form: std::collections::HashMap<String, String> = url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        let ok = form.get("grant_type").map(String::as_str) == Some("refresh_token")
            && form.get("client_id").map(String::as_str) == Some("client-1")
            && form.get("client_secret").map(String::as_str) == Some("secret-1")
            && form.get("refresh_token").map(String::as_str) == Some("r-old");
        if ok {
            (
                StatusCode::OK,
                r#"{"access_token":"a-new","token_type":"Bearer","expires_in":604800,"refresh_token":"r-new"}"#.into(),
            )
        } else {
            (StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#.into())
        }
    }

    #[tokio::test]
    async fn refresh_posts_form_and_passes_rotation_through() {
        let base = serve(Router::new().route("/oauth2/token", post(echo_refresh))).await;
        let grant = provider(&base).refresh("r-old").await.unwrap();
        assert_eq!(grant.access_token, "a-new");
        assert_eq!(grant.expires_in, Some(604800));
        assert_eq!(grant.refresh_token.as_deref(), Some("r-new"));
    }

    #[tokio::test]
    async fn refresh_without_rotation_or_expiry() {
        let app = Router::new().route("/oauth2/token", post(|| async { r#"{"access_token":"a-new"}"# }));
        let base = serve(app).await;
        let grant = provider(&base).refresh("anything").await.unwrap();
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.expires_in, None);
    }

    #[tokio::test]
    async fn non_success_status_is_refresh_failure() {
        let base = serve(Router::new().route("/oauth2/token", post(echo_refresh))).await;
        let err = provider(&base).refresh("r-revoked").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderRefreshFailed(_)), "{err}");
    }

    #[tokio::test]
    async fn malformed_body_is_refresh_failure() {
        let app = Router::new().route("/oauth2/token", post(|| async { "not json" }));
        let base = serve(app).await;
        let err = provider(&base).refresh("r-old").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderRefreshFailed(_)), "{err}");
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_refresh_failure() {
        for body in [
            r#"{"access_token":"a-new","expires_in":-100}"#,
            r#"{"access_token":"a-new","expires_in":0}"#,
            r#"{"access_token":"a-new","expires_in":10000000000000000}"#,
        ] {
            let app = Router::new().route("/oauth2/token", post(move || async move { body }));
            let base = serve(app).await;
            let err = provider(&base).refresh("r-old").await.unwrap_err();
            match err {
                AuthError::ProviderRefreshFailed(msg) => assert!(msg.contains("expires_in"), "{msg}"),
                other => panic!("unexpected error for {body}: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn empty_refresh_token_fails_without_request() {
        // Nothing listens here; a request would surface a connection error message.
        let err = provider("http://127.0.0.1:9").refresh("").await.unwrap_err();
        match err {
            AuthError::ProviderRefreshFailed(msg) => assert_eq!(msg, "empty refresh token"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn exchange_code_and_fetch_profile() {
        let app = Router::new()
            .route(
                "/oauth2/token",
                post(|body: String| async move {
                    if body.contains("grant_type=authorization_code") && body.contains("code=c-1") {
                        (StatusCode::OK, r#"{"access_token":"a-1","expires_in":3600,"refresh_token":"r-1"}"#)
                    } else {
                        (StatusCode::BAD_REQUEST, "{}")
                    }
                }),
            )
            .route(
                "/users/@me",
                get(|headers: axum::http::HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if auth == "Bearer a-1" {
                        (StatusCode::OK, r#"{"id":"123","username":"frogman","email":"f@example.com"}"#)
                    } else {
                        (StatusCode::UNAUTHORIZED, "{}")
                    }
                }),
            );
        let base = serve(app).await;
        let p = provider(&base);

        let grant = p.exchange_code("c-1").await.unwrap();
        assert_eq!(grant.refresh_token.as_deref(), Some("r-1"));

        let profile = p.fetch_profile(&grant.access_token).await.unwrap();
        assert_eq!(profile.id, "123");
        assert_eq!(profile.username, "frogman");
        assert_eq!(profile.avatar, None);

        let err = p.fetch_profile("wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderRequestFailed(_)));
        let err = p.exchange_code("c-2").await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderRequestFailed(_)));
    }

    #[tokio::test]
    async fn authorize_url_carries_client_and_state() {
        let p = provider("http://localhost:1");
        let url = Url::parse(&p.authorize_url("st-1")).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["state"], "st-1");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "identify email");
        assert_eq!(pairs["redirect_uri"], "http://localhost/auth/callback");
    }

    #[test]
    fn generate_state_produces_unique_values() {
        let s1 = generate_state();
        let s2 = generate_state();
        assert_ne!(s1, s2);
        assert_eq!(s1.len(), 48);
    }
}
