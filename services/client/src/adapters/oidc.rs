//! services/client/src/adapters/oidc.rs
//!
//! This module contains the adapter for the Cognito user pool acting as an
//! OpenID Connect provider. It implements the `IdentityProvider` port from the
//! core crate: authorization-code flow with PKCE (S256), token exchange and
//! refresh against the discovered token endpoint, and the hosted-UI logout URL.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lesson_planner_core::domain::{Claims, Session};
use lesson_planner_core::ports::{
    AuthorizationRequest, CallbackError, CallbackParams, HttpRequest, HttpTransport,
    IdentityProvider, Method, PortError, PortResult,
};
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;

//=========================================================================================
// Settings & Discovery
//=========================================================================================

#[derive(Debug, Clone)]
pub struct CognitoSettings {
    /// Issuer URL of the user pool; discovery hangs off it.
    pub authority: String,
    pub client_id: String,
    /// Hosted UI domain, used for logout.
    pub domain: String,
    pub redirect_uri: String,
    /// Where the hosted UI returns after logout.
    pub logout_uri: String,
}

impl From<&Config> for CognitoSettings {
    fn from(config: &Config) -> Self {
        Self {
            authority: config.cognito_authority.trim_end_matches('/').to_string(),
            client_id: config.cognito_client_id.clone(),
            domain: config.cognito_domain.trim_end_matches('/').to_string(),
            redirect_uri: config.redirect_uri(),
            logout_uri: format!("{}{}", config.app_origin, config.sign_in_route),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    exp: Option<i64>,
}

//=========================================================================================
// PKCE & Token Helpers
//=========================================================================================

/// A fresh 43-character PKCE code verifier.
fn new_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The S256 code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Reads the unverified payload of a JWT.
fn decode_id_token(id_token: &str) -> PortResult<IdTokenClaims> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| PortError::Decode("ID token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| PortError::Decode(format!("ID token payload: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `base` with `pairs` appended as a form-encoded query.
fn url_with_query(base: &str, pairs: &[(&str, &str)]) -> PortResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| PortError::Validation(format!("Invalid provider URL {base}: {e}")))?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.into())
}

/// Parses the query string of the redirect URI the provider sent the user back to.
pub fn callback_params(callback_url: &str) -> PortResult<CallbackParams> {
    let url = Url::parse(callback_url)
        .map_err(|e| PortError::Validation(format!("Invalid callback URL: {e}")))?;
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        let value = Some(value.into_owned());
        match key.as_ref() {
            "code" => params.code = value,
            "state" => params.state = value,
            "error" => params.error = value,
            "error_description" => params.error_description = value,
            _ => {}
        }
    }
    Ok(params)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct CognitoOidcAdapter {
    transport: Arc<dyn HttpTransport>,
    settings: CognitoSettings,
    discovery: Discovery,
}

impl CognitoOidcAdapter {
    /// Reads the provider metadata from the authority's discovery document.
    pub async fn discover(
        transport: Arc<dyn HttpTransport>,
        settings: CognitoSettings,
    ) -> PortResult<Self> {
        let url = format!("{}/.well-known/openid-configuration", settings.authority);
        debug!(%url, "Fetching OpenID configuration");
        let response = transport
            .send(HttpRequest {
                method: Method::Get,
                url,
                headers: vec![("Accept".to_string(), "application/json".to_string())],
                body: None,
            })
            .await?;
        if !response.is_success() {
            return Err(PortError::Http {
                status: response.status,
                message: format!("OpenID discovery failed: {}", response.status_text),
            });
        }
        let discovery: Discovery = serde_json::from_str(&response.body)?;
        info!(issuer = %settings.authority, "OpenID configuration loaded");

        Ok(Self {
            transport,
            settings,
            discovery,
        })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> PortResult<TokenResponse> {
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::Post,
                url: self.discovery.token_endpoint.clone(),
                headers: vec![(
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                )],
                body: Some(form_body(form)),
            })
            .await?;

        let parsed: Option<TokenResponse> = serde_json::from_str(&response.body).ok();
        if let Some(TokenResponse {
            error: Some(code),
            error_description,
            ..
        }) = &parsed
        {
            return Err(CallbackError::from_provider_code(code, error_description.as_deref()).into());
        }
        if !response.is_success() {
            return Err(PortError::Http {
                status: response.status,
                message: response.status_text,
            });
        }
        parsed.ok_or_else(|| PortError::Decode("token endpoint returned no JSON".to_string()))
    }

    /// Turns a token response into a session. Expiry comes from `expires_in`,
    /// else from the token's `exp` claim.
    fn session_from(tokens: TokenResponse, now: DateTime<Utc>) -> PortResult<Option<Session>> {
        let Some(id_token) = tokens.id_token else {
            return Ok(None);
        };
        let claims = decode_id_token(&id_token)?;
        let expires_at = match (tokens.expires_in, claims.exp) {
            (Some(seconds), _) => now + Duration::seconds(seconds),
            (None, Some(exp)) => Utc
                .timestamp_opt(exp, 0)
                .single()
                .ok_or_else(|| PortError::Decode(format!("invalid exp claim {exp}")))?,
            (None, None) => {
                return Err(PortError::Decode("token response has no expiry".to_string()))
            }
        };

        Ok(Some(Session {
            access_token: tokens.access_token.unwrap_or_default(),
            id_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            claims: Claims {
                subject: claims.sub,
                email: claims.email,
                name: claims.name,
            },
        }))
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for CognitoOidcAdapter {
    fn authorization_request(&self) -> PortResult<AuthorizationRequest> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let code_verifier = new_code_verifier();
        let challenge = code_challenge(&code_verifier);

        let url = url_with_query(
            &self.discovery.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("scope", "openid"),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("response_mode", "query"),
            ],
        )?;
        Ok(AuthorizationRequest {
            url,
            state,
            code_verifier,
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PortResult<Option<Session>> {
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.settings.client_id.as_str()),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("code_verifier", code_verifier),
            ])
            .await?;
        Self::session_from(tokens, Utc::now())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<Session> {
        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .await?;
        Self::session_from(tokens, Utc::now())?
            .ok_or_else(|| PortError::Decode("refresh returned no ID token".to_string()))
    }

    fn logout_url(&self, id_token_hint: Option<&str>) -> PortResult<String> {
        let mut pairs = vec![
            ("client_id", self.settings.client_id.as_str()),
            ("logout_uri", self.settings.logout_uri.as_str()),
        ];
        if let Some(hint) = id_token_hint {
            pairs.push(("id_token_hint", hint));
        }
        url_with_query(&format!("{}/logout", self.settings.domain), &pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_planner_core::ports::HttpResponse;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        replies: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        fn reply(&self, status: u16, body: serde_json::Value) {
            self.replies.lock().unwrap().push_back(HttpResponse {
                status,
                status_text: String::new(),
                body: body.to_string(),
            });
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, request: HttpRequest) -> PortResult<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| PortError::Network("no reply".to_string()))
        }
    }

    fn settings() -> CognitoSettings {
        CognitoSettings {
            authority: "https://idp.test/pool".to_string(),
            client_id: "client-123".to_string(),
            domain: "https://planner.auth.test".to_string(),
            redirect_uri: "http://localhost:5173/auth/callback".to_string(),
            logout_uri: "http://localhost:5173/auth/login".to_string(),
        }
    }

    fn id_token(claims: serde_json::Value) -> String {
        format!(
            "eyJhbGciOiJSUzI1NiJ9.{}.signature",
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    async fn discovered(transport: &Arc<FakeTransport>) -> CognitoOidcAdapter {
        transport.reply(
            200,
            json!({
                "authorization_endpoint": "https://planner.auth.test/oauth2/authorize",
                "token_endpoint": "https://planner.auth.test/oauth2/token",
                "issuer": "https://idp.test/pool"
            }),
        );
        CognitoOidcAdapter::discover(transport.clone(), settings())
            .await
            .unwrap()
    }

    #[test]
    fn code_challenge_matches_rfc_7636_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_eq!(new_code_verifier().len(), 43);
    }

    #[test]
    fn callback_url_query_is_parsed() {
        let params =
            callback_params("http://localhost:5173/auth/callback?code=abc&state=xyz").unwrap();
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));

        let params = callback_params(
            "http://localhost:5173/auth/callback?error=access_denied&error_description=User%20cancelled",
        )
        .unwrap();
        assert_eq!(params.error_description.as_deref(), Some("User cancelled"));
        assert!(callback_params("not a url").is_err());
    }

    #[tokio::test]
    async fn authorization_url_carries_pkce_and_state() {
        let transport = Arc::new(FakeTransport::default());
        let adapter = discovered(&transport).await;

        let request = adapter.authorization_request().unwrap();

        assert_eq!(
            transport.requests()[0].url,
            "https://idp.test/pool/.well-known/openid-configuration"
        );
        assert!(request.url.starts_with("https://planner.auth.test/oauth2/authorize?response_type=code&client_id=client-123"));
        assert!(request.url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5173%2Fauth%2Fcallback"));
        assert!(request.url.contains(&format!("state={}", request.state)));
        assert!(request
            .url
            .contains(&format!("code_challenge={}", code_challenge(&request.code_verifier))));
        assert!(request.url.contains("code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn code_exchange_builds_session_from_id_token() {
        let transport = Arc::new(FakeTransport::default());
        let adapter = discovered(&transport).await;
        transport.reply(
            200,
            json!({
                "id_token": id_token(json!({ "sub": "teacher-1", "email": "t@school.test" })),
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            }),
        );

        let session = adapter.exchange_code("code-1", "verifier-1").await.unwrap().unwrap();

        assert_eq!(session.claims.subject, "teacher-1");
        assert_eq!(session.claims.email.as_deref(), Some("t@school.test"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
        assert!(!session.is_expired());

        let token_request = &transport.requests()[1];
        assert_eq!(token_request.url, "https://planner.auth.test/oauth2/token");
        let body = token_request.body.as_deref().unwrap();
        assert!(body.starts_with("grant_type=authorization_code&client_id=client-123&code=code-1"));
        assert!(body.ends_with("code_verifier=verifier-1"));
    }

    #[tokio::test]
    async fn token_errors_map_to_callback_errors() {
        let transport = Arc::new(FakeTransport::default());
        let adapter = discovered(&transport).await;
        transport.reply(400, json!({ "error": "invalid_grant" }));
        transport.reply(200, json!({ "access_token": "only-access" }));

        assert_eq!(
            adapter.exchange_code("stale", "verifier").await,
            Err(PortError::Callback(CallbackError::InvalidGrant))
        );
        assert_eq!(adapter.exchange_code("code", "verifier").await, Ok(None));
    }

    #[tokio::test]
    async fn logout_url_targets_hosted_ui() {
        let transport = Arc::new(FakeTransport::default());
        let adapter = discovered(&transport).await;

        assert_eq!(
            adapter.logout_url(Some("tok")).unwrap(),
            "https://planner.auth.test/logout?client_id=client-123&logout_uri=http%3A%2F%2Flocalhost%3A5173%2Fauth%2Flogin&id_token_hint=tok"
        );
    }

    #[tokio::test]
    async fn logout_url_rejects_a_malformed_domain() {
        let transport = Arc::new(FakeTransport::default());
        let mut adapter = discovered(&transport).await;
        adapter.settings.domain = "planner.auth.test".to_string();

        assert!(matches!(adapter.logout_url(None), Err(PortError::Validation(_))));
    }
}
