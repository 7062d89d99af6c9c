//! crates/lesson_planner_core/src/session.rs
//!
//! The session manager: owns the identity-provider session and drives the
//! sign-in redirect, the callback exchange, silent renewal and sign-out.
//!
//! One instance is constructed at startup and shared (as `Arc<SessionManager>`)
//! with the request client and every store. Only this module mutates the session.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{Session, User};
use crate::ports::{
    CallbackError, CallbackParams, IdentityProvider, Navigation, Navigator, PortError, PortResult,
};

//=========================================================================================
// Settings
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Route used after sign-in when no return target was stored.
    pub landing_route: String,
    /// Sign-in entry point; callback failures land here with an error.
    pub sign_in_route: String,
    /// Application root, the destination of a local sign-out.
    pub root_route: String,
    /// How long before expiry the silent renewal fires.
    pub renew_lead: Duration,
    /// Also end the session at the identity provider on sign-out.
    pub remote_sign_out: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            landing_route: "/dashboard/default".to_string(),
            sign_in_route: "/auth/login".to_string(),
            root_route: "/".to_string(),
            renew_lead: Duration::from_secs(60),
            remote_sign_out: false,
        }
    }
}

//=========================================================================================
// Internal State
//=========================================================================================

#[derive(Debug, Clone)]
struct PendingSignIn {
    state: String,
    code_verifier: String,
}

#[derive(Default)]
struct AuthState {
    session: Option<Session>,
    pending: Option<PendingSignIn>,
    return_target: Option<String>,
    last_error: Option<String>,
}

//=========================================================================================
// SessionManager
//=========================================================================================

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    settings: SessionSettings,
    state: RwLock<AuthState>,
    renewal: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            navigator,
            settings,
            state: RwLock::new(AuthState::default()),
            renewal: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Sends the user agent to the provider's authorization endpoint.
    ///
    /// `return_target` is where `complete_sign_in_callback` navigates afterwards.
    pub fn begin_interactive_sign_in(&self, return_target: Option<&str>) -> PortResult<()> {
        let request = self.provider.authorization_request()?;
        {
            let mut state = self.state.write();
            state.pending = Some(PendingSignIn {
                state: request.state,
                code_verifier: request.code_verifier,
            });
            state.return_target = return_target.map(str::to_string);
            state.last_error = None;
        }
        info!("Redirecting to the identity provider for sign-in");
        self.navigator.navigate(Navigation::External(request.url));
        Ok(())
    }

    /// Completes the redirect flow with the parameters the provider returned.
    ///
    /// On success the session is installed and the user is taken to the stored
    /// return target. On failure the pending sign-in and return target are
    /// cleared and the user is sent back to the sign-in route carrying the
    /// error message. A session that was already installed is left alone.
    pub async fn complete_sign_in_callback(
        self: &Arc<Self>,
        params: CallbackParams,
    ) -> Result<Session, CallbackError> {
        match self.exchange_callback(params).await {
            Ok(session) => {
                let return_target = {
                    let mut state = self.state.write();
                    state.session = Some(session.clone());
                    state.pending = None;
                    state.last_error = None;
                    state.return_target.take()
                };
                self.schedule_renewal(&session);
                info!(subject = %session.claims.subject, "Sign-in completed");

                let target = return_target.unwrap_or_else(|| self.settings.landing_route.clone());
                self.navigator.navigate(Navigation::route(target));
                Ok(session)
            }
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "Sign-in callback failed");
                {
                    let mut state = self.state.write();
                    state.pending = None;
                    state.return_target = None;
                    state.last_error = Some(message.clone());
                }
                self.navigator.navigate(Navigation::Route {
                    path: self.settings.sign_in_route.clone(),
                    error: Some(message),
                });
                Err(err)
            }
        }
    }

    async fn exchange_callback(&self, params: CallbackParams) -> Result<Session, CallbackError> {
        if let Some(code) = params.error.as_deref() {
            return Err(CallbackError::from_provider_code(
                code,
                params.error_description.as_deref(),
            ));
        }

        let pending = self
            .state
            .read()
            .pending
            .clone()
            .ok_or_else(|| CallbackError::Provider("No matching sign-in request".to_string()))?;
        if params.state.as_deref() != Some(pending.state.as_str()) {
            return Err(CallbackError::Provider("Sign-in state mismatch".to_string()));
        }
        let code = params.code.ok_or(CallbackError::MissingSession)?;

        match self.provider.exchange_code(&code, &pending.code_verifier).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(CallbackError::MissingSession),
            Err(PortError::Callback(err)) => Err(err),
            Err(other) => Err(CallbackError::Provider(other.to_string())),
        }
    }

    /// Installs a session obtained outside the redirect flow, e.g. one the host
    /// restored from its own storage. Expired sessions are ignored.
    pub fn restore_session(self: &Arc<Self>, session: Session) -> bool {
        if session.is_expired() {
            debug!("Ignoring expired session on restore");
            return false;
        }
        self.state.write().session = Some(session.clone());
        self.schedule_renewal(&session);
        true
    }

    /// The current session if it has not expired. Never triggers renewal.
    pub fn active_session(&self) -> Option<Session> {
        let now = Utc::now();
        self.state
            .read()
            .session
            .as_ref()
            .filter(|session| session.is_valid_at(now))
            .cloned()
    }

    /// Whether any session is installed, expired or not.
    pub fn has_session(&self) -> bool {
        self.state.read().session.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.active_session().is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.active_session().map(|session| User::from(&session.claims))
    }

    /// The message of the last failed sign-in, for display on the sign-in page.
    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// Ends the local session and navigates away.
    ///
    /// With `remote_sign_out` enabled the destination is the provider's logout
    /// endpoint; otherwise it is the application root.
    pub fn sign_out(&self) {
        self.cancel_renewal();
        let session = {
            let mut state = self.state.write();
            state.pending = None;
            state.return_target = None;
            state.session.take()
        };

        let destination = if self.settings.remote_sign_out {
            let hint = session.as_ref().map(|s| s.id_token.as_str());
            match self.provider.logout_url(hint) {
                Ok(url) => Navigation::External(url),
                Err(e) => {
                    warn!(error = %e, "Could not build provider logout URL; signing out locally");
                    Navigation::route(self.settings.root_route.clone())
                }
            }
        } else {
            Navigation::route(self.settings.root_route.clone())
        };

        info!("Signed out");
        self.navigator.navigate(destination);
    }

    //-------------------------------------------------------------------------------------
    // Silent renewal
    //-------------------------------------------------------------------------------------

    fn schedule_renewal(self: &Arc<Self>, session: &Session) {
        let token = CancellationToken::new();
        if let Some(previous) = self.renewal.lock().replace(token.clone()) {
            previous.cancel();
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            debug!("Session has no refresh token; silent renewal disabled");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; silent renewal disabled");
            return;
        };

        let delay = renewal_delay(session, self.settings.renew_lead);
        debug!(delay_secs = delay.as_secs(), "Scheduled silent renewal");
        let manager: Weak<Self> = Arc::downgrade(self);
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(manager) = manager.upgrade() {
                        manager.renew(refresh_token, token).await;
                    }
                }
            }
        });
    }

    async fn renew(self: Arc<Self>, refresh_token: String, token: CancellationToken) {
        match self.provider.refresh(&refresh_token).await {
            Ok(mut renewed) => {
                if token.is_cancelled() {
                    debug!("Discarding renewal that finished after sign-out");
                    return;
                }
                // Providers may omit the refresh token on a refresh grant.
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = Some(refresh_token);
                }
                self.state.write().session = Some(renewed.clone());
                info!("Session renewed silently");
                self.schedule_renewal(&renewed);
            }
            Err(e) => warn!(error = %e, "Silent renewal failed; session will expire"),
        }
    }

    fn cancel_renewal(&self) {
        if let Some(token) = self.renewal.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_renewal();
    }
}

/// Time until renewal should fire: `renew_lead` before expiry, never negative.
fn renewal_delay(session: &Session, renew_lead: Duration) -> Duration {
    let lead = chrono::Duration::from_std(renew_lead).unwrap_or_else(|_| chrono::Duration::zero());
    (session.expires_at - lead - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{session_expiring_in, RecordingNavigator, StubProvider};

    fn manager_with(
        provider: Arc<StubProvider>,
        settings: SessionSettings,
    ) -> (Arc<SessionManager>, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::default());
        let manager = SessionManager::new(provider, navigator.clone(), settings);
        (manager, navigator)
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sign_in_round_trip_navigates_to_return_target() {
        let provider = Arc::new(StubProvider::default());
        provider.set_exchange(Ok(Some(session_expiring_in(chrono::Duration::hours(1)))));
        let (manager, navigator) = manager_with(provider.clone(), SessionSettings::default());

        manager.begin_interactive_sign_in(Some("/lessons/42")).unwrap();
        assert!(matches!(navigator.last(), Some(Navigation::External(url)) if url.contains("state=state-1")));

        let session = manager
            .complete_sign_in_callback(callback("code-1", "state-1"))
            .await
            .unwrap();

        assert_eq!(provider.exchanged_codes(), vec![("code-1".to_string(), "verifier-1".to_string())]);
        assert!(manager.is_authenticated());
        assert_eq!(manager.active_session(), Some(session));
        assert_eq!(navigator.last(), Some(Navigation::route("/lessons/42")));
    }

    #[tokio::test]
    async fn sign_in_defaults_to_landing_route() {
        let provider = Arc::new(StubProvider::default());
        provider.set_exchange(Ok(Some(session_expiring_in(chrono::Duration::hours(1)))));
        let (manager, navigator) = manager_with(provider, SessionSettings::default());

        manager.begin_interactive_sign_in(None).unwrap();
        manager
            .complete_sign_in_callback(callback("code-1", "state-1"))
            .await
            .unwrap();

        assert_eq!(navigator.last(), Some(Navigation::route("/dashboard/default")));
    }

    #[tokio::test]
    async fn empty_exchange_fails_with_missing_session() {
        let provider = Arc::new(StubProvider::default());
        provider.set_exchange(Ok(None));
        let (manager, navigator) = manager_with(provider, SessionSettings::default());

        manager.begin_interactive_sign_in(None).unwrap();
        let err = manager
            .complete_sign_in_callback(callback("code-1", "state-1"))
            .await
            .unwrap_err();

        assert_eq!(err, CallbackError::MissingSession);
        assert!(!manager.is_authenticated());
        assert_eq!(
            navigator.last(),
            Some(Navigation::Route {
                path: "/auth/login".to_string(),
                error: Some("No user data received".to_string()),
            })
        );
        assert_eq!(manager.last_error().as_deref(), Some("No user data received"));
    }

    #[tokio::test]
    async fn provider_error_codes_map_to_callback_kinds() {
        let provider = Arc::new(StubProvider::default());
        let (manager, navigator) = manager_with(provider.clone(), SessionSettings::default());

        manager.begin_interactive_sign_in(None).unwrap();
        let err = manager
            .complete_sign_in_callback(CallbackParams {
                error: Some("login_required".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, CallbackError::LoginRequired);
        assert!(matches!(
            navigator.last(),
            Some(Navigation::Route { error: Some(msg), .. }) if msg == "Please log in again"
        ));

        provider.set_exchange(Err(PortError::Callback(CallbackError::InvalidGrant)));
        manager.begin_interactive_sign_in(None).unwrap();
        let err = manager
            .complete_sign_in_callback(callback("stale", "state-1"))
            .await
            .unwrap_err();
        assert_eq!(err, CallbackError::InvalidGrant);
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_without_exchange() {
        let provider = Arc::new(StubProvider::default());
        provider.set_exchange(Ok(Some(session_expiring_in(chrono::Duration::hours(1)))));
        let (manager, _navigator) = manager_with(provider.clone(), SessionSettings::default());

        manager.begin_interactive_sign_in(None).unwrap();
        let err = manager
            .complete_sign_in_callback(callback("code-1", "forged"))
            .await
            .unwrap_err();

        assert!(matches!(err, CallbackError::Provider(_)));
        assert!(provider.exchanged_codes().is_empty());
        assert!(!manager.has_session());
    }

    #[tokio::test]
    async fn failed_callback_keeps_an_existing_session() {
        let provider = Arc::new(StubProvider::default());
        provider.set_exchange(Ok(Some(session_expiring_in(chrono::Duration::hours(1)))));
        let (manager, navigator) = manager_with(provider.clone(), SessionSettings::default());
        let session = session_expiring_in(chrono::Duration::hours(1));
        assert!(manager.restore_session(session.clone()));

        manager.begin_interactive_sign_in(Some("/plans")).unwrap();
        let err = manager
            .complete_sign_in_callback(callback("code-1", "forged"))
            .await
            .unwrap_err();

        assert!(matches!(err, CallbackError::Provider(_)));
        assert_eq!(manager.active_session(), Some(session));
        assert!(manager.renewal.lock().is_some());
        assert!(manager.state.read().pending.is_none());
        assert!(manager.state.read().return_target.is_none());
        assert!(matches!(
            navigator.last(),
            Some(Navigation::Route { path, error: Some(_) }) if path == "/auth/login"
        ));
    }

    #[tokio::test]
    async fn expired_session_is_not_active() {
        let provider = Arc::new(StubProvider::default());
        let (manager, _navigator) = manager_with(provider, SessionSettings::default());

        assert!(!manager.restore_session(session_expiring_in(chrono::Duration::seconds(-5))));
        assert!(!manager.is_authenticated());
        assert!(manager.active_session().is_none());
    }

    #[tokio::test]
    async fn local_sign_out_clears_session_and_goes_home() {
        let provider = Arc::new(StubProvider::default());
        let (manager, navigator) = manager_with(provider, SessionSettings::default());
        assert!(manager.restore_session(session_expiring_in(chrono::Duration::hours(1))));

        manager.sign_out();

        assert!(!manager.has_session());
        assert_eq!(navigator.last(), Some(Navigation::route("/")));
    }

    #[tokio::test]
    async fn remote_sign_out_goes_to_provider_logout_with_hint() {
        let provider = Arc::new(StubProvider::default());
        let settings = SessionSettings {
            remote_sign_out: true,
            ..Default::default()
        };
        let (manager, navigator) = manager_with(provider, settings);
        let session = session_expiring_in(chrono::Duration::hours(1));
        let id_token = session.id_token.clone();
        manager.restore_session(session);

        manager.sign_out();

        assert!(matches!(
            navigator.last(),
            Some(Navigation::External(url)) if url.ends_with(&format!("id_token_hint={id_token}"))
        ));
    }

    #[tokio::test]
    async fn remote_sign_out_falls_back_to_root_without_logout_url() {
        let provider = Arc::new(StubProvider::default());
        provider.set_logout(Err(PortError::Validation("no hosted UI domain".to_string())));
        let settings = SessionSettings {
            remote_sign_out: true,
            ..Default::default()
        };
        let (manager, navigator) = manager_with(provider, settings);
        manager.restore_session(session_expiring_in(chrono::Duration::hours(1)));

        manager.sign_out();

        assert!(!manager.has_session());
        assert_eq!(navigator.last(), Some(Navigation::route("/")));
    }

    #[tokio::test]
    async fn renewal_replaces_session_before_expiry() {
        let provider = Arc::new(StubProvider::default());
        let mut renewed = session_expiring_in(chrono::Duration::hours(1));
        renewed.id_token = "renewed-id-token".to_string();
        renewed.refresh_token = None;
        provider.set_refresh(Ok(renewed));
        let (manager, _navigator) = manager_with(provider.clone(), SessionSettings::default());

        // Inside the renewal lead, so renewal is due immediately.
        manager.restore_session(session_expiring_in(chrono::Duration::seconds(30)));

        tokio::time::timeout(Duration::from_secs(2), async {
            while provider.refresh_calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while manager.active_session().map(|s| s.id_token) != Some("renewed-id-token".to_string()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let active = manager.active_session().unwrap();
        assert_eq!(active.refresh_token.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn sign_out_cancels_pending_renewal() {
        let provider = Arc::new(StubProvider::default());
        let settings = SessionSettings {
            renew_lead: Duration::from_secs(0),
            ..Default::default()
        };
        let (manager, _navigator) = manager_with(provider.clone(), settings);
        manager.restore_session(session_expiring_in(chrono::Duration::milliseconds(200)));

        manager.sign_out();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(provider.refresh_calls(), 0);
        assert!(!manager.has_session());
    }

    #[test]
    fn renewal_delay_is_never_negative() {
        let session = session_expiring_in(chrono::Duration::seconds(10));
        assert_eq!(renewal_delay(&session, Duration::from_secs(60)), Duration::ZERO);

        let session = session_expiring_in(chrono::Duration::hours(1));
        let delay = renewal_delay(&session, Duration::from_secs(60));
        assert!(delay > Duration::from_secs(3400) && delay <= Duration::from_secs(3540));
    }
}
