//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use lesson_planner_core::SessionSettings;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub cognito_authority: String,
    pub cognito_client_id: String,
    pub cognito_domain: String,
    /// Origin the app is served from; redirect and logout URIs hang off it.
    pub app_origin: String,
    pub sign_in_route: String,
    pub landing_route: String,
    pub renew_lead: Duration,
    pub remote_sign_out: bool,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Endpoints ---
        let api_url = required("API_URL")?;
        let cognito_authority = required("COGNITO_AUTHORITY")?;
        let cognito_client_id = required("COGNITO_CLIENT_ID")?;
        let cognito_domain = required("COGNITO_DOMAIN")?;
        let app_origin = or_default("APP_ORIGIN", "http://localhost:5173");

        // --- Session behaviour ---
        let sign_in_route = or_default("SIGN_IN_ROUTE", "/auth/login");
        let landing_route = or_default("LANDING_ROUTE", "/dashboard/default");

        let renew_lead_str = or_default("RENEW_LEAD_SECS", "60");
        let renew_lead = renew_lead_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue("RENEW_LEAD_SECS".to_string(), e.to_string()))?;

        let remote_sign_out_str = or_default("REMOTE_SIGN_OUT", "false");
        let remote_sign_out = match remote_sign_out_str.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "REMOTE_SIGN_OUT".to_string(),
                    format!("'{}' is not a boolean", remote_sign_out_str),
                ))
            }
        };

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_url,
            cognito_authority,
            cognito_client_id,
            cognito_domain,
            app_origin: app_origin.trim_end_matches('/').to_string(),
            sign_in_route,
            landing_route,
            renew_lead,
            remote_sign_out,
            log_level,
        })
    }

    /// The redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.app_origin)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            landing_route: self.landing_route.clone(),
            sign_in_route: self.sign_in_route.clone(),
            renew_lead: self.renew_lead,
            remote_sign_out: self.remote_sign_out,
            ..Default::default()
        }
    }
}
