//! services/client/src/bin/lesson_client.rs

use client_lib::{
    adapters::{callback_params, CognitoOidcAdapter, CognitoSettings, ConsoleNavigator, ReqwestTransport},
    config::Config,
    error::ClientError,
};
use lesson_planner_core::{
    ApiClient, LessonApi, LessonStore, PlanApi, PlanStore, PortError, ProfileApi, ProfileStore,
    SessionManager,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting client...");

    // --- 2. Initialize Adapters ---
    let transport = Arc::new(ReqwestTransport::new()?);
    let provider = CognitoOidcAdapter::discover(transport.clone(), CognitoSettings::from(&config)).await?;
    let session = SessionManager::new(
        Arc::new(provider),
        Arc::new(ConsoleNavigator),
        config.session_settings(),
    );

    // --- 3. Interactive Sign-In ---
    session.begin_interactive_sign_in(None)?;
    println!("After signing in, paste the full URL you were redirected to:");
    let callback_url = BufReader::new(tokio::io::stdin())
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| ClientError::Internal("no callback URL entered".to_string()))?;
    session
        .complete_sign_in_callback(callback_params(callback_url.trim())?)
        .await
        .map_err(PortError::from)?;
    if let Some(user) = session.current_user() {
        info!(id = %user.id, name = ?user.name, "Signed in");
    }

    // --- 4. Load Resources ---
    let api = Arc::new(ApiClient::new(transport, session.clone(), config.api_url.clone()));
    let lessons = LessonStore::new(LessonApi::new(api.clone()));
    let plans = PlanStore::new(PlanApi::new(api.clone()));
    let profiles = ProfileStore::new(ProfileApi::new(api));
    tokio::join!(lessons.list(), plans.list(), profiles.list());

    println!("Lessons:");
    for lesson in lessons.sorted() {
        println!("  {} | {} | grade {} | {}", lesson.lesson_id, lesson.title, lesson.grade, lesson.status);
    }
    println!("Plans:");
    for plan in plans.sorted() {
        println!("  {} | {} | {}", plan.plan_id, plan.title, plan.goal);
    }
    println!("Profiles:");
    for profile in profiles.sorted() {
        let marker = if profile.active { "*" } else { " " };
        println!(" {marker} {}", profile.profile_name);
    }
    for error in [lessons.error(), plans.error(), profiles.error()].into_iter().flatten() {
        eprintln!("error: {error}");
    }

    // --- 5. Sign Out ---
    session.sign_out();
    Ok(())
}
