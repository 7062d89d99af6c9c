//! services/client/src/adapters/navigator.rs
//!
//! A `Navigator` for a terminal host: external destinations are printed for
//! the user to open, in-app routes are logged.

use lesson_planner_core::ports::{Navigation, Navigator};
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, to: Navigation) {
        match to {
            Navigation::External(url) => {
                println!("\nOpen this URL in your browser:\n  {url}\n");
            }
            Navigation::Route { path, error: None } => info!(%path, "Navigated"),
            Navigation::Route {
                path,
                error: Some(error),
            } => warn!(%path, %error, "Navigated with an error"),
        }
    }
}
