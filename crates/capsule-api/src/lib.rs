pub mod auth;
pub mod capsules;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod files;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
