pub mod aggregate;
pub mod app;
pub mod config;
pub mod errors;
pub mod format;
pub mod gate;
pub mod handlers;
pub mod metabase;
pub mod models;
pub mod pacing;
pub mod resolver;
pub mod state;
pub mod storage;
pub mod tokens;
pub mod ui;

pub use app::router;
pub use config::{AppConfig, load_partners};
pub use state::AppState;
