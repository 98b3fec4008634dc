pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod recorder;
pub mod stage;
pub mod state;
pub mod util;
