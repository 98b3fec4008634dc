pub mod config;
pub mod result;
pub mod status;

pub use config::*;
pub use result::*;
pub use status::*;
