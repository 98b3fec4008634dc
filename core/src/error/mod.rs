#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;
pub mod stage;

pub use error::{CliError, RecorderError};
pub use executor::{GraphError, StageError};
pub use stage::{LoadError, MergeError};
