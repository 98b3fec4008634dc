//! Stage definitions: the data model, merging of definition sources and
//! loading from files or directory trees.
//!
//! ```text
//! paths (argument order)
//!   ↓
//! StageLoader::load_path()   file → Stage, dir → composite Stage
//!   ↓
//! Stage::merge_with()        fold left-to-right into one root
//!   ↓
//! executor::parse_stage_graph()
//! ```

mod loader;
mod merge;
mod types;

pub use loader::{discover_stage_files, StageLoader, DEFAULT_STAGE_FILE_EXT};
pub use types::{Stage, StagePayload};
