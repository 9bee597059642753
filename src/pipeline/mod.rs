//! Pipeline domain types and logic

pub mod errors;
pub mod exec;
pub mod loader;
pub mod pipeline_def;
pub mod stage;
pub mod stash;
pub mod types;

pub use errors::{ConfigError, PipelineError, StashError, ValidationError};
pub use exec::{Build, Command, Exec, HOST_ENV_SIGIL, Push, Workdir};
pub use loader::{parse, parse_file};
pub use pipeline_def::Pipeline;
pub use stage::{MAX_STAGE_NAME, Stage};
pub use stash::StashStore;
pub use types::Validate;
