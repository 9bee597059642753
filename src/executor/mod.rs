//! Stage execution layer
//!
//! Turns each stage's execution unit into container runtime calls: command
//! stages run through the container lifecycle, build and push stages go
//! straight to the runtime's image operations.

mod cache;
mod context;
pub mod image;
mod lifecycle;
pub mod script;

pub use cache::CacheVolumeResolver;
pub use context::{ExecContext, HostEnv};
pub use lifecycle::{ContainerGuard, StageDriver};
pub use script::{render_script, script_archive};
