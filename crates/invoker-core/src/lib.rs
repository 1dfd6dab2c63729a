//! `invoker-core` — shared vocabulary for the invocation engine.
//!
//! Everything the dispatcher, the plugin registry and the job scheduler need
//! to agree on lives here: configuration, the failure taxonomy, the runtime
//! collaborator contract and the per-attempt [`context::InvocationContext`].

pub mod config;
pub mod context;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::{EngineConfig, Mode};
pub use context::{InvocationContext, Marker};
pub use error::{DomainError, InvocationError, Result};
pub use runtime::{Runtime, StaticRuntime};
pub use types::InvocationId;
