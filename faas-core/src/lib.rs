//! # Function Platform Core
//!
//! The upload-to-execution pipeline behind the function platform: a caller
//! uploads a zip of source code, the pipeline extracts it safely, detects
//! the handler and language, builds a Docker image for it, and later runs
//! that image on demand in a locked-down, resource-capped container.

mod archive;
mod config;
mod detect;
mod error;
mod image;
mod pipeline;
mod process;
mod recipe;
mod registry;
mod sandbox;
mod types;

pub use config::Config;
pub use error::Error;
pub use pipeline::{Execution, Pipeline};
pub use registry::{InMemoryRegistry, Registry};
pub use types::{unix_now, FunctionMetadata, HandlerDescriptor, Language};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
