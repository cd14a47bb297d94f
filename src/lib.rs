// src/lib.rs
pub mod config;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod finalize;
pub mod ingest;
pub mod period;
pub mod pipeline;
pub mod reshape;
pub mod rolling;
pub mod schema;
pub mod write;

pub use error::{ErrorKind, PipelineError};
pub use pipeline::{Pipeline, RunReport, Status};
