pub mod cloud;
pub mod context;
pub mod defaults;
pub mod error;
pub mod executor;
pub mod git;
pub mod mongodb;
pub mod nginx;
pub mod output;
pub mod project;
pub mod provision;
pub mod python;
pub mod release;
pub mod server;
pub mod ssh;
pub mod system;

// Record storage stays behind the project and server modules.
pub(crate) mod config;
pub(crate) mod local_files;
pub(crate) mod paths;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, ErrorCode, Result};
pub use output::{BatchResult, CreateOutput, CreateResult, ItemStatus, MergeOutput, MergeResult};
