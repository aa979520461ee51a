//! Building blocks with no knowledge of projects or servers.

pub mod command;
pub mod shell;
pub(crate) mod template;
pub mod validation;
