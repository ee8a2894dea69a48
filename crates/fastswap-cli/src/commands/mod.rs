//! CLI command implementations

pub mod init;
pub mod list;
pub mod pack;
pub mod run;
