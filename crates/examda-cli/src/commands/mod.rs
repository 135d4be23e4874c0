pub mod add;
pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod edit;
pub mod list;
pub mod profile;
pub mod sync;
