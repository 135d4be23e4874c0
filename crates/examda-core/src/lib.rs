//! examda-core - Offline-first sync core for Examda
//!
//! Exams live in a local libSQL store and are reconciled with the Examda API
//! whenever the device is online. Reminders are derived from the local copy.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod reminders;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{ExamDraft, ExamPatch, ExamRef, ExamView, ExamWindow};
pub use services::{ExamService, LocalStore, ProfileService};
