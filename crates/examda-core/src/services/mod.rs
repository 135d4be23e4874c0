//! Application-facing services built on the local store.

mod exams;
mod local_store;
mod profile;

pub use exams::ExamService;
pub use local_store::LocalStore;
pub use profile::{ProfileService, ProfileSnapshot, ProfileSource, MIN_PASSWORD_LEN};
