//! Database layer for Examda

mod connection;
mod exam_repository;
mod metadata_repository;
mod migrations;
mod profile_repository;
mod schedule_repository;

pub use connection::Database;
pub use exam_repository::{ExamRepository, LibSqlExamRepository};
pub use metadata_repository::{LibSqlMetadataRepository, MetadataRepository};
pub use profile_repository::{LibSqlProfileRepository, ProfileRepository};
pub use schedule_repository::{LibSqlScheduleRepository, ScheduleRepository};
