//! Data models for Examda

mod exam;
mod notification;
mod profile;

pub use exam::{
    ExamDraft, ExamPatch, ExamRef, ExamView, ExamWindow, FieldPatch, LocalExam, LocalExamId,
    RemoteExamId, ServerStamps, SyncState,
};
pub use notification::{NewSchedule, NotificationSchedule, NotifierHandle};
pub use profile::{CachedUserProfile, InventoryItem, ShopItem, UserProfile};
