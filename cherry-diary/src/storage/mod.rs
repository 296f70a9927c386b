//! Storage module
//!
//! File-backed persistence: atomic writes, the JSON record store,
//! attachment files and typed preference files.

pub mod atomic;
pub mod attachments;
pub mod prefs;
pub mod record_store;

pub use atomic::write_atomic;
pub use attachments::{AttachmentKind, AttachmentStore};
pub use prefs::PrefsFile;
pub use record_store::{FieldUpdate, FieldUpdates, RecordHandle, RecordStore, StoredDocument};
