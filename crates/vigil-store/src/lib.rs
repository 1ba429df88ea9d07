//! vigil-store — SQLite persistence for the verification service.
//!
//! One database, three concerns: stored face references (soft-deleted via
//! an `active` flag, with the representation kind tagged explicitly in the
//! schema), the verification audit log, and the admin alert queue.

mod store;

pub use store::{AdminAlert, AuditEntry, Store, StoreError};
