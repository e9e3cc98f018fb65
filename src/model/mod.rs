//! Core data model.
//!
//! A work item is a display name that needs bootstrapping. It carries a
//! forward-only status; each processing attempt produces one
//! [`ProcessingResult`].

pub mod result;
pub mod slug;
pub mod work;

pub use result::{Outcome, ProcessingResult};
pub use slug::{SLUG_MAX_LEN, derive_slug};
pub use work::{Status, WorkId, WorkItem};
