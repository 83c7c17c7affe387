//! Background screening of uploaded documents.
//!
//! Uploads land in a Redis-backed queue; the worker screens each one and
//! applies the decision through [`crate::db::moderation`].

pub mod queue;
pub mod screen;
pub mod worker;

pub use queue::{ModerationJob, ModerationQueue};
pub use screen::{Screener, Submission, Verdict};
pub use worker::ModerationWorker;
