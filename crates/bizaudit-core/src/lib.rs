//! # BizAudit Core
//!
//! Shared building blocks for the BizAudit automation crates:
//! configuration, the error taxonomy, and the collaborator traits
//! (text completion, collection store, clock, email sender) that the
//! task, workflow, scheduler and nurturing engines are written against.

pub mod config;
pub mod error;
pub mod template;
pub mod traits;
pub mod types;

pub use config::BizAuditConfig;
pub use error::{BizAuditError, Result};
