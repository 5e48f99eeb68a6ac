//! Collaborator traits the engines depend on.
//!
//! Every engine receives its collaborators as `Arc<dyn Trait>` so tests can
//! substitute in-memory fakes and production can wire real services.

pub mod clock;
pub mod completion;
pub mod email;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{CompletionProvider, GenerateParams};
pub use email::EmailSender;
pub use store::{CollectionStore, Prunable};
