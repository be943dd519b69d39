//! hushpoll-daemon - the stateful half of the encrypted questionnaire
//! system.
//!
//! Everything here composes over the pure types in `hushpoll-core`:
//!
//! - [`store`]: SQLite persistence with optimistic per-questionnaire
//!   versioning
//! - [`gate`]: ballot admission control and lossless concurrent merging
//! - [`reveal`]: deadline-gated, exactly-once tally decryption
//! - [`sweeper`]: background auto-reveal of expired questionnaires
//! - [`service`]: the transport-agnostic facade an API layer calls into
//!
//! The binary in `main.rs` wires these together: it opens the store, runs a
//! health check, spawns the sweeper, and waits for a shutdown signal.

pub mod gate;
pub mod reveal;
pub mod service;
pub mod store;
pub mod sweeper;

pub use gate::SubmissionGate;
pub use reveal::ResultRevealer;
pub use service::{CreateRequest, CreatedQuestionnaire, QuestionnaireService, QuestionnaireView};
pub use store::SqliteStore;
pub use sweeper::{ExpirySweeper, SweeperHandle};
