// Library surface for the typing-session measurement engine.
// Embedding layers (UI, audio) live outside this crate.
pub mod aggregate;
pub mod event;
pub mod export;
pub mod record;
pub mod runtime;
pub mod schedule;
pub mod scoring;
pub mod session;
pub mod store;
pub mod util;

pub use record::SessionRecord;
pub use scoring::{SessionConfig, VariantId};
pub use session::{Phase, Session, SessionError};
pub use store::{MemoryStore, SessionStore, SqliteStore};
