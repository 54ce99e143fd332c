//! Persistence layer: Chat Message Store (§4.C) and Session Store (§4.D).

pub mod messages;
pub mod sessions;

pub use messages::{ChatMessageStore, FilesystemMessageStore, InMemoryMessageStore};
pub use sessions::{FilesystemSessionStore, InMemorySessionStore, Session, SessionStore};
