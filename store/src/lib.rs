//! # Storage Layer
//!
//! Reference `SessionStore` backends for the session core.
//!
//! ## Backends
//!
//! - **SQLite** ([`SqliteSessionStore`]): the transactional family. Compound
//!   operations run inside short transactions, and busy/locked failures are
//!   surfaced as retryable conflicts for the core's atomic runner.
//! - **In-memory** ([`MemorySessionStore`]): the optimistic family. Rows
//!   carry a generation counter and conditional writes compare-and-swap,
//!   the way a copy-on-write document store behaves.
//!
//! Both backends satisfy the same contract; the session core never branches
//! on which one it is talking to.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
