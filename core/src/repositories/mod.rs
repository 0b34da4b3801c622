pub mod atomic;
pub mod mock;
pub mod session_store;

pub use atomic::{Atomic, AtomicRunner};
pub use mock::MockSessionStore;
pub use session_store::SessionStore;
