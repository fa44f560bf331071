// src/sync/mod.rs

pub mod cursor;
pub mod engine;
pub mod epoch;
pub mod extract;
pub mod session;

pub use cursor::Cursor;
pub use engine::{normalize_limit, SyncEngine, DEFAULT_PULL_LIMIT, MAX_PULL_LIMIT};
pub use epoch::{EpochController, WIPE_CONFIRMATION};
pub use session::SessionRegistry;
