//! Durable storage for qwengate: credentials, provider catalog, settings.
//!
//! A single SQLite-backed [`Store`]; tests run against `sqlite::memory:`.

pub mod sqlite;

pub use sqlite::Store;
