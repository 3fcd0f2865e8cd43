//! Startup-time settings resolution.
//!
//! Three layers, later wins: compiled defaults ← `QWENGATE_*` environment
//! variables (figment) ← rows of the durable `settings` table. Resolution
//! happens once at startup; the result lives in an `ArcSwap` snapshot.

pub mod schema;

pub use schema::{LoggingSettings, Settings};
