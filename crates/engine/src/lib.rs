//! Zone capture and progression engine.
//!
//! The engine owns three concerns: the per-zone ownership state machine
//! ([`capture`]), the per-user progression ledger ([`progression`]), and the
//! lock coordination that keeps both correct under concurrent player actions
//! ([`locks`]). Every mutating operation stages its writes into a single
//! [`store::WriteBatch`] and commits once, so a zone transition and the
//! reward cascade it triggers apply together or not at all.

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod logging;
pub mod model;
pub mod progression;
pub mod store;

pub use capture::{AttackResult, CaptureOutcome, CaptureResult, DefendResult, Engine};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use events::DomainEvent;
pub use store::Store;
