//! Per-node routing engine for a small distance-vector overlay mesh.
//!
//! This crate is the core described by the system's specification: the
//! routing table and its invariants, the three-message-kind wire protocol,
//! the cooperating periodic tasks (listener, announcer, neighbor monitor,
//! table printer), and the concurrency discipline that serializes table
//! mutation. It has no process-level concerns — no argument parsing, no
//! logger initialization, no direct stdin reads — those live in the
//! `router-cli` binary crate that drives this library.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod table;
pub mod transport;

pub use config::Timing;
pub use engine::{Delivery, Engine, Handle, OperatorCommand};
pub use error::EngineError;
