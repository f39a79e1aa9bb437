//! Book Relay - community library circulation
//!
//! A single physical copy of each book travels from member to member. This
//! crate owns the rules for who holds it, who gets it next and how the
//! handover between two members is negotiated.
//!
//! # Modules
//!
//! - [`core_types`] - Shared primitive types (UserId)
//! - [`circulation`] - Book state machine, request queue, reading history,
//!   handover threads, admin approval and the due-soon scanner
//! - [`config`] - YAML application configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`db`] - PostgreSQL connection pool
//! - [`app`] - Service wiring

// Core types - must be first!
pub mod core_types;

pub mod app;
pub mod circulation;
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use app::Library;
pub use circulation::{
    AdminAdjudicator, Book, BookId, BookStatus, CirculationDesk, CirculationError,
    CirculationStore, DueSoonScanner, HandoverCoordinator, MemoryStore, PgStore,
    ReadingHistoryLedger, RequestLedger, TracingNotifier,
};
pub use config::AppConfig;
pub use core_types::UserId;
