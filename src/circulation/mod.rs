//! Book Circulation
//!
//! Moves a single physical book between members: request, approval, handover,
//! reading, and on to the next reader.
//!
//! # State Machine
//!
//! ```text
//!                 approve                deliver
//! AVAILABLE ─────────────▶ REQUESTED ─────────────▶ READING ──┐ deliver
//!  │  ▲  ▲                  ▲     │                 │  │  ▲   │ (next reader)
//!  │  │  │                  │     └─cancel──▶ AVAILABLE │  └───┘
//!  │  │  └──────return──────┼───────────────────────────┘  │
//!  │  │                     │ approve                      │ complete
//!  ▼  │ release             │                              ▼ (no successor, or relay cancelled)
//! RESERVED                  └────────────────────────── ON_HOLD
//! ```
//!
//! # Invariants
//!
//! 1. **One holder**: `current_holder_id` is set iff the book is `reading` or `on_hold`
//! 2. **One timeline**: at most one open reading history per book
//! 3. **One negotiation**: at most one active handover thread per book
//! 4. **One ask**: at most one pending request per (book, member)
//! 5. **Commit first**: notifications and counters run after the state change
//!    and never undo it

pub mod adjudication;
pub mod desk;
pub mod effects;
pub mod error;
pub mod handover;
pub mod history;
pub mod priority;
pub mod requests;
pub mod scanner;
pub mod state;
pub mod store;
pub mod types;


// Re-exports for convenience
pub use adjudication::{AdminAdjudicator, Approval};
pub use desk::CirculationDesk;
pub use effects::{Notifier, ScoreHooks, Scorer, TracingNotifier};
pub use error::CirculationError;
pub use handover::HandoverCoordinator;
pub use history::ReadingHistoryLedger;
pub use priority::{PriorityInputs, PriorityModel, StubPriorityModel};
pub use requests::{RequestLedger, RequestPolicy};
pub use scanner::{DueSoonScanner, ScannerConfig};
pub use state::{BookStatus, DeliveryStatus, RequestStatus, ThreadStatus};
pub use store::{CirculationStore, MemoryStore, PgStore};
pub use types::{
    Book, BookId, BookRequest, HandoverMessage, HandoverThread, HistoryId, MessageId,
    ReadingHistory, RequestId, ThreadId, UserId,
};
