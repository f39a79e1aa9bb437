//! Circulation Store
//!
//! Persistence contract for the circulation core. Every state change goes
//! through a conditional update (CAS on the expected status) or a
//! unique-constraint-backed insert, so a losing concurrent writer sees
//! `Ok(false)` / `Ok(None)` or a domain error instead of corrupting state.
//!
//! Compound `commit_*` operations are atomic: the memory store applies them
//! under one lock, the PostgreSQL store inside one transaction.

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::CirculationError;
use super::state::{BookStatus, RequestStatus, ThreadStatus};
use super::types::{
    Book, BookId, BookRequest, HandoverMessage, HandoverThread, HistoryId, ReadingHistory,
    RequestId, ThreadId, UserId,
};

pub type StoreResult<T> = Result<T, CirculationError>;

/// How a status update treats `current_holder_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderUpdate {
    Keep,
    Set(UserId),
    Clear,
}

/// Approval of a pending request
#[derive(Debug, Clone)]
pub struct ApprovalCommit {
    pub request_id: RequestId,
    pub book_id: BookId,
    /// Refused if this member holds the book when the commit applies
    pub requester: UserId,
    pub processed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Book status observed while preparing the commit
    pub expected_status: BookStatus,
    /// Reactive path: book moves to `Requested` and this thread is opened.
    /// `None` queues the approval behind the current reader.
    pub handover: Option<(HandoverThread, HandoverMessage)>,
}

/// Result of a successful approval commit
#[derive(Debug, Clone, Default)]
pub struct ApprovalOutcome {
    /// Other pending requests for the book, rejected in the same commit
    pub rejected: Vec<BookRequest>,
}

/// Physical receipt confirmed by the incoming holder
#[derive(Debug, Clone)]
pub struct DeliveryCommit {
    pub book_id: BookId,
    pub thread_id: ThreadId,
    /// `Requested` for the first reader, `Reading` for reader-to-reader
    pub expected_status: BookStatus,
    /// Outgoing reader's entry, marked delivered and closed
    pub previous: Option<HistoryId>,
    pub next: ReadingHistory,
    pub delivered_at: DateTime<Utc>,
    pub message: HandoverMessage,
}

/// What happens to the reading entry when the reader finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A successor is queued: entry stays open, delivery goes in transit
    InTransit,
    /// No successor: entry closes and the book goes on hold with the reader
    Hold,
}

#[derive(Debug, Clone)]
pub struct CompletionCommit {
    pub history_id: HistoryId,
    pub book_id: BookId,
    pub completed_at: DateTime<Utc>,
    pub outcome: CompletionOutcome,
}

/// A participant abandons an active handover thread
#[derive(Debug, Clone)]
pub struct CancellationCommit {
    pub thread_id: ThreadId,
    pub book_id: BookId,
    pub cancelled_at: DateTime<Utc>,
    pub message: HandoverMessage,
}

/// What the cancelled thread released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// Initial handover: book back to `Available`, holder cleared
    Released,
    /// Relay already in transit: successor unpaired, the outgoing reader's
    /// entry closes and the book goes on hold with them
    Unpaired,
    /// Thread opened ahead of completion: the reader keeps the book and the
    /// queued successor
    Detached,
}

/// Permanent return of a book to the library shelf
#[derive(Debug, Clone)]
pub struct ReturnCommit {
    pub history_id: HistoryId,
    pub book_id: BookId,
    pub reader_id: UserId,
    pub returned_at: DateTime<Utc>,
}

#[async_trait]
pub trait CirculationStore: Send + Sync {
    // === Books ===

    async fn insert_book(&self, book: &Book) -> StoreResult<()>;

    async fn get_book(&self, book_id: BookId) -> StoreResult<Option<Book>>;

    /// CAS: update status (and holder, atomically) only if the current status is `expected`
    async fn update_book_status_if(
        &self,
        book_id: BookId,
        expected: BookStatus,
        new_status: BookStatus,
        holder: HolderUpdate,
    ) -> StoreResult<bool>;

    async fn books_on_hold_for(&self, user_id: UserId) -> StoreResult<Vec<Book>>;

    // === Member counters ===

    async fn increment_books_received(&self, user_id: UserId) -> StoreResult<()>;

    async fn books_received(&self, user_id: UserId) -> StoreResult<u32>;

    // === Requests ===

    /// Fails with `AlreadyRequested` if a pending request exists for (book, user)
    async fn insert_request(&self, request: &BookRequest) -> StoreResult<()>;

    async fn get_request(&self, request_id: RequestId) -> StoreResult<Option<BookRequest>>;

    async fn find_pending_request(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> StoreResult<Option<BookRequest>>;

    /// Returns false if there was no pending request to delete
    async fn delete_pending_request(&self, book_id: BookId, user_id: UserId)
    -> StoreResult<bool>;

    /// CAS: `pending -> new_status`
    async fn resolve_request_if_pending(
        &self,
        request_id: RequestId,
        new_status: RequestStatus,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Ordered by priority desc, then requested_at asc
    async fn requests_for_book(
        &self,
        book_id: BookId,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<BookRequest>>;

    async fn requests_for_user(&self, user_id: UserId) -> StoreResult<Vec<BookRequest>>;

    /// Pending requests across all books, oldest first
    async fn pending_requests(&self, limit: usize, offset: usize)
    -> StoreResult<Vec<BookRequest>>;

    async fn latest_approved_request(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> StoreResult<Option<BookRequest>>;

    /// Top-ranked approved request not yet fulfilled by a reading history,
    /// ignoring requests of `current_reader`
    async fn next_approved_request(
        &self,
        book_id: BookId,
        current_reader: UserId,
    ) -> StoreResult<Option<BookRequest>>;

    // === Reading history ===

    /// Fails with `InvalidState` if the book already has an active entry
    async fn insert_history(&self, history: &ReadingHistory) -> StoreResult<()>;

    async fn get_history(&self, history_id: HistoryId) -> StoreResult<Option<ReadingHistory>>;

    async fn active_history(&self, book_id: BookId) -> StoreResult<Option<ReadingHistory>>;

    /// Most recent completed entry by `completed_at`
    async fn last_completed_history(&self, book_id: BookId)
    -> StoreResult<Option<ReadingHistory>>;

    async fn completed_history_for_reader(
        &self,
        book_id: BookId,
        reader_id: UserId,
    ) -> StoreResult<Option<ReadingHistory>>;

    async fn histories_for_reader(&self, reader_id: UserId) -> StoreResult<Vec<ReadingHistory>>;

    /// CAS: set `end_date` only if still open
    async fn close_history_if_open(
        &self,
        history_id: HistoryId,
        end_date: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// CAS: set `is_completed` only if not yet completed
    async fn mark_history_completed_if(
        &self,
        history_id: HistoryId,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// CAS: set `next_reader_id` only if unset and the entry is still open
    async fn set_next_reader_if_unset(
        &self,
        history_id: HistoryId,
        next_reader_id: UserId,
    ) -> StoreResult<bool>;

    /// Active entries due in `[from, until]` with no successor queued
    async fn due_soon(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ReadingHistory>>;

    // === Handover threads ===

    /// Fails with `InvalidState` if the book already has an active thread
    async fn insert_thread(
        &self,
        thread: &HandoverThread,
        opening: Option<&HandoverMessage>,
    ) -> StoreResult<()>;

    async fn get_thread(&self, thread_id: ThreadId) -> StoreResult<Option<HandoverThread>>;

    async fn active_thread(&self, book_id: BookId) -> StoreResult<Option<HandoverThread>>;

    /// Newest first
    async fn threads_for_user(&self, user_id: UserId) -> StoreResult<Vec<HandoverThread>>;

    /// CAS: `active -> new_status`
    async fn close_thread_if_active(
        &self,
        thread_id: ThreadId,
        new_status: ThreadStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn append_message(&self, message: &HandoverMessage) -> StoreResult<()>;

    /// Oldest first
    async fn messages(&self, thread_id: ThreadId) -> StoreResult<Vec<HandoverMessage>>;

    // === Compound commits ===

    /// `None` if the request is no longer pending, the book status moved or
    /// the requester now holds the book
    async fn commit_approval(&self, commit: &ApprovalCommit)
    -> StoreResult<Option<ApprovalOutcome>>;

    /// False if the thread, book or outgoing entry no longer match
    async fn commit_delivery(&self, commit: &DeliveryCommit) -> StoreResult<bool>;

    /// False if the entry is closed, already completed, or (for `Hold`) the book is not `Reading`
    async fn commit_completion(&self, commit: &CompletionCommit) -> StoreResult<bool>;

    /// `None` if the thread is no longer active
    async fn commit_cancellation(
        &self,
        commit: &CancellationCommit,
    ) -> StoreResult<Option<CancellationOutcome>>;

    /// False if the caller no longer holds a `Reading` book or a handover is active
    async fn commit_return(&self, commit: &ReturnCommit) -> StoreResult<bool>;
}
