//! In-memory circulation store
//!
//! All tables sit behind one mutex, so every method (including the compound
//! commits) observes and mutates a consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::{Mutex, MutexGuard};

use super::{
    ApprovalCommit, ApprovalOutcome, CancellationCommit, CancellationOutcome, CirculationStore,
    CompletionCommit, CompletionOutcome, DeliveryCommit, HolderUpdate, ReturnCommit, StoreResult,
};
use crate::circulation::error::CirculationError;
use crate::circulation::priority::compare_rank;
use crate::circulation::state::{BookStatus, DeliveryStatus, RequestStatus, ThreadStatus};
use crate::circulation::types::{
    Book, BookId, BookRequest, HandoverMessage, HandoverThread, HistoryId, ReadingHistory,
    RequestId, ThreadId, UserId,
};

#[derive(Default)]
struct Tables {
    books: FxHashMap<BookId, Book>,
    books_received: FxHashMap<UserId, u32>,
    requests: FxHashMap<RequestId, BookRequest>,
    histories: FxHashMap<HistoryId, ReadingHistory>,
    threads: FxHashMap<ThreadId, HandoverThread>,
    /// Append order is creation order
    messages: Vec<HandoverMessage>,
}

impl Tables {
    fn active_history(&self, book_id: BookId) -> Option<&ReadingHistory> {
        self.histories
            .values()
            .find(|h| h.book_id == book_id && h.is_active())
    }

    fn active_thread(&self, book_id: BookId) -> Option<&HandoverThread> {
        self.threads
            .values()
            .find(|t| t.book_id == book_id && t.status == ThreadStatus::Active)
    }

    fn has_pending(&self, book_id: BookId, user_id: UserId) -> bool {
        self.requests.values().any(|r| {
            r.book_id == book_id && r.user_id == user_id && r.status == RequestStatus::Pending
        })
    }

    fn is_fulfilled(&self, request: &BookRequest) -> bool {
        let Some(processed_at) = request.processed_at else {
            return false;
        };
        self.histories.values().any(|h| {
            h.book_id == request.book_id
                && h.reader_id == request.user_id
                && h.start_date >= processed_at
        })
    }

    fn set_book_status(&mut self, book_id: BookId, status: BookStatus, holder: HolderUpdate) {
        if let Some(book) = self.books.get_mut(&book_id) {
            book.status = status;
            match holder {
                HolderUpdate::Keep => {}
                HolderUpdate::Set(user_id) => book.current_holder_id = Some(user_id),
                HolderUpdate::Clear => book.current_holder_id = None,
            }
            book.updated_at = Utc::now();
        }
    }

    fn book_status(&self, book_id: BookId) -> Option<BookStatus> {
        self.books.get(&book_id).map(|b| b.status)
    }
}

/// Mutex-guarded tables with the same semantics as `PgStore`
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| CirculationError::SystemError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CirculationStore for MemoryStore {
    async fn insert_book(&self, book: &Book) -> StoreResult<()> {
        let mut t = self.tables()?;
        if t.books.contains_key(&book.id) {
            return Err(CirculationError::InvalidState(format!(
                "book {} already exists",
                book.id
            )));
        }
        t.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn get_book(&self, book_id: BookId) -> StoreResult<Option<Book>> {
        Ok(self.tables()?.books.get(&book_id).cloned())
    }

    async fn update_book_status_if(
        &self,
        book_id: BookId,
        expected: BookStatus,
        new_status: BookStatus,
        holder: HolderUpdate,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        if t.book_status(book_id) != Some(expected) {
            return Ok(false);
        }
        t.set_book_status(book_id, new_status, holder);
        Ok(true)
    }

    async fn books_on_hold_for(&self, user_id: UserId) -> StoreResult<Vec<Book>> {
        let t = self.tables()?;
        let mut books: Vec<Book> = t
            .books
            .values()
            .filter(|b| b.status == BookStatus::OnHold && b.current_holder_id == Some(user_id))
            .cloned()
            .collect();
        books.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(books)
    }

    async fn increment_books_received(&self, user_id: UserId) -> StoreResult<()> {
        *self.tables()?.books_received.entry(user_id).or_insert(0) += 1;
        Ok(())
    }

    async fn books_received(&self, user_id: UserId) -> StoreResult<u32> {
        Ok(self
            .tables()?
            .books_received
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn insert_request(&self, request: &BookRequest) -> StoreResult<()> {
        let mut t = self.tables()?;
        if request.status == RequestStatus::Pending
            && t.has_pending(request.book_id, request.user_id)
        {
            return Err(CirculationError::AlreadyRequested);
        }
        t.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, request_id: RequestId) -> StoreResult<Option<BookRequest>> {
        Ok(self.tables()?.requests.get(&request_id).cloned())
    }

    async fn find_pending_request(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> StoreResult<Option<BookRequest>> {
        Ok(self
            .tables()?
            .requests
            .values()
            .find(|r| {
                r.book_id == book_id && r.user_id == user_id && r.status == RequestStatus::Pending
            })
            .cloned())
    }

    async fn delete_pending_request(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        let before = t.requests.len();
        t.requests.retain(|_, r| {
            !(r.book_id == book_id && r.user_id == user_id && r.status == RequestStatus::Pending)
        });
        Ok(t.requests.len() < before)
    }

    async fn resolve_request_if_pending(
        &self,
        request_id: RequestId,
        new_status: RequestStatus,
        processed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        match t.requests.get_mut(&request_id) {
            Some(r) if r.status == RequestStatus::Pending => {
                r.status = new_status;
                r.processed_at = Some(processed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requests_for_book(
        &self,
        book_id: BookId,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<BookRequest>> {
        let t = self.tables()?;
        let mut requests: Vec<BookRequest> = t
            .requests
            .values()
            .filter(|r| r.book_id == book_id && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(compare_rank);
        Ok(requests)
    }

    async fn requests_for_user(&self, user_id: UserId) -> StoreResult<Vec<BookRequest>> {
        let t = self.tables()?;
        let mut requests: Vec<BookRequest> = t
            .requests
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    async fn pending_requests(
        &self,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<BookRequest>> {
        let t = self.tables()?;
        let mut requests: Vec<BookRequest> = t
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));
        Ok(requests.into_iter().skip(offset).take(limit).collect())
    }

    async fn latest_approved_request(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> StoreResult<Option<BookRequest>> {
        let t = self.tables()?;
        Ok(t.requests
            .values()
            .filter(|r| {
                r.book_id == book_id && r.user_id == user_id && r.status == RequestStatus::Approved
            })
            .max_by_key(|r| r.processed_at)
            .cloned())
    }

    async fn next_approved_request(
        &self,
        book_id: BookId,
        current_reader: UserId,
    ) -> StoreResult<Option<BookRequest>> {
        let t = self.tables()?;
        let mut candidates: Vec<&BookRequest> = t
            .requests
            .values()
            .filter(|r| {
                r.book_id == book_id
                    && r.status == RequestStatus::Approved
                    && r.user_id != current_reader
                    && !t.is_fulfilled(r)
            })
            .collect();
        candidates.sort_by(|a, b| compare_rank(a, b));
        Ok(candidates.first().map(|r| (*r).clone()))
    }

    async fn insert_history(&self, history: &ReadingHistory) -> StoreResult<()> {
        let mut t = self.tables()?;
        if history.is_active() && t.active_history(history.book_id).is_some() {
            return Err(CirculationError::InvalidState(format!(
                "book {} already has an active reading history",
                history.book_id
            )));
        }
        t.histories.insert(history.id, history.clone());
        Ok(())
    }

    async fn get_history(&self, history_id: HistoryId) -> StoreResult<Option<ReadingHistory>> {
        Ok(self.tables()?.histories.get(&history_id).cloned())
    }

    async fn active_history(&self, book_id: BookId) -> StoreResult<Option<ReadingHistory>> {
        Ok(self.tables()?.active_history(book_id).cloned())
    }

    async fn last_completed_history(
        &self,
        book_id: BookId,
    ) -> StoreResult<Option<ReadingHistory>> {
        let t = self.tables()?;
        Ok(t.histories
            .values()
            .filter(|h| h.book_id == book_id && h.is_completed)
            .max_by_key(|h| (h.completed_at, h.start_date))
            .cloned())
    }

    async fn completed_history_for_reader(
        &self,
        book_id: BookId,
        reader_id: UserId,
    ) -> StoreResult<Option<ReadingHistory>> {
        let t = self.tables()?;
        Ok(t.histories
            .values()
            .filter(|h| h.book_id == book_id && h.reader_id == reader_id && h.is_completed)
            .max_by_key(|h| h.completed_at)
            .cloned())
    }

    async fn histories_for_reader(&self, reader_id: UserId) -> StoreResult<Vec<ReadingHistory>> {
        let t = self.tables()?;
        let mut histories: Vec<ReadingHistory> = t
            .histories
            .values()
            .filter(|h| h.reader_id == reader_id)
            .cloned()
            .collect();
        histories.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(histories)
    }

    async fn close_history_if_open(
        &self,
        history_id: HistoryId,
        end_date: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        match t.histories.get_mut(&history_id) {
            Some(h) if h.is_active() => {
                h.end_date = Some(end_date);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_history_completed_if(
        &self,
        history_id: HistoryId,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        match t.histories.get_mut(&history_id) {
            Some(h) if !h.is_completed => {
                h.is_completed = true;
                h.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_next_reader_if_unset(
        &self,
        history_id: HistoryId,
        next_reader_id: UserId,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        match t.histories.get_mut(&history_id) {
            Some(h) if h.is_active() && h.next_reader_id.is_none() => {
                h.next_reader_id = Some(next_reader_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_soon(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<ReadingHistory>> {
        let t = self.tables()?;
        let mut histories: Vec<ReadingHistory> = t
            .histories
            .values()
            .filter(|h| {
                h.is_active()
                    && h.next_reader_id.is_none()
                    && h.due_date.is_some_and(|due| due >= from && due <= until)
            })
            .cloned()
            .collect();
        histories.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        histories.truncate(limit);
        Ok(histories)
    }

    async fn insert_thread(
        &self,
        thread: &HandoverThread,
        opening: Option<&HandoverMessage>,
    ) -> StoreResult<()> {
        let mut t = self.tables()?;
        if thread.status == ThreadStatus::Active && t.active_thread(thread.book_id).is_some() {
            return Err(CirculationError::InvalidState(format!(
                "book {} already has an active handover thread",
                thread.book_id
            )));
        }
        t.threads.insert(thread.id, thread.clone());
        if let Some(message) = opening {
            t.messages.push(message.clone());
        }
        Ok(())
    }

    async fn get_thread(&self, thread_id: ThreadId) -> StoreResult<Option<HandoverThread>> {
        Ok(self.tables()?.threads.get(&thread_id).cloned())
    }

    async fn active_thread(&self, book_id: BookId) -> StoreResult<Option<HandoverThread>> {
        Ok(self.tables()?.active_thread(book_id).cloned())
    }

    async fn threads_for_user(&self, user_id: UserId) -> StoreResult<Vec<HandoverThread>> {
        let t = self.tables()?;
        let mut threads: Vec<HandoverThread> = t
            .threads
            .values()
            .filter(|th| th.is_participant(user_id))
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    async fn close_thread_if_active(
        &self,
        thread_id: ThreadId,
        new_status: ThreadStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.tables()?;
        match t.threads.get_mut(&thread_id) {
            Some(th) if th.status == ThreadStatus::Active => {
                th.status = new_status;
                th.completed_at = Some(at);
                th.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_message(&self, message: &HandoverMessage) -> StoreResult<()> {
        let mut t = self.tables()?;
        if !t.threads.contains_key(&message.thread_id) {
            return Err(CirculationError::ThreadNotFound(message.thread_id.to_string()));
        }
        t.messages.push(message.clone());
        Ok(())
    }

    async fn messages(&self, thread_id: ThreadId) -> StoreResult<Vec<HandoverMessage>> {
        Ok(self
            .tables()?
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect())
    }

    async fn commit_approval(
        &self,
        commit: &ApprovalCommit,
    ) -> StoreResult<Option<ApprovalOutcome>> {
        let mut t = self.tables()?;

        let still_pending = t.requests.get(&commit.request_id).is_some_and(|r| {
            r.status == RequestStatus::Pending && r.book_id == commit.book_id
        });
        if !still_pending || t.book_status(commit.book_id) != Some(commit.expected_status) {
            return Ok(None);
        }
        let requester_holds = t
            .books
            .get(&commit.book_id)
            .is_some_and(|b| b.current_holder_id == Some(commit.requester));
        if requester_holds {
            return Ok(None);
        }
        if commit.handover.is_some() && t.active_thread(commit.book_id).is_some() {
            return Err(CirculationError::InvalidState(format!(
                "book {} already has an active handover thread",
                commit.book_id
            )));
        }

        let mut outcome = ApprovalOutcome::default();
        for r in t.requests.values_mut() {
            if r.book_id != commit.book_id || r.status != RequestStatus::Pending {
                continue;
            }
            r.processed_at = Some(commit.processed_at);
            if r.id == commit.request_id {
                r.status = RequestStatus::Approved;
                r.due_date = Some(commit.due_date);
            } else {
                r.status = RequestStatus::Rejected;
                outcome.rejected.push(r.clone());
            }
        }

        if let Some((thread, message)) = &commit.handover {
            t.set_book_status(commit.book_id, BookStatus::Requested, HolderUpdate::Clear);
            t.threads.insert(thread.id, thread.clone());
            t.messages.push(message.clone());
        }

        Ok(Some(outcome))
    }

    async fn commit_delivery(&self, commit: &DeliveryCommit) -> StoreResult<bool> {
        let mut t = self.tables()?;

        let thread_ok = t.threads.get(&commit.thread_id).is_some_and(|th| {
            th.status == ThreadStatus::Active && th.book_id == commit.book_id
        });
        if !thread_ok || t.book_status(commit.book_id) != Some(commit.expected_status) {
            return Ok(false);
        }
        match commit.previous {
            Some(previous) => {
                let previous_ok = t.histories.get(&previous).is_some_and(|h| {
                    h.is_active() && h.delivery_status != DeliveryStatus::Delivered
                });
                if !previous_ok {
                    return Ok(false);
                }
            }
            None => {
                if t.active_history(commit.book_id).is_some() {
                    return Ok(false);
                }
            }
        }

        if let Some(h) = commit.previous.and_then(|id| t.histories.get_mut(&id)) {
            h.delivery_status = DeliveryStatus::Delivered;
            h.delivered_at = Some(commit.delivered_at);
            h.end_date = Some(commit.delivered_at);
        }
        t.histories.insert(commit.next.id, commit.next.clone());
        t.set_book_status(
            commit.book_id,
            BookStatus::Reading,
            HolderUpdate::Set(commit.next.reader_id),
        );
        if let Some(th) = t.threads.get_mut(&commit.thread_id) {
            th.status = ThreadStatus::Completed;
            th.completed_at = Some(commit.delivered_at);
            th.updated_at = commit.delivered_at;
        }
        t.messages.push(commit.message.clone());
        Ok(true)
    }

    async fn commit_completion(&self, commit: &CompletionCommit) -> StoreResult<bool> {
        let mut t = self.tables()?;

        let Some(reader_id) = t
            .histories
            .get(&commit.history_id)
            .filter(|h| h.is_active() && !h.is_completed && h.book_id == commit.book_id)
            .map(|h| h.reader_id)
        else {
            return Ok(false);
        };
        if commit.outcome == CompletionOutcome::Hold
            && t.book_status(commit.book_id) != Some(BookStatus::Reading)
        {
            return Ok(false);
        }

        if let Some(h) = t.histories.get_mut(&commit.history_id) {
            h.is_completed = true;
            h.completed_at = Some(commit.completed_at);
            match commit.outcome {
                CompletionOutcome::InTransit => h.delivery_status = DeliveryStatus::InTransit,
                CompletionOutcome::Hold => h.end_date = Some(commit.completed_at),
            }
        }
        if commit.outcome == CompletionOutcome::Hold {
            t.set_book_status(commit.book_id, BookStatus::OnHold, HolderUpdate::Set(reader_id));
        }
        Ok(true)
    }

    async fn commit_cancellation(
        &self,
        commit: &CancellationCommit,
    ) -> StoreResult<Option<CancellationOutcome>> {
        let mut t = self.tables()?;

        let Some(history_id) = t
            .threads
            .get(&commit.thread_id)
            .filter(|th| th.status == ThreadStatus::Active && th.book_id == commit.book_id)
            .map(|th| th.reading_history_id)
        else {
            return Ok(None);
        };
        let in_transit = history_id
            .and_then(|id| t.histories.get(&id))
            .filter(|h| h.is_active() && h.delivery_status == DeliveryStatus::InTransit)
            .map(|h| (h.id, h.reader_id));

        let outcome = match (t.book_status(commit.book_id), in_transit) {
            (Some(BookStatus::Requested), _) => {
                t.set_book_status(commit.book_id, BookStatus::Available, HolderUpdate::Clear);
                CancellationOutcome::Released
            }
            (Some(BookStatus::Reading), Some((history_id, reader_id))) => {
                if let Some(h) = t.histories.get_mut(&history_id) {
                    h.next_reader_id = None;
                    h.delivery_status = DeliveryStatus::NotStarted;
                    h.end_date = Some(commit.cancelled_at);
                }
                t.set_book_status(commit.book_id, BookStatus::OnHold, HolderUpdate::Set(reader_id));
                CancellationOutcome::Unpaired
            }
            _ => CancellationOutcome::Detached,
        };

        if let Some(th) = t.threads.get_mut(&commit.thread_id) {
            th.status = ThreadStatus::Cancelled;
            th.completed_at = Some(commit.cancelled_at);
            th.updated_at = commit.cancelled_at;
        }
        t.messages.push(commit.message.clone());
        Ok(Some(outcome))
    }

    async fn commit_return(&self, commit: &ReturnCommit) -> StoreResult<bool> {
        let mut t = self.tables()?;

        let holds_book = t.books.get(&commit.book_id).is_some_and(|b| {
            b.status == BookStatus::Reading && b.current_holder_id == Some(commit.reader_id)
        });
        let history_ok = t
            .histories
            .get(&commit.history_id)
            .is_some_and(|h| h.is_active() && h.reader_id == commit.reader_id);
        if !holds_book || !history_ok || t.active_thread(commit.book_id).is_some() {
            return Ok(false);
        }

        if let Some(h) = t.histories.get_mut(&commit.history_id) {
            if !h.is_completed {
                h.is_completed = true;
                h.completed_at = Some(commit.returned_at);
            }
            h.end_date = Some(commit.returned_at);
        }
        t.set_book_status(commit.book_id, BookStatus::Available, HolderUpdate::Clear);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_single_pending_request_per_pair() {
        let store = MemoryStore::new();
        let book = Book::new("Dune", Some(1));
        store.insert_book(&book).await.unwrap();

        store
            .insert_request(&BookRequest::new(book.id, 2, 35.0))
            .await
            .unwrap();
        let dup = store.insert_request(&BookRequest::new(book.id, 2, 35.0)).await;
        assert!(matches!(dup, Err(CirculationError::AlreadyRequested)));

        // A different member is fine
        store
            .insert_request(&BookRequest::new(book.id, 3, 35.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_active_history_per_book() {
        let store = MemoryStore::new();
        let book_id = BookId::new();
        let first = ReadingHistory::new(book_id, 1, Utc::now(), None);
        store.insert_history(&first).await.unwrap();

        let second = ReadingHistory::new(book_id, 2, Utc::now(), None);
        let result = store.insert_history(&second).await;
        assert!(matches!(result, Err(CirculationError::InvalidState(_))));

        assert!(store.close_history_if_open(first.id, Utc::now()).await.unwrap());
        assert!(!store.close_history_if_open(first.id, Utc::now()).await.unwrap());
        store.insert_history(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_book_status_cas() {
        let store = MemoryStore::new();
        let book = Book::new("Dune", Some(1));
        store.insert_book(&book).await.unwrap();

        let moved = store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::Reserved,
                HolderUpdate::Keep,
            )
            .await
            .unwrap();
        assert!(moved);

        let lost = store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::Reserved,
                HolderUpdate::Keep,
            )
            .await
            .unwrap();
        assert!(!lost);
    }

    #[tokio::test]
    async fn test_approval_refused_while_requester_holds() {
        let store = MemoryStore::new();
        let book = Book::new("Dune", Some(1));
        store.insert_book(&book).await.unwrap();
        store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::Reading,
                HolderUpdate::Set(2),
            )
            .await
            .unwrap();
        let own = BookRequest::new(book.id, 2, 35.0);
        let other = BookRequest::new(book.id, 3, 35.0);
        store.insert_request(&own).await.unwrap();
        store.insert_request(&other).await.unwrap();

        let outcome = store
            .commit_approval(&ApprovalCommit {
                request_id: own.id,
                book_id: book.id,
                requester: 2,
                processed_at: Utc::now(),
                due_date: Utc::now() + Duration::days(7),
                expected_status: BookStatus::Reading,
                handover: None,
            })
            .await
            .unwrap();
        assert!(outcome.is_none());

        let other = store.get_request(other.id).await.unwrap().unwrap();
        assert_eq!(other.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_successor_only_on_open_entry() {
        let store = MemoryStore::new();
        let book = Book::new("Dune", Some(1));
        store.insert_book(&book).await.unwrap();

        let history = ReadingHistory::new(book.id, 2, Utc::now(), None);
        store.insert_history(&history).await.unwrap();
        assert!(store.close_history_if_open(history.id, Utc::now()).await.unwrap());

        assert!(!store.set_next_reader_if_unset(history.id, 3).await.unwrap());
        let stored = store.get_history(history.id).await.unwrap().unwrap();
        assert!(stored.next_reader_id.is_none());
    }

    #[tokio::test]
    async fn test_due_soon_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let inside = ReadingHistory::new(BookId::new(), 1, now, Some(now + Duration::days(3)));
        let outside = ReadingHistory::new(BookId::new(), 2, now, Some(now + Duration::days(30)));
        let overdue = ReadingHistory::new(BookId::new(), 3, now, Some(now - Duration::days(1)));
        let mut queued = ReadingHistory::new(BookId::new(), 4, now, Some(now + Duration::days(2)));
        queued.next_reader_id = Some(5);
        for h in [&inside, &outside, &overdue, &queued] {
            store.insert_history(h).await.unwrap();
        }

        let due = store
            .due_soon(now, now + Duration::days(7), 100)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, inside.id);
    }

    #[tokio::test]
    async fn test_last_completed_prefers_latest() {
        let store = MemoryStore::new();
        let book_id = BookId::new();
        let now = Utc::now();

        let mut older = ReadingHistory::new(book_id, 1, now - Duration::days(20), None);
        older.is_completed = true;
        older.completed_at = Some(now - Duration::days(10));
        older.end_date = older.completed_at;
        let mut newer = ReadingHistory::new(book_id, 2, now - Duration::days(9), None);
        newer.is_completed = true;
        newer.completed_at = Some(now - Duration::days(1));
        newer.end_date = newer.completed_at;
        store.insert_history(&older).await.unwrap();
        store.insert_history(&newer).await.unwrap();

        let last = store.last_completed_history(book_id).await.unwrap().unwrap();
        assert_eq!(last.reader_id, 2);
    }

    #[tokio::test]
    async fn test_next_approved_skips_fulfilled() {
        let store = MemoryStore::new();
        let book = Book::new("Dune", Some(1));
        store.insert_book(&book).await.unwrap();

        let mut fulfilled = BookRequest::new(book.id, 2, 90.0);
        fulfilled.status = RequestStatus::Approved;
        fulfilled.processed_at = Some(Utc::now() - Duration::days(5));
        let mut waiting = BookRequest::new(book.id, 3, 10.0);
        waiting.status = RequestStatus::Approved;
        waiting.processed_at = Some(Utc::now() - Duration::days(1));
        store.insert_request(&fulfilled).await.unwrap();
        store.insert_request(&waiting).await.unwrap();

        // Member 2 already started reading after approval
        let reading = ReadingHistory::new(book.id, 2, Utc::now() - Duration::days(4), None);
        store.insert_history(&reading).await.unwrap();

        let next = store.next_approved_request(book.id, 2).await.unwrap().unwrap();
        assert_eq!(next.user_id, 3);
    }

    #[tokio::test]
    async fn test_messages_keep_append_order() {
        let store = MemoryStore::new();
        let thread = HandoverThread::new(BookId::new(), 1, 2, Utc::now());
        let opening = HandoverMessage::system(thread.id, 1, "opened");
        store.insert_thread(&thread, Some(&opening)).await.unwrap();
        store
            .append_message(&HandoverMessage::user(thread.id, 2, "tomorrow at 6?"))
            .await
            .unwrap();
        store
            .append_message(&HandoverMessage::user(thread.id, 1, "works"))
            .await
            .unwrap();

        let log: Vec<_> = store
            .messages(thread.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(log, vec!["opened", "tomorrow at 6?", "works"]);
    }
}
