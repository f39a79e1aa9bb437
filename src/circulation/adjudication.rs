//! Admin Adjudication
//!
//! Approval resolves one pending request and rejects every other pending
//! request for the same book in the same commit. Two paths:
//!
//! - reactive (`available` / `on_hold`): the book moves to `requested` and a
//!   handover thread opens between the physical holder and the requester
//! - queued (`reading`): only the requests change; the due-soon scanner or
//!   the reader's completion pairs the approved request later

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::effects::{Notifier, SideEffects};
use super::error::{CirculationError, not_found};
use super::handover::thread_created_message;
use super::state::{BookStatus, RequestStatus};
use super::store::{ApprovalCommit, CirculationStore};
use super::types::{Book, BookId, BookRequest, HandoverMessage, HandoverThread, RequestId, UserId};

/// Result of an approval
#[derive(Debug, Clone)]
pub struct Approval {
    pub request: BookRequest,
    /// Opened on the reactive path only
    pub thread: Option<HandoverThread>,
    /// Pending requests rejected by the cascade
    pub rejected: Vec<BookRequest>,
}

pub struct AdminAdjudicator {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn Notifier>,
}

impl AdminAdjudicator {
    pub fn new(store: Arc<dyn CirculationStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    async fn load_pending(&self, request_id: RequestId) -> Result<BookRequest, CirculationError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| not_found("request", request_id))?;
        if request.status.is_terminal() {
            return Err(CirculationError::InvalidState(format!(
                "request {request_id} is already {}",
                request.status
            )));
        }
        Ok(request)
    }

    /// Physical holder of a book nobody is reading
    async fn resolve_holder(&self, book: &Book) -> Result<UserId, CirculationError> {
        if let Some(last) = self.store.last_completed_history(book.id).await? {
            return Ok(last.reader_id);
        }
        book.created_by.ok_or(CirculationError::CannotDetermineHolder)
    }

    pub async fn approve(
        &self,
        request_id: RequestId,
        due_date: DateTime<Utc>,
    ) -> Result<Approval, CirculationError> {
        let request = self.load_pending(request_id).await?;
        let book = self
            .store
            .get_book(request.book_id)
            .await?
            .ok_or_else(|| not_found("book", request.book_id))?;

        let handover = match book.status {
            BookStatus::Available | BookStatus::OnHold => {
                let holder = self.resolve_holder(&book).await?;
                if holder == request.user_id {
                    return Err(CirculationError::InvalidState(
                        "requester already holds this book".to_string(),
                    ));
                }
                let thread = HandoverThread::new(book.id, holder, request.user_id, due_date);
                let message =
                    HandoverMessage::system(thread.id, holder, thread_created_message(due_date));
                Some((thread, message))
            }
            BookStatus::Reading => {
                if book.current_holder_id == Some(request.user_id) {
                    return Err(CirculationError::InvalidState(
                        "requester is currently reading this book".to_string(),
                    ));
                }
                None
            }
            BookStatus::Requested | BookStatus::Reserved => {
                return Err(CirculationError::InvalidState(format!(
                    "cannot approve a request while the book is {}",
                    book.status
                )));
            }
        };

        let now = Utc::now();
        let outcome = self
            .store
            .commit_approval(&ApprovalCommit {
                request_id,
                book_id: book.id,
                requester: request.user_id,
                processed_at: now,
                due_date,
                expected_status: book.status,
                handover: handover.clone(),
            })
            .await?
            .ok_or_else(|| {
                warn!(%request_id, book_id = %book.id, "Approval lost a concurrent race");
                CirculationError::InvalidState(
                    "request was processed concurrently or the book changed hands".to_string(),
                )
            })?;

        let thread = handover.map(|(thread, _)| thread);
        info!(
            %request_id,
            book_id = %book.id,
            user_id = request.user_id,
            queued = thread.is_none(),
            rejected = outcome.rejected.len(),
            "Request approved"
        );

        let mut effects = SideEffects::new();
        effects.push(
            "notify_request_approved",
            self.notifier
                .notify_request_approved(request.user_id, book.id, &book.title),
        );
        if let Some(thread) = &thread {
            effects.push(
                "notify_handover_thread_created",
                self.notifier.notify_handover_thread_created(
                    thread.current_holder_id,
                    thread.next_holder_id,
                    book.id,
                    &book.title,
                ),
            );
        }
        for loser in &outcome.rejected {
            effects.push(
                "notify_request_rejected",
                self.notifier
                    .notify_request_rejected(loser.user_id, book.id, &book.title),
            );
        }
        let store = &self.store;
        let requester = request.user_id;
        effects.push("increment_books_received", async move {
            store.increment_books_received(requester).await?;
            Ok(())
        });
        effects.run().await;

        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| not_found("request", request_id))?;
        Ok(Approval {
            request,
            thread,
            rejected: outcome.rejected,
        })
    }

    /// `pending -> rejected`. The reason is only logged.
    pub async fn reject(
        &self,
        request_id: RequestId,
        reason: &str,
    ) -> Result<BookRequest, CirculationError> {
        let request = self.load_pending(request_id).await?;
        if !self
            .store
            .resolve_request_if_pending(request_id, RequestStatus::Rejected, Utc::now())
            .await?
        {
            return Err(CirculationError::InvalidState(format!(
                "request {request_id} was processed concurrently"
            )));
        }
        info!(%request_id, book_id = %request.book_id, user_id = request.user_id, reason, "Request rejected");

        let title = self
            .store
            .get_book(request.book_id)
            .await?
            .map(|b| b.title)
            .unwrap_or_default();
        let mut effects = SideEffects::new();
        effects.push(
            "notify_request_rejected",
            self.notifier
                .notify_request_rejected(request.user_id, request.book_id, &title),
        );
        effects.run().await;

        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| not_found("request", request_id))
    }

    /// Admin queue across all books, oldest first
    pub async fn pending_requests(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookRequest>, CirculationError> {
        self.store.pending_requests(limit, offset).await
    }

    pub async fn requests_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BookRequest>, CirculationError> {
        self.store.requests_for_book(book_id, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::effects::mock::{Notification, RecordingNotifier};
    use crate::circulation::state::ThreadStatus;
    use crate::circulation::store::MemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        admin: AdminAdjudicator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let admin = AdminAdjudicator::new(store.clone(), notifier.clone());
        Fixture {
            store,
            notifier,
            admin,
        }
    }

    async fn book_with_requests(store: &MemoryStore, users: &[UserId]) -> (Book, Vec<BookRequest>) {
        let book = Book::new("Hyperion", Some(1));
        store.insert_book(&book).await.unwrap();
        let mut requests = Vec::new();
        for &user_id in users {
            let request = BookRequest::new(book.id, user_id, 35.0);
            store.insert_request(&request).await.unwrap();
            requests.push(request);
        }
        (book, requests)
    }

    #[tokio::test]
    async fn test_approve_available_opens_thread_and_cascades() {
        let f = fixture();
        let (book, requests) = book_with_requests(&f.store, &[2, 3, 4]).await;
        let due = Utc::now() + Duration::days(14);

        let approval = f.admin.approve(requests[0].id, due).await.unwrap();
        assert_eq!(approval.request.status, RequestStatus::Approved);
        assert_eq!(approval.request.due_date, Some(due));
        assert_eq!(approval.rejected.len(), 2);

        let thread = approval.thread.unwrap();
        assert_eq!(thread.current_holder_id, 1);
        assert_eq!(thread.next_holder_id, 2);
        assert_eq!(thread.status, ThreadStatus::Active);

        let stored = f.store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookStatus::Requested);
        assert!(stored.current_holder_id.is_none());

        for r in &requests[1..] {
            let loser = f.store.get_request(r.id).await.unwrap().unwrap();
            assert_eq!(loser.status, RequestStatus::Rejected);
        }

        let messages = f.store.messages(thread.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_system_message);

        assert_eq!(f.store.books_received(2).await.unwrap(), 1);
        assert_eq!(
            f.notifier
                .count(|n| matches!(n, Notification::RequestRejected { .. })),
            2
        );
        assert_eq!(
            f.notifier
                .count(|n| matches!(n, Notification::ThreadCreated { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_approve_on_hold_uses_last_reader() {
        let f = fixture();
        let (book, requests) = book_with_requests(&f.store, &[2]).await;

        // reader 5 finished and kept the book
        let mut finished =
            crate::circulation::types::ReadingHistory::new(book.id, 5, Utc::now(), None);
        finished.is_completed = true;
        finished.completed_at = Some(Utc::now());
        finished.end_date = Some(Utc::now());
        f.store.insert_history(&finished).await.unwrap();
        f.store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::OnHold,
                crate::circulation::store::HolderUpdate::Set(5),
            )
            .await
            .unwrap();

        let approval = f
            .admin
            .approve(requests[0].id, Utc::now() + Duration::days(7))
            .await
            .unwrap();
        assert_eq!(approval.thread.unwrap().current_holder_id, 5);
    }

    #[tokio::test]
    async fn test_approve_twice_is_invalid() {
        let f = fixture();
        let (_, requests) = book_with_requests(&f.store, &[2]).await;
        let due = Utc::now() + Duration::days(14);

        f.admin.approve(requests[0].id, due).await.unwrap();
        let err = f.admin.approve(requests[0].id, due).await.unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_approve_reserved_book_is_invalid() {
        let f = fixture();
        let (book, requests) = book_with_requests(&f.store, &[2]).await;
        f.store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::Reserved,
                crate::circulation::store::HolderUpdate::Keep,
            )
            .await
            .unwrap();

        let err = f
            .admin
            .approve(requests[0].id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState(_)));
        let request = f.store.get_request(requests[0].id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_current_reader_request_keeps_queue() {
        let f = fixture();
        let (book, requests) = book_with_requests(&f.store, &[5, 6]).await;
        f.store
            .update_book_status_if(
                book.id,
                BookStatus::Available,
                BookStatus::Reading,
                crate::circulation::store::HolderUpdate::Set(5),
            )
            .await
            .unwrap();

        let err = f
            .admin
            .approve(requests[0].id, Utc::now() + Duration::days(7))
            .await
            .unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState(_)));

        for r in &requests {
            let stored = f.store.get_request(r.id).await.unwrap().unwrap();
            assert_eq!(stored.status, RequestStatus::Pending);
        }
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_approve_without_holder() {
        let f = fixture();
        let book = Book::new("Orphan", None);
        f.store.insert_book(&book).await.unwrap();
        let request = BookRequest::new(book.id, 2, 35.0);
        f.store.insert_request(&request).await.unwrap();

        let err = f.admin.approve(request.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CirculationError::CannotDetermineHolder));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_approval() {
        let f = fixture();
        f.notifier.set_fail(true);
        let (book, requests) = book_with_requests(&f.store, &[2]).await;

        let approval = f.admin.approve(requests[0].id, Utc::now()).await;
        assert!(approval.is_ok());
        assert_eq!(
            f.store.get_book(book.id).await.unwrap().unwrap().status,
            BookStatus::Requested
        );
    }

    #[tokio::test]
    async fn test_reject() {
        let f = fixture();
        let (book, requests) = book_with_requests(&f.store, &[2]).await;

        let rejected = f.admin.reject(requests[0].id, "duplicate").await.unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert!(rejected.processed_at.is_some());
        assert_eq!(
            f.notifier.sent(),
            vec![Notification::RequestRejected {
                user_id: 2,
                book_id: book.id
            }]
        );

        let err = f.admin.reject(requests[0].id, "again").await.unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState(_)));
        assert!(f.admin.pending_requests(10, 0).await.unwrap().is_empty());
    }
}
