//! Handover Negotiation
//!
//! A handover thread pairs the outgoing holder with the incoming one. Only
//! those two can post to it or drive it forward:
//!
//! ```text
//! outgoing reader                         incoming reader
//!   mark_completed ──▶ in_transit ──────▶ mark_delivered ──▶ thread completed
//!        │ (no successor)                        │
//!        ▼                                       ▼
//!     on_hold                           new reading history
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::effects::{Notifier, SideEffects};
use super::error::{CirculationError, not_found};
use super::state::{BookStatus, DeliveryStatus, ThreadStatus};
use super::store::{
    CancellationCommit, CancellationOutcome, CirculationStore, CompletionCommit,
    CompletionOutcome, DeliveryCommit,
};
use super::types::{
    Book, BookId, HandoverMessage, HandoverThread, ReadingHistory, ThreadId, UserId,
};

pub(crate) const MSG_BOOK_ON_HOLD: &str =
    "Book reading completed. Book is on hold until next request.";
pub(crate) const MSG_BOOK_DELIVERED: &str = "Book has been delivered and received successfully!";
pub(crate) const MSG_THREAD_CANCELLED: &str = "Handover cancelled.";

pub(crate) fn thread_created_message(due: DateTime<Utc>) -> String {
    format!(
        "Handover thread created. Book is due on {}. Please coordinate the handover.",
        due.format("%b %-d, %Y")
    )
}

/// Queue the top unfulfilled approved request as successor of `history`.
///
/// Returns the successor already recorded on the entry if there is one, and
/// the winner's pick if a concurrent caller paired first.
pub(crate) async fn pair_successor(
    store: &dyn CirculationStore,
    history: &ReadingHistory,
) -> Result<Option<UserId>, CirculationError> {
    if let Some(next) = history.next_reader_id {
        return Ok(Some(next));
    }

    let Some(request) = store
        .next_approved_request(history.book_id, history.reader_id)
        .await?
    else {
        return Ok(None);
    };

    if store
        .set_next_reader_if_unset(history.id, request.user_id)
        .await?
    {
        info!(
            history_id = %history.id,
            book_id = %history.book_id,
            next_reader_id = request.user_id,
            request_id = %request.id,
            "Successor queued"
        );
        return Ok(Some(request.user_id));
    }

    Ok(store
        .get_history(history.id)
        .await?
        .and_then(|h| h.next_reader_id))
}

/// Open the reader-to-reader thread for `history` unless one is already active.
///
/// `None` means another thread holds the book's single active slot.
pub(crate) async fn open_successor_thread(
    store: &dyn CirculationStore,
    book: &Book,
    history: &ReadingHistory,
    next_reader_id: UserId,
) -> Result<Option<HandoverThread>, CirculationError> {
    if store.active_thread(book.id).await?.is_some() {
        debug!(book_id = %book.id, "Active handover thread exists, not opening another");
        return Ok(None);
    }
    // The entry may have closed (on hold, returned) since it was read
    if !store
        .get_history(history.id)
        .await?
        .is_some_and(|h| h.is_active())
    {
        debug!(history_id = %history.id, "Reading entry closed, not opening a handover");
        return Ok(None);
    }

    let due = history
        .due_date
        .unwrap_or_else(|| book.due_from(history.start_date));
    let thread = HandoverThread::new(book.id, history.reader_id, next_reader_id, due)
        .for_history(history.id);
    let opening = HandoverMessage::system(thread.id, history.reader_id, thread_created_message(due));

    match store.insert_thread(&thread, Some(&opening)).await {
        Ok(()) => {
            info!(
                thread_id = %thread.id,
                book_id = %book.id,
                holder_id = thread.current_holder_id,
                next_holder_id = thread.next_holder_id,
                "Handover thread opened"
            );
            Ok(Some(thread))
        }
        // Lost the race for the active slot
        Err(CirculationError::InvalidState(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct HandoverCoordinator {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn Notifier>,
}

impl HandoverCoordinator {
    pub fn new(store: Arc<dyn CirculationStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    async fn load_book(&self, book_id: BookId) -> Result<Book, CirculationError> {
        self.store
            .get_book(book_id)
            .await?
            .ok_or_else(|| not_found("book", book_id))
    }

    async fn load_thread(&self, thread_id: ThreadId) -> Result<HandoverThread, CirculationError> {
        self.store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| CirculationError::ThreadNotFound(thread_id.to_string()))
    }

    /// Current holder finished reading.
    ///
    /// With a successor the entry stays open and goes in transit. Without one
    /// it closes and the book goes on hold with the reader.
    pub async fn mark_completed(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<ReadingHistory, CirculationError> {
        let book = self.load_book(book_id).await?;

        let history = match self.store.active_history(book_id).await? {
            Some(history) => history,
            None => self.recover_missing_history(&book, user_id).await?,
        };
        if history.reader_id != user_id {
            return Err(CirculationError::NotCurrentHolder);
        }
        if history.is_completed {
            return Err(CirculationError::AlreadyCompleted);
        }

        let now = Utc::now();
        let successor = pair_successor(self.store.as_ref(), &history).await?;
        let outcome = match successor {
            Some(_) => CompletionOutcome::InTransit,
            None => CompletionOutcome::Hold,
        };

        let committed = self
            .store
            .commit_completion(&CompletionCommit {
                history_id: history.id,
                book_id,
                completed_at: now,
                outcome,
            })
            .await?;
        if !committed {
            return Err(CirculationError::InvalidState(
                "reading entry changed concurrently".to_string(),
            ));
        }

        let mut effects = SideEffects::new();
        match successor {
            Some(next) => {
                info!(%book_id, user_id, next_reader_id = next, "Reading completed, book in transit");

                let mut paired = history.clone();
                paired.next_reader_id = Some(next);
                if let Some(thread) =
                    open_successor_thread(self.store.as_ref(), &book, &paired, next).await?
                {
                    effects.push(
                        "notify_handover_thread_created",
                        self.notifier.notify_handover_thread_created(
                            thread.current_holder_id,
                            thread.next_holder_id,
                            book_id,
                            &book.title,
                        ),
                    );
                }
                effects.push(
                    "notify_book_in_transit",
                    self.notifier.notify_book_in_transit(next, book_id, &book.title),
                );
            }
            None => {
                info!(%book_id, user_id, "Reading completed, book on hold");

                if let Some(thread) = self.store.active_thread(book_id).await?
                    && self
                        .store
                        .close_thread_if_active(thread.id, ThreadStatus::Completed, now)
                        .await?
                {
                    self.store
                        .append_message(&HandoverMessage::system(
                            thread.id,
                            user_id,
                            MSG_BOOK_ON_HOLD,
                        ))
                        .await?;
                }
            }
        }
        effects.run().await;

        self.store
            .get_history(history.id)
            .await?
            .ok_or_else(|| not_found("reading history", history.id))
    }

    /// No active entry although the caller claims to be reading: open one,
    /// unless the caller already finished this book.
    async fn recover_missing_history(
        &self,
        book: &Book,
        user_id: UserId,
    ) -> Result<ReadingHistory, CirculationError> {
        if self
            .store
            .completed_history_for_reader(book.id, user_id)
            .await?
            .is_some()
        {
            return Err(CirculationError::AlreadyCompletedByThisUser);
        }
        if book.current_holder_id != Some(user_id) {
            return Err(CirculationError::NotCurrentHolder);
        }
        // Completion needs a reading book
        if book.status != BookStatus::Reading {
            return Err(CirculationError::InvalidState(format!(
                "book is {} with no active reading entry",
                book.status
            )));
        }

        warn!(
            book_id = %book.id,
            user_id,
            status = %book.status,
            "No active reading history for current holder, opening recovery entry"
        );
        let now = Utc::now();
        let history = ReadingHistory::new(book.id, user_id, now, Some(book.due_from(now)));
        self.store.insert_history(&history).await?;
        Ok(history)
    }

    /// Incoming holder confirms physical receipt
    pub async fn mark_delivered(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<ReadingHistory, CirculationError> {
        let book = self.load_book(book_id).await?;
        let thread = self
            .store
            .active_thread(book_id)
            .await?
            .ok_or(CirculationError::NoActiveThread)?;
        if thread.next_holder_id != user_id {
            return Err(CirculationError::NotNextHolder);
        }

        let previous = self.store.active_history(book_id).await?;
        let expected_status = match &previous {
            None => BookStatus::Requested,
            Some(prev) => {
                if prev.delivery_status == DeliveryStatus::Delivered || prev.reader_id == user_id {
                    return Err(CirculationError::AlreadyDelivered);
                }
                BookStatus::Reading
            }
        };
        if book.status != expected_status {
            return Err(CirculationError::InvalidState(format!(
                "book is {} but delivery expects {}",
                book.status, expected_status
            )));
        }

        let now = Utc::now();
        let due = self
            .store
            .latest_approved_request(book_id, user_id)
            .await?
            .and_then(|r| r.due_date)
            .unwrap_or_else(|| book.due_from(now));
        let next = ReadingHistory::new(book_id, user_id, now, Some(due));

        let committed = self
            .store
            .commit_delivery(&DeliveryCommit {
                book_id,
                thread_id: thread.id,
                expected_status,
                previous: previous.as_ref().map(|p| p.id),
                next: next.clone(),
                delivered_at: now,
                message: HandoverMessage::system(thread.id, user_id, MSG_BOOK_DELIVERED),
            })
            .await?;
        if !committed {
            return Err(CirculationError::InvalidState(
                "handover changed concurrently".to_string(),
            ));
        }

        info!(
            %book_id,
            user_id,
            thread_id = %thread.id,
            history_id = %next.id,
            due_date = %due,
            "Book delivered"
        );

        if let Some(prev) = &previous {
            let mut effects = SideEffects::new();
            effects.push(
                "notify_book_delivered",
                self.notifier
                    .notify_book_delivered(prev.reader_id, book_id, &book.title),
            );
            effects.run().await;
        }

        Ok(next)
    }

    pub async fn post_message(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
        text: &str,
    ) -> Result<HandoverMessage, CirculationError> {
        let thread = self.load_thread(thread_id).await?;
        let Some(other) = thread.counterpart(user_id) else {
            return Err(CirculationError::NotParticipant);
        };
        if text.trim().is_empty() {
            return Err(CirculationError::InvalidState(
                "message must not be empty".to_string(),
            ));
        }

        let message = HandoverMessage::user(thread_id, user_id, text);
        self.store.append_message(&message).await?;
        debug!(%thread_id, user_id, "Handover message posted");

        let title = self
            .store
            .get_book(thread.book_id)
            .await?
            .map(|b| b.title)
            .unwrap_or_default();
        let mut effects = SideEffects::new();
        effects.push(
            "notify_handover_message",
            self.notifier
                .notify_handover_message(other, thread.book_id, &title),
        );
        effects.run().await;

        Ok(message)
    }

    /// A participant abandons an active thread.
    ///
    /// An initial handover releases the book back to `available`; the last
    /// completed reader still resolves as the physical holder on the next
    /// approval. A relay already in transit is unpaired and the book goes on
    /// hold with the outgoing reader. A thread opened before the reader
    /// finished only closes; completion reopens it.
    pub async fn cancel_thread(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
    ) -> Result<HandoverThread, CirculationError> {
        let thread = self.load_thread(thread_id).await?;
        if !thread.is_participant(user_id) {
            return Err(CirculationError::NotParticipant);
        }
        if thread.status.is_terminal() {
            return Err(CirculationError::InvalidState(format!(
                "handover thread {thread_id} is already {}",
                thread.status
            )));
        }

        let outcome = self
            .store
            .commit_cancellation(&CancellationCommit {
                thread_id,
                book_id: thread.book_id,
                cancelled_at: Utc::now(),
                message: HandoverMessage::system(thread_id, user_id, MSG_THREAD_CANCELLED),
            })
            .await?
            .ok_or_else(|| {
                CirculationError::InvalidState(format!("handover thread {thread_id} is not active"))
            })?;

        match outcome {
            CancellationOutcome::Released => {
                debug!(book_id = %thread.book_id, "Initial handover cancelled, book available again");
            }
            CancellationOutcome::Unpaired => {
                info!(
                    book_id = %thread.book_id,
                    holder_id = thread.current_holder_id,
                    "Relay cancelled in transit, book on hold with outgoing reader"
                );
            }
            CancellationOutcome::Detached => {}
        }

        info!(%thread_id, book_id = %thread.book_id, user_id, ?outcome, "Handover thread cancelled");
        self.load_thread(thread_id).await
    }

    pub async fn active_thread(
        &self,
        book_id: BookId,
    ) -> Result<Option<HandoverThread>, CirculationError> {
        self.store.active_thread(book_id).await
    }

    /// Threads where the member is either party, newest first
    pub async fn threads_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<HandoverThread>, CirculationError> {
        self.store.threads_for_user(user_id).await
    }

    /// Message log in creation order
    pub async fn messages(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<HandoverMessage>, CirculationError> {
        self.load_thread(thread_id).await?;
        self.store.messages(thread_id).await
    }
}
