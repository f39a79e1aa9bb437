//! Reading History Ledger
//!
//! Append-only timeline of holding periods per book. An entry is active while
//! `end_date` is unset; the store allows at most one active entry per book.
//! Completion (`is_completed`) and closing (`end_date`) are independent: an
//! entry completes when the reader finishes and closes when the book leaves
//! their hands.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::{CirculationError, not_found};
use super::store::CirculationStore;
use super::types::{Book, BookId, HistoryId, ReadingHistory, UserId};

pub struct ReadingHistoryLedger {
    store: Arc<dyn CirculationStore>,
}

impl ReadingHistoryLedger {
    pub fn new(store: Arc<dyn CirculationStore>) -> Self {
        Self { store }
    }

    /// Open an active entry for `user_id`
    pub async fn start(
        &self,
        book_id: BookId,
        user_id: UserId,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<ReadingHistory, CirculationError> {
        if self.store.get_book(book_id).await?.is_none() {
            return Err(not_found("book", book_id));
        }

        let history = ReadingHistory::new(book_id, user_id, Utc::now(), due_date);
        self.store.insert_history(&history).await?;

        info!(history_id = %history.id, %book_id, user_id, "Reading history started");
        Ok(history)
    }

    /// Set `end_date` on an active entry. Does not mark it completed.
    pub async fn close(
        &self,
        history_id: HistoryId,
        end_date: DateTime<Utc>,
    ) -> Result<(), CirculationError> {
        if self.store.get_history(history_id).await?.is_none() {
            return Err(not_found("reading history", history_id));
        }
        if !self.store.close_history_if_open(history_id, end_date).await? {
            return Err(CirculationError::InvalidState(format!(
                "reading history {history_id} is already closed"
            )));
        }
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        history_id: HistoryId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CirculationError> {
        if self.store.get_history(history_id).await?.is_none() {
            return Err(not_found("reading history", history_id));
        }
        if !self
            .store
            .mark_history_completed_if(history_id, completed_at)
            .await?
        {
            return Err(CirculationError::AlreadyCompleted);
        }
        Ok(())
    }

    /// Active entries due within `threshold_days` from now with no successor
    pub async fn due_soon(
        &self,
        threshold_days: u32,
        limit: usize,
    ) -> Result<Vec<ReadingHistory>, CirculationError> {
        self.due_soon_at(Utc::now(), threshold_days, limit).await
    }

    pub async fn due_soon_at(
        &self,
        now: DateTime<Utc>,
        threshold_days: u32,
        limit: usize,
    ) -> Result<Vec<ReadingHistory>, CirculationError> {
        let until = now + Duration::days(i64::from(threshold_days));
        self.store.due_soon(now, until, limit).await
    }

    pub async fn active(&self, book_id: BookId) -> Result<Option<ReadingHistory>, CirculationError> {
        self.store.active_history(book_id).await
    }

    /// Latest completed entry; its reader is the last known physical holder
    pub async fn last_completed(
        &self,
        book_id: BookId,
    ) -> Result<Option<ReadingHistory>, CirculationError> {
        self.store.last_completed_history(book_id).await
    }

    /// Newest first
    pub async fn history_for_reader(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ReadingHistory>, CirculationError> {
        self.store.histories_for_reader(user_id).await
    }

    /// The caller's active entry for a book
    pub async fn current_for(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> Result<ReadingHistory, CirculationError> {
        let history = self
            .store
            .active_history(book_id)
            .await?
            .ok_or_else(|| not_found("active reading history for book", book_id))?;
        if history.reader_id != user_id {
            return Err(CirculationError::NotCurrentHolder);
        }
        Ok(history)
    }

    /// Books the member finished and still keeps
    pub async fn books_on_hold_for(&self, user_id: UserId) -> Result<Vec<Book>, CirculationError> {
        self.store.books_on_hold_for(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circulation::store::MemoryStore;

    async fn setup() -> (ReadingHistoryLedger, Book) {
        let store = Arc::new(MemoryStore::new());
        let book = Book::new("Solaris", Some(9));
        store.insert_book(&book).await.unwrap();
        (ReadingHistoryLedger::new(store), book)
    }

    #[tokio::test]
    async fn test_start_rejects_second_active_entry() {
        let (ledger, book) = setup().await;

        ledger.start(book.id, 1, None).await.unwrap();
        let err = ledger.start(book.id, 2, None).await.unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_close_does_not_complete() {
        let (ledger, book) = setup().await;
        let history = ledger.start(book.id, 1, None).await.unwrap();

        ledger.close(history.id, Utc::now()).await.unwrap();
        assert!(ledger.active(book.id).await.unwrap().is_none());
        assert!(ledger.last_completed(book.id).await.unwrap().is_none());

        // the book can now get a new active entry
        ledger.start(book.id, 2, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_completed_twice() {
        let (ledger, book) = setup().await;
        let history = ledger.start(book.id, 1, None).await.unwrap();

        ledger.mark_completed(history.id, Utc::now()).await.unwrap();
        let err = ledger
            .mark_completed(history.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CirculationError::AlreadyCompleted));

        let last = ledger.last_completed(book.id).await.unwrap().unwrap();
        assert_eq!(last.id, history.id);
    }

    #[tokio::test]
    async fn test_due_soon_threshold() {
        let (ledger, book) = setup().await;
        let now = Utc::now();
        ledger
            .start(book.id, 1, Some(now + Duration::days(3)))
            .await
            .unwrap();

        assert_eq!(ledger.due_soon_at(now, 7, 100).await.unwrap().len(), 1);
        assert!(ledger.due_soon_at(now, 2, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_current_for_checks_reader() {
        let (ledger, book) = setup().await;
        ledger.start(book.id, 1, None).await.unwrap();

        assert_eq!(ledger.current_for(book.id, 1).await.unwrap().reader_id, 1);
        let err = ledger.current_for(book.id, 2).await.unwrap_err();
        assert!(matches!(err, CirculationError::NotCurrentHolder));
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let (ledger, _) = setup().await;
        let err = ledger.close(HistoryId::new(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, CirculationError::NotFound(_)));
        let err = ledger.start(BookId::new(), 1, None).await.unwrap_err();
        assert!(matches!(err, CirculationError::NotFound(_)));
    }
}
