//! Circulation Desk
//!
//! Book registration and the status changes that do not go through a
//! handover: admin reservation and a reader's permanent return.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::error::{CirculationError, not_found};
use super::state::BookStatus;
use super::store::{CirculationStore, HolderUpdate, ReturnCommit};
use super::types::{Book, BookId, DEFAULT_READING_DAYS, UserId};

pub struct CirculationDesk {
    store: Arc<dyn CirculationStore>,
    default_reading_days: u32,
}

impl CirculationDesk {
    pub fn new(store: Arc<dyn CirculationStore>) -> Self {
        Self {
            store,
            default_reading_days: DEFAULT_READING_DAYS,
        }
    }

    pub fn with_default_reading_days(mut self, days: u32) -> Self {
        self.default_reading_days = days;
        self
    }

    /// Register an available book. `created_by` is its first physical holder.
    pub async fn add_book(
        &self,
        title: &str,
        created_by: Option<UserId>,
    ) -> Result<Book, CirculationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CirculationError::InvalidState(
                "book title must not be empty".to_string(),
            ));
        }

        let book = Book::new(title, created_by).with_max_reading_days(self.default_reading_days);
        self.store.insert_book(&book).await?;
        info!(book_id = %book.id, title, ?created_by, "Book added");
        Ok(book)
    }

    pub async fn get_book(&self, book_id: BookId) -> Result<Book, CirculationError> {
        self.store
            .get_book(book_id)
            .await?
            .ok_or_else(|| not_found("book", book_id))
    }

    /// `available -> reserved`
    pub async fn reserve(&self, book_id: BookId) -> Result<(), CirculationError> {
        self.transition(book_id, BookStatus::Available, BookStatus::Reserved)
            .await
    }

    /// `reserved -> available`
    pub async fn release(&self, book_id: BookId) -> Result<(), CirculationError> {
        self.transition(book_id, BookStatus::Reserved, BookStatus::Available)
            .await
    }

    async fn transition(
        &self,
        book_id: BookId,
        from: BookStatus,
        to: BookStatus,
    ) -> Result<(), CirculationError> {
        let book = self.get_book(book_id).await?;
        if book.status != from || !from.can_transition_to(to) {
            return Err(CirculationError::InvalidState(format!(
                "cannot move book from {} to {}",
                book.status, to
            )));
        }
        if !self
            .store
            .update_book_status_if(book_id, from, to, HolderUpdate::Keep)
            .await?
        {
            return Err(CirculationError::InvalidState(format!(
                "book {book_id} status changed concurrently"
            )));
        }
        info!(%book_id, from = %from, to = %to, "Book status changed");
        Ok(())
    }

    /// The reader gives the book back to the library: the active entry is
    /// completed and closed, the book becomes available with no holder.
    pub async fn return_book(&self, book_id: BookId, user_id: UserId) -> Result<(), CirculationError> {
        let book = self.get_book(book_id).await?;
        if book.current_holder_id != Some(user_id) {
            return Err(CirculationError::NotCurrentHolder);
        }
        if book.status != BookStatus::Reading {
            return Err(CirculationError::InvalidState(format!(
                "cannot return a book that is {}",
                book.status
            )));
        }
        if self.store.active_thread(book_id).await?.is_some() {
            return Err(CirculationError::InvalidState(
                "a handover is in progress for this book".to_string(),
            ));
        }
        let history = self
            .store
            .active_history(book_id)
            .await?
            .ok_or_else(|| {
                CirculationError::InvalidState("no active reading history".to_string())
            })?;

        let committed = self
            .store
            .commit_return(&ReturnCommit {
                history_id: history.id,
                book_id,
                reader_id: user_id,
                returned_at: Utc::now(),
            })
            .await?;
        if !committed {
            return Err(CirculationError::InvalidState(
                "book changed concurrently".to_string(),
            ));
        }

        info!(%book_id, user_id, history_id = %history.id, "Book returned");
        Ok(())
    }
}
