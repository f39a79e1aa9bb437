//! Request Ledger
//!
//! Member requests for a book. At most one pending request per (book, user);
//! resolution to approved/rejected happens in `adjudication`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{CirculationError, not_found};
use super::priority::{PriorityModel, StubPriorityModel};
use super::state::{BookStatus, RequestStatus};
use super::store::CirculationStore;
use super::types::{BookId, BookRequest, UserId};

/// Which book statuses accept new requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPolicy {
    /// Only books nobody is reading: `available`, `on_hold`
    Strict,
    /// Also queue behind the current reader
    #[default]
    Queueing,
    /// Any status
    Open,
}

impl RequestPolicy {
    pub fn allows(&self, status: BookStatus) -> bool {
        match self {
            RequestPolicy::Strict => matches!(status, BookStatus::Available | BookStatus::OnHold),
            RequestPolicy::Queueing => matches!(
                status,
                BookStatus::Available | BookStatus::OnHold | BookStatus::Reading
            ),
            RequestPolicy::Open => true,
        }
    }
}

pub struct RequestLedger {
    store: Arc<dyn CirculationStore>,
    priority: Arc<dyn PriorityModel>,
    policy: RequestPolicy,
}

impl RequestLedger {
    pub fn new(store: Arc<dyn CirculationStore>) -> Self {
        Self {
            store,
            priority: Arc::new(StubPriorityModel),
            policy: RequestPolicy::default(),
        }
    }

    pub fn with_priority_model(mut self, priority: Arc<dyn PriorityModel>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_policy(mut self, policy: RequestPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RequestPolicy {
        self.policy
    }

    /// Create a pending request for `user_id`
    pub async fn submit(
        &self,
        book_id: BookId,
        user_id: UserId,
    ) -> Result<BookRequest, CirculationError> {
        let book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or_else(|| not_found("book", book_id))?;

        if self.store.find_pending_request(book_id, user_id).await?.is_some() {
            return Err(CirculationError::AlreadyRequested);
        }
        if !self.policy.allows(book.status) {
            return Err(CirculationError::BookNotAvailable(book.status));
        }
        if book.current_holder_id == Some(user_id) {
            return Err(CirculationError::InvalidState(
                "requester already holds this book".to_string(),
            ));
        }

        let score = self.priority.inputs(&book, user_id).score();
        let request = BookRequest::new(book_id, user_id, score);
        // A concurrent duplicate loses on the unique pending index
        self.store.insert_request(&request).await?;

        info!(
            request_id = %request.id,
            %book_id,
            user_id,
            priority = score,
            "Book requested"
        );
        Ok(request)
    }

    /// Withdraw the caller's own pending request
    pub async fn cancel(&self, book_id: BookId, user_id: UserId) -> Result<(), CirculationError> {
        if !self.store.delete_pending_request(book_id, user_id).await? {
            return Err(CirculationError::NotFound(format!(
                "pending request for book {book_id} by user {user_id}"
            )));
        }
        debug!(%book_id, user_id, "Pending request cancelled");
        Ok(())
    }

    /// Pending requests for a book, highest priority first, then oldest
    pub async fn rank_pending(&self, book_id: BookId) -> Result<Vec<BookRequest>, CirculationError> {
        self.store
            .requests_for_book(book_id, Some(RequestStatus::Pending))
            .await
    }

    pub async fn has_pending(&self, book_id: BookId, user_id: UserId) -> Result<bool, CirculationError> {
        Ok(self
            .store
            .find_pending_request(book_id, user_id)
            .await?
            .is_some())
    }

    /// All requests of a member, newest first
    pub async fn requests_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BookRequest>, CirculationError> {
        self.store.requests_for_user(user_id).await
    }

    /// Every request for a book regardless of status, in rank order
    pub async fn requests_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<BookRequest>, CirculationError> {
        self.store.requests_for_book(book_id, None).await
    }

    /// Pending requests across all books, oldest first
    pub async fn pending_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BookRequest>, CirculationError> {
        self.store.pending_requests(limit, offset).await
    }
}
