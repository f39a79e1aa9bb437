//! Circulation Core Types
//!
//! Records owned by the circulation core. Users are referenced by id only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::core_types::UserId;

use super::state::{BookStatus, DeliveryStatus, RequestStatus, ThreadStatus};

/// Declares a ULID-backed record id.
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(ulid::Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

record_id!(
    /// Book identifier
    BookId
);
record_id!(
    /// Book request identifier
    RequestId
);
record_id!(
    /// Reading history entry identifier
    HistoryId
);
record_id!(
    /// Handover thread identifier
    ThreadId
);
record_id!(
    /// Handover message identifier
    MessageId
);

/// Default holding period when a book does not specify one
pub const DEFAULT_READING_DAYS: u32 = 14;

/// A single physical book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub status: BookStatus,
    pub current_holder_id: Option<UserId>,
    pub created_by: Option<UserId>,
    pub max_reading_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Create an available book with no holder
    pub fn new(title: impl Into<String>, created_by: Option<UserId>) -> Self {
        let now = Utc::now();
        Self {
            id: BookId::new(),
            title: title.into(),
            status: BookStatus::Available,
            current_holder_id: None,
            created_by,
            max_reading_days: DEFAULT_READING_DAYS,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_reading_days(mut self, days: u32) -> Self {
        self.max_reading_days = days;
        self
    }

    /// Due date for a holding period starting at `start`
    pub fn due_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::days(i64::from(self.max_reading_days))
    }
}

/// A member's ask to receive a book next
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRequest {
    pub id: RequestId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub status: RequestStatus,
    pub priority_score: f64,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl BookRequest {
    pub fn new(book_id: BookId, user_id: UserId, priority_score: f64) -> Self {
        Self {
            id: RequestId::new(),
            book_id,
            user_id,
            status: RequestStatus::Pending,
            priority_score,
            requested_at: Utc::now(),
            processed_at: None,
            due_date: None,
        }
    }
}

/// One continuous holding period of one reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingHistory {
    pub id: HistoryId,
    pub book_id: BookId,
    pub reader_id: UserId,
    pub start_date: DateTime<Utc>,
    /// `None` while the reader still has the book
    pub end_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_reader_id: Option<UserId>,
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl ReadingHistory {
    pub fn new(
        book_id: BookId,
        reader_id: UserId,
        start_date: DateTime<Utc>,
        due_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: HistoryId::new(),
            book_id,
            reader_id,
            start_date,
            end_date: None,
            due_date,
            is_completed: false,
            completed_at: None,
            next_reader_id: None,
            delivery_status: DeliveryStatus::NotStarted,
            delivered_at: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}

/// Two-party negotiation for a physical handover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverThread {
    pub id: ThreadId,
    pub book_id: BookId,
    pub current_holder_id: UserId,
    pub next_holder_id: UserId,
    pub reading_history_id: Option<HistoryId>,
    pub status: ThreadStatus,
    pub handover_due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl HandoverThread {
    pub fn new(
        book_id: BookId,
        current_holder_id: UserId,
        next_holder_id: UserId,
        handover_due_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            book_id,
            current_holder_id,
            next_holder_id,
            reading_history_id: None,
            status: ThreadStatus::Active,
            handover_due_date,
            created_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn for_history(mut self, history_id: HistoryId) -> Self {
        self.reading_history_id = Some(history_id);
        self
    }

    #[inline]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.current_holder_id == user_id || self.next_holder_id == user_id
    }

    /// The other participant, if `user_id` is one of the two
    pub fn counterpart(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.next_holder_id {
            Some(self.current_holder_id)
        } else if user_id == self.current_holder_id {
            Some(self.next_holder_id)
        } else {
            None
        }
    }
}

/// Entry in a handover thread's message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverMessage {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub message: String,
    pub is_system_message: bool,
    pub created_at: DateTime<Utc>,
}

impl HandoverMessage {
    pub fn user(thread_id: ThreadId, user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            thread_id,
            user_id,
            message: message.into(),
            is_system_message: false,
            created_at: Utc::now(),
        }
    }

    /// System messages are attributed to the participant whose action produced them
    pub fn system(thread_id: ThreadId, on_behalf_of: UserId, message: impl Into<String>) -> Self {
        Self {
            is_system_message: true,
            ..Self::user(thread_id, on_behalf_of, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_parse() {
        let id = BookId::new();
        let parsed: BookId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<ThreadId>().is_err());
    }

    #[test]
    fn test_new_book_is_available() {
        let book = Book::new("Dune", Some(7));
        assert_eq!(book.status, BookStatus::Available);
        assert!(book.current_holder_id.is_none());
        assert_eq!(book.max_reading_days, DEFAULT_READING_DAYS);
    }

    #[test]
    fn test_due_from() {
        let book = Book::new("Dune", None).with_max_reading_days(3);
        let start = Utc::now();
        assert_eq!(book.due_from(start), start + Duration::days(3));
    }

    #[test]
    fn test_thread_counterpart() {
        let thread = HandoverThread::new(BookId::new(), 1, 2, Utc::now());
        assert_eq!(thread.counterpart(1), Some(2));
        assert_eq!(thread.counterpart(2), Some(1));
        assert_eq!(thread.counterpart(3), None);
        assert!(!thread.is_participant(3));
    }

    #[test]
    fn test_system_message_flag() {
        let thread_id = ThreadId::new();
        let msg = HandoverMessage::system(thread_id, 1, "created");
        assert!(msg.is_system_message);
        assert_eq!(msg.thread_id, thread_id);
        assert!(!HandoverMessage::user(thread_id, 1, "hi").is_system_message);
    }
}
