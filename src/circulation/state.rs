//! Circulation State Definitions
//!
//! Status IDs are stored in PostgreSQL as SMALLINT.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Book circulation status
///
/// `current_holder_id` is set iff the status is `Reading` or `OnHold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum BookStatus {
    /// Nobody is assigned; the book can be requested
    Available = 0,

    /// A request was approved and a handover is being negotiated
    Requested = 10,

    /// A reader has physical custody and an open reading history
    Reading = 20,

    /// The last reader finished and keeps the book until the next request
    OnHold = 30,

    /// Pulled from circulation by an admin
    Reserved = 40,
}

impl BookStatus {
    /// Whether the transition `self -> next` is legal
    pub fn can_transition_to(&self, next: BookStatus) -> bool {
        use BookStatus::*;
        matches!(
            (self, next),
            (Available, Requested)
                | (OnHold, Requested)
                | (Requested, Reading)
                | (Requested, Available)
                | (Reading, Reading)
                | (Reading, OnHold)
                | (Reading, Available)
                | (Available, Reserved)
                | (Reserved, Available)
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BookStatus::Available),
            10 => Some(BookStatus::Requested),
            20 => Some(BookStatus::Reading),
            30 => Some(BookStatus::OnHold),
            40 => Some(BookStatus::Reserved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Requested => "requested",
            BookStatus::Reading => "reading",
            BookStatus::OnHold => "on_hold",
            BookStatus::Reserved => "reserved",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Book request adjudication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum RequestStatus {
    Pending = 0,
    /// Terminal
    Approved = 10,
    /// Terminal
    Rejected = -10,
}

impl RequestStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(RequestStatus::Pending),
            10 => Some(RequestStatus::Approved),
            -10 => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical delivery progress of a reading history entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum DeliveryStatus {
    #[default]
    NotStarted = 0,
    InTransit = 10,
    Delivered = 20,
}

impl DeliveryStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(DeliveryStatus::NotStarted),
            10 => Some(DeliveryStatus::InTransit),
            20 => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::NotStarted => "not_started",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handover thread status
///
/// ```text
/// ACTIVE → COMPLETED
///    ↓
/// CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ThreadStatus {
    Active = 0,
    /// Terminal: the book changed hands (or the reader put it on hold)
    Completed = 10,
    /// Terminal: a participant called the handover off
    Cancelled = -10,
}

impl ThreadStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ThreadStatus::Active)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(ThreadStatus::Active),
            10 => Some(ThreadStatus::Completed),
            -10 => Some(ThreadStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Active => "active",
            ThreadStatus::Completed => "completed",
            ThreadStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(BookStatus::Available.can_transition_to(BookStatus::Requested));
        assert!(BookStatus::OnHold.can_transition_to(BookStatus::Requested));
        assert!(BookStatus::Requested.can_transition_to(BookStatus::Reading));
        assert!(BookStatus::Reading.can_transition_to(BookStatus::OnHold));
        assert!(BookStatus::Reading.can_transition_to(BookStatus::Available));
        assert!(BookStatus::Reading.can_transition_to(BookStatus::Reading));
        assert!(BookStatus::Requested.can_transition_to(BookStatus::Available));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!BookStatus::Requested.can_transition_to(BookStatus::Requested));
        assert!(!BookStatus::Reading.can_transition_to(BookStatus::Requested));
        assert!(!BookStatus::Available.can_transition_to(BookStatus::Reading));
        assert!(!BookStatus::OnHold.can_transition_to(BookStatus::Available));
        assert!(!BookStatus::Reserved.can_transition_to(BookStatus::Requested));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());

        assert!(!ThreadStatus::Active.is_terminal());
        assert!(ThreadStatus::Completed.is_terminal());
        assert!(ThreadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(BookStatus::from_id(999).is_none());
        assert!(RequestStatus::from_id(5).is_none());
        assert!(DeliveryStatus::from_id(-1).is_none());
        assert!(ThreadStatus::from_id(42).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(BookStatus::OnHold.to_string(), "on_hold");
        assert_eq!(RequestStatus::Approved.to_string(), "approved");
        assert_eq!(DeliveryStatus::InTransit.to_string(), "in_transit");
        assert_eq!(ThreadStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&BookStatus::OnHold).unwrap();
        assert_eq!(json, "\"on_hold\"");
    }
}
