//! Core types used throughout the system
//!
//! Members live in an external account system; the circulation core only
//! ever sees their numeric id.

/// User ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Weak reference to a member (no ownership)
/// - Stored as BIGINT in PostgreSQL
pub type UserId = u64;
