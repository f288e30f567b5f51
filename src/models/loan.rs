//! Loan model and lending engine inputs
//!
//! A loan is an audit record of one unit of a book held by a person, from
//! borrow until return. Returns flip `active` and stamp `returnedAt`; loan
//! documents are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: String,
    pub book_id: String,
    pub person_id: String,
    /// Assigned by the engine at transaction time, never client-supplied.
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Row for a store-assigned insert; the backend allocates the id.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: String,
    pub person_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub active: bool,
    pub idempotency_key: Option<String>,
}

/// Borrow request handed to the lending engine by the presentation layer.
/// `person_id` must already be resolved; the engine never re-derives
/// identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub book_id: String,
    pub person_id: String,
    /// Caller token that collapses duplicate deliveries of the same
    /// logical borrow. Absent means best-effort.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl BorrowRequest {
    pub fn new(book_id: impl Into<String>, person_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            person_id: person_id.into(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
