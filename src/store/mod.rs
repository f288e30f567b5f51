//! Inventory store boundary
//!
//! The document store is a trusted external collaborator reached through
//! these traits: plain get/query/update primitives on the shared handle,
//! and a transaction primitive ([`InventoryStore::begin`]) guaranteeing
//! all-or-nothing application of a read-modify-write sequence. The lending
//! engine pushes every check-then-write sequence into one transaction;
//! doing the check and the write as two separate calls would race.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgInventoryStore;

use crate::models::{Book, Loan, NewBook, NewLoan, NewPerson, Person, UpdateBook, UpdatePerson};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A concurrent transaction modified a document this one read.
    /// The only retry-eligible kind.
    #[error("transaction conflict")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One open transaction. Reads observe a consistent snapshot; writes are
/// buffered and applied all-or-nothing at [`InventoryTx::commit`].
/// Dropping the transaction without committing rolls it back with zero
/// writes performed.
#[async_trait]
pub trait InventoryTx: Send {
    async fn get_book(&mut self, id: &str) -> StoreResult<Option<Book>>;
    async fn update_book(&mut self, book: &Book) -> StoreResult<()>;

    async fn get_loan(&mut self, id: &str) -> StoreResult<Option<Loan>>;
    async fn find_loan_by_idempotency_key(&mut self, key: &str) -> StoreResult<Option<Loan>>;
    /// Returns the store-assigned loan id.
    async fn insert_loan(&mut self, loan: &NewLoan) -> StoreResult<String>;
    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}

/// Shared store handle, safe for concurrent use across requests.
///
/// Update and delete primitives report whether the document existed so
/// callers can map absence onto their own `NotFound`. The non-transactional
/// updates take the maintenance DTOs and write only the columns those
/// carry: circulation state (`copies`, `available`, `heldBy`) and the
/// credential hash can only change through a transaction or the dedicated
/// registration path, so a maintenance write racing the engine cannot
/// clobber them with a stale read.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    type Tx: InventoryTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn get_book(&self, id: &str) -> StoreResult<Option<Book>>;
    async fn list_books(&self) -> StoreResult<Vec<Book>>;
    async fn insert_book(&self, book: &NewBook) -> StoreResult<String>;
    async fn update_book(&self, id: &str, update: &UpdateBook) -> StoreResult<bool>;
    async fn delete_book(&self, id: &str) -> StoreResult<bool>;

    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>>;
    async fn list_people(&self) -> StoreResult<Vec<Person>>;
    async fn find_people_by_name(&self, name: &str) -> StoreResult<Vec<Person>>;
    async fn find_person_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>>;
    async fn insert_person(&self, person: &NewPerson) -> StoreResult<String>;
    async fn update_person(&self, id: &str, update: &UpdatePerson) -> StoreResult<bool>;
    async fn delete_person(&self, id: &str) -> StoreResult<bool>;

    async fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>>;
    async fn list_loans(&self) -> StoreResult<Vec<Loan>>;
    async fn find_loans_by_person(&self, person_id: &str) -> StoreResult<Vec<Loan>>;
}
