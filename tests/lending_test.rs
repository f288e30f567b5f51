//! Lending engine integration tests against the in-memory store.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use prestamos_server::{
    config::LendingConfig,
    error::AppError,
    models::{Book, BorrowRequest, Loan, NewBook, NewLoan, NewPerson, Person, UpdateBook, UpdatePerson},
    services::Services,
    store::{InventoryStore, InventoryTx, MemoryStore, StoreError, StoreResult},
};

use common::{seed_book, seed_person, services};

#[tokio::test]
async fn borrow_decrements_copies_and_creates_one_active_loan() {
    let (store, services) = services();
    let book = seed_book(&services, "Rayuela", "Cortázar", 2).await;

    let loan_id = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "p1"))
        .await
        .unwrap();

    let book = services.catalog.get_book(&book.id).await.unwrap();
    assert_eq!(book.copies, 1);
    assert!(book.available);
    assert_eq!(book.held_by, None);

    let loans = store.list_loans().await.unwrap();
    assert_eq!(loans.len(), 1);
    let loan = &loans[0];
    assert_eq!(loan.id, loan_id);
    assert_eq!(loan.book_id, book.id);
    assert_eq!(loan.person_id, "p1");
    assert!(loan.active);
    assert!(loan.returned_at.is_none());
}

#[tokio::test]
async fn borrow_exhausted_book_fails_unavailable_with_zero_writes() {
    let (store, services) = services();
    let book = seed_book(&services, "Ficciones", "Borges", 0).await;
    assert!(!book.available);

    let err = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));

    let after = services.catalog.get_book(&book.id).await.unwrap();
    assert_eq!(after.copies, 0);
    assert!(!after.available);
    assert!(store.list_loans().await.unwrap().is_empty());
}

#[tokio::test]
async fn borrow_unknown_book_fails_not_found() {
    let (_, services) = services();
    let err = services
        .lending
        .borrow(&BorrowRequest::new("missing", "p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn borrow_without_resolved_person_fails_identity_missing() {
    let (store, services) = services();
    let book = seed_book(&services, "Pedro Páramo", "Rulfo", 1).await;

    let err = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IdentityMissing));
    assert!(store.list_loans().await.unwrap().is_empty());
}

/// The full walkthrough: one copy, two interested members, borrow,
/// rejection, return, and the rejection of a second return.
#[tokio::test]
async fn single_copy_lifecycle() {
    let (_, services) = services();
    let book = seed_book(&services, "Cien años de soledad", "García Márquez", 1).await;
    let ana = seed_person(&services, "ana").await;
    let bob = seed_person(&services, "bob").await;

    let ana_id = services.identity.resolve("ana").await.unwrap();
    assert_eq!(ana_id, ana.id);

    let loan_id = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, &ana_id))
        .await
        .unwrap();

    let taken = services.catalog.get_book(&book.id).await.unwrap();
    assert_eq!(taken.copies, 0);
    assert!(!taken.available);
    assert_eq!(taken.held_by.as_deref(), Some(ana.id.as_str()));

    let err = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, &bob.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));

    services.lending.return_loan(&loan_id, &book.id).await.unwrap();

    let restored = services.catalog.get_book(&book.id).await.unwrap();
    assert_eq!(restored.copies, 1);
    assert!(restored.available);
    assert_eq!(restored.held_by, None);

    let history = services.lending.loans_for_person(&ana.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].active);
    let returned_at = history[0].returned_at.expect("returnedAt set");
    assert!(returned_at >= history[0].borrowed_at);

    // Idempotent failure, not idempotent success: the loan stays terminal
    // and nothing else moves.
    let err = services
        .lending
        .return_loan(&loan_id, &book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyReturned(_)));
    let unchanged = services.catalog.get_book(&book.id).await.unwrap();
    assert_eq!(unchanged.copies, 1);
}

#[tokio::test]
async fn return_validates_the_redundant_book_id() {
    let (_, services) = services();
    let book = seed_book(&services, "El Aleph", "Borges", 1).await;
    let other = seed_book(&services, "Sur", "Borges", 1).await;

    let loan_id = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "p1"))
        .await
        .unwrap();

    let err = services
        .lending
        .return_loan(&loan_id, &other.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Nothing was written on either book.
    assert_eq!(services.catalog.get_book(&book.id).await.unwrap().copies, 0);
    assert_eq!(services.catalog.get_book(&other.id).await.unwrap().copies, 1);
}

#[tokio::test]
async fn return_unknown_loan_fails_not_found() {
    let (_, services) = services();
    let book = seed_book(&services, "Sur", "Borges", 1).await;
    let err = services
        .lending
        .return_loan("missing", &book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_borrow_delivery_collapses_onto_one_loan() {
    let (store, services) = services();
    let book = seed_book(&services, "Rayuela", "Cortázar", 3).await;

    let request = BorrowRequest::new(&book.id, "p1").with_idempotency_key("req-42");
    let first = services.lending.borrow(&request).await.unwrap();
    let second = services.lending.borrow(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.list_loans().await.unwrap().len(), 1);
    assert_eq!(services.catalog.get_book(&book.id).await.unwrap().copies, 2);
}

#[tokio::test]
async fn resolve_unknown_and_ambiguous_names_fail_not_found() {
    let (_, services) = services();
    seed_person(&services, "ana").await;

    let err = services.identity.resolve("nonexistent").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Two members sharing a display name make the name unusable as a key.
    services
        .members
        .register(prestamos_server::models::CreatePerson {
            name: "ana".to_string(),
            national_id: "other-nid".to_string(),
            birth_year: 1985,
            password: "secret".to_string(),
            role: prestamos_server::models::Role::Member,
        })
        .await
        .unwrap();
    let err = services.identity.resolve("ana").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Conflict behavior. These wrappers fail commits so the engine's bounded
// retry can be observed from outside.

#[derive(Clone)]
struct FlakyStore {
    inner: MemoryStore,
    /// Commits to fail before letting one through.
    failures_remaining: Arc<AtomicU32>,
    begins: Arc<AtomicU32>,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_remaining: Arc::new(AtomicU32::new(failures)),
            begins: Arc::new(AtomicU32::new(0)),
        }
    }
}

struct FlakyTx {
    inner: <MemoryStore as InventoryStore>::Tx,
    failures_remaining: Arc<AtomicU32>,
}

#[async_trait]
impl InventoryTx for FlakyTx {
    async fn get_book(&mut self, id: &str) -> StoreResult<Option<Book>> {
        self.inner.get_book(id).await
    }
    async fn update_book(&mut self, book: &Book) -> StoreResult<()> {
        self.inner.update_book(book).await
    }
    async fn get_loan(&mut self, id: &str) -> StoreResult<Option<Loan>> {
        self.inner.get_loan(id).await
    }
    async fn find_loan_by_idempotency_key(&mut self, key: &str) -> StoreResult<Option<Loan>> {
        self.inner.find_loan_by_idempotency_key(key).await
    }
    async fn insert_loan(&mut self, loan: &NewLoan) -> StoreResult<String> {
        self.inner.insert_loan(loan).await
    }
    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        self.inner.update_loan(loan).await
    }
    async fn commit(self) -> StoreResult<()> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict);
        }
        self.inner.commit().await
    }
}

#[async_trait]
impl InventoryStore for FlakyStore {
    type Tx = FlakyTx;

    async fn begin(&self) -> StoreResult<FlakyTx> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(FlakyTx {
            inner: self.inner.begin().await?,
            failures_remaining: Arc::clone(&self.failures_remaining),
        })
    }

    async fn get_book(&self, id: &str) -> StoreResult<Option<Book>> {
        self.inner.get_book(id).await
    }
    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        self.inner.list_books().await
    }
    async fn insert_book(&self, book: &NewBook) -> StoreResult<String> {
        self.inner.insert_book(book).await
    }
    async fn update_book(&self, id: &str, update: &UpdateBook) -> StoreResult<bool> {
        self.inner.update_book(id, update).await
    }
    async fn delete_book(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_book(id).await
    }
    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>> {
        self.inner.get_person(id).await
    }
    async fn list_people(&self) -> StoreResult<Vec<Person>> {
        self.inner.list_people().await
    }
    async fn find_people_by_name(&self, name: &str) -> StoreResult<Vec<Person>> {
        self.inner.find_people_by_name(name).await
    }
    async fn find_person_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>> {
        self.inner.find_person_by_national_id(national_id).await
    }
    async fn insert_person(&self, person: &NewPerson) -> StoreResult<String> {
        self.inner.insert_person(person).await
    }
    async fn update_person(&self, id: &str, update: &UpdatePerson) -> StoreResult<bool> {
        self.inner.update_person(id, update).await
    }
    async fn delete_person(&self, id: &str) -> StoreResult<bool> {
        self.inner.delete_person(id).await
    }
    async fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>> {
        self.inner.get_loan(id).await
    }
    async fn list_loans(&self) -> StoreResult<Vec<Loan>> {
        self.inner.list_loans().await
    }
    async fn find_loans_by_person(&self, person_id: &str) -> StoreResult<Vec<Loan>> {
        self.inner.find_loans_by_person(person_id).await
    }
}

fn flaky_services(failures: u32, retries: u32) -> (Arc<FlakyStore>, Services<FlakyStore>) {
    let store = Arc::new(FlakyStore::new(failures));
    let services = Services::new(
        Arc::clone(&store),
        LendingConfig {
            transaction_retries: retries,
        },
    );
    (store, services)
}

#[tokio::test]
async fn transient_conflicts_are_retried_and_the_borrow_lands() {
    let (store, services) = flaky_services(2, 3);
    let book = services
        .catalog
        .create_book(prestamos_server::models::CreateBook {
            title: "El túnel".to_string(),
            author: "Sábato".to_string(),
            year: 1948,
            description: String::new(),
            image_url: String::new(),
            copies: 1,
        })
        .await
        .unwrap();

    services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "p1"))
        .await
        .unwrap();

    // Two conflicted attempts plus the one that committed.
    assert_eq!(store.begins.load(Ordering::SeqCst), 3);
    assert_eq!(services.catalog.get_book(&book.id).await.unwrap().copies, 0);
    assert_eq!(store.list_loans().await.unwrap().len(), 1);
}

#[tokio::test]
async fn conflict_exhaustion_surfaces_transaction_conflict() {
    let (store, services) = flaky_services(u32::MAX, 2);
    let book = services
        .catalog
        .create_book(prestamos_server::models::CreateBook {
            title: "Sobre héroes y tumbas".to_string(),
            author: "Sábato".to_string(),
            year: 1961,
            description: String::new(),
            image_url: String::new(),
            copies: 1,
        })
        .await
        .unwrap();

    let err = services
        .lending
        .borrow(&BorrowRequest::new(&book.id, "p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransactionConflict));
    // 1 initial attempt + 2 retries.
    assert_eq!(store.begins.load(Ordering::SeqCst), 3);
    // The failed commits wrote nothing.
    assert_eq!(services.catalog.get_book(&book.id).await.unwrap().copies, 1);
    assert!(store.list_loans().await.unwrap().is_empty());
}
