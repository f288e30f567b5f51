//! In-memory inventory store
//!
//! Versioned documents with optimistic commit-time validation: a
//! transaction records the version of every document it reads (version 0
//! for absent documents) and buffers its writes. Commit takes the state
//! lock once, re-checks every recorded version and applies the buffer
//! all-or-nothing, failing with [`StoreError::Conflict`] when a concurrent
//! commit touched any document read here. This mirrors the conflict
//! behavior of the remote document store closely enough to exercise the
//! lending engine's retry path without one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{InventoryStore, InventoryTx, StoreError, StoreResult};
use crate::models::{Book, Loan, NewBook, NewLoan, NewPerson, Person, UpdateBook, UpdatePerson};

#[derive(Debug, Clone)]
struct Versioned<T> {
    doc: T,
    version: u64,
}

#[derive(Default)]
struct State {
    books: HashMap<String, Versioned<Book>>,
    people: HashMap<String, Versioned<Person>>,
    loans: HashMap<String, Versioned<Loan>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DocKind {
    Book,
    Loan,
    /// Predicate read over the loan idempotency keys; the id is the key.
    /// Version 0 records "no loan carried this key", so a concurrent
    /// keyed insert conflicts the commit.
    LoanKey,
}

pub struct MemoryTx {
    state: Arc<Mutex<State>>,
    /// First observed version per document; 0 means absent at read time.
    reads: HashMap<(DocKind, String), u64>,
    book_writes: HashMap<String, Book>,
    loan_writes: HashMap<String, Loan>,
    loan_inserts: Vec<Loan>,
}

impl MemoryTx {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_read(&mut self, kind: DocKind, id: &str, version: u64) {
        self.reads.entry((kind, id.to_string())).or_insert(version);
    }
}

#[async_trait]
impl InventoryTx for MemoryTx {
    async fn get_book(&mut self, id: &str) -> StoreResult<Option<Book>> {
        if let Some(book) = self.book_writes.get(id) {
            return Ok(Some(book.clone()));
        }
        let version;
        let doc;
        {
            let state = self.lock();
            match state.books.get(id) {
                Some(entry) => {
                    version = entry.version;
                    doc = Some(entry.doc.clone());
                }
                None => {
                    version = 0;
                    doc = None;
                }
            }
        }
        self.record_read(DocKind::Book, id, version);
        Ok(doc)
    }

    async fn update_book(&mut self, book: &Book) -> StoreResult<()> {
        self.book_writes.insert(book.id.clone(), book.clone());
        Ok(())
    }

    async fn get_loan(&mut self, id: &str) -> StoreResult<Option<Loan>> {
        if let Some(loan) = self.loan_writes.get(id) {
            return Ok(Some(loan.clone()));
        }
        if let Some(loan) = self.loan_inserts.iter().find(|l| l.id == id) {
            return Ok(Some(loan.clone()));
        }
        let version;
        let doc;
        {
            let state = self.lock();
            match state.loans.get(id) {
                Some(entry) => {
                    version = entry.version;
                    doc = Some(entry.doc.clone());
                }
                None => {
                    version = 0;
                    doc = None;
                }
            }
        }
        self.record_read(DocKind::Loan, id, version);
        Ok(doc)
    }

    async fn find_loan_by_idempotency_key(&mut self, key: &str) -> StoreResult<Option<Loan>> {
        if let Some(loan) = self
            .loan_inserts
            .iter()
            .find(|l| l.idempotency_key.as_deref() == Some(key))
        {
            return Ok(Some(loan.clone()));
        }
        let found = {
            let state = self.lock();
            state
                .loans
                .values()
                .find(|entry| entry.doc.idempotency_key.as_deref() == Some(key))
                .map(|entry| (entry.doc.clone(), entry.version))
        };
        match found {
            Some((loan, version)) => {
                self.record_read(DocKind::LoanKey, key, version);
                Ok(Some(loan))
            }
            None => {
                self.record_read(DocKind::LoanKey, key, 0);
                Ok(None)
            }
        }
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        self.loan_inserts.push(Loan {
            id: id.clone(),
            book_id: loan.book_id.clone(),
            person_id: loan.person_id.clone(),
            borrowed_at: loan.borrowed_at,
            returned_at: None,
            active: loan.active,
            idempotency_key: loan.idempotency_key.clone(),
        });
        Ok(id)
    }

    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        if let Some(pending) = self.loan_inserts.iter_mut().find(|l| l.id == loan.id) {
            *pending = loan.clone();
            return Ok(());
        }
        self.loan_writes.insert(loan.id.clone(), loan.clone());
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Validate every recorded read against the current version before
        // touching anything.
        for ((kind, id), observed) in &self.reads {
            let current = match kind {
                DocKind::Book => state.books.get(id).map(|e| e.version),
                DocKind::Loan => state.loans.get(id).map(|e| e.version),
                DocKind::LoanKey => state
                    .loans
                    .values()
                    .find(|e| e.doc.idempotency_key.as_deref() == Some(id.as_str()))
                    .map(|e| e.version),
            }
            .unwrap_or(0);
            if current != *observed {
                return Err(StoreError::Conflict);
            }
        }

        for (id, book) in self.book_writes {
            let entry = state
                .books
                .get_mut(&id)
                .ok_or_else(|| StoreError::Backend(format!("update of missing book {id}")))?;
            entry.doc = book;
            entry.version += 1;
        }
        for (id, loan) in self.loan_writes {
            let entry = state
                .loans
                .get_mut(&id)
                .ok_or_else(|| StoreError::Backend(format!("update of missing loan {id}")))?;
            entry.doc = loan;
            entry.version += 1;
        }
        for loan in self.loan_inserts {
            state
                .loans
                .insert(loan.id.clone(), Versioned { doc: loan, version: 1 });
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            state: Arc::clone(&self.state),
            reads: HashMap::new(),
            book_writes: HashMap::new(),
            loan_writes: HashMap::new(),
            loan_inserts: Vec::new(),
        })
    }

    async fn get_book(&self, id: &str) -> StoreResult<Option<Book>> {
        Ok(self.lock().books.get(id).map(|e| e.doc.clone()))
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        Ok(self.lock().books.values().map(|e| e.doc.clone()).collect())
    }

    async fn insert_book(&self, book: &NewBook) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let doc = Book {
            id: id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year,
            description: book.description.clone(),
            image_url: book.image_url.clone(),
            copies: book.copies,
            available: book.available,
            held_by: book.held_by.clone(),
        };
        self.lock()
            .books
            .insert(id.clone(), Versioned { doc, version: 1 });
        Ok(id)
    }

    // Bibliographic fields only; circulation state belongs to transactions.
    async fn update_book(&self, id: &str, update: &UpdateBook) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.books.get_mut(id) {
            Some(entry) => {
                entry.doc.title = update.title.clone();
                entry.doc.author = update.author.clone();
                entry.doc.year = update.year;
                entry.doc.description = update.description.clone();
                entry.doc.image_url = update.image_url.clone();
                entry.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_book(&self, id: &str) -> StoreResult<bool> {
        Ok(self.lock().books.remove(id).is_some())
    }

    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>> {
        Ok(self.lock().people.get(id).map(|e| e.doc.clone()))
    }

    async fn list_people(&self) -> StoreResult<Vec<Person>> {
        Ok(self.lock().people.values().map(|e| e.doc.clone()).collect())
    }

    async fn find_people_by_name(&self, name: &str) -> StoreResult<Vec<Person>> {
        Ok(self
            .lock()
            .people
            .values()
            .filter(|e| e.doc.name == name)
            .map(|e| e.doc.clone())
            .collect())
    }

    async fn find_person_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>> {
        Ok(self
            .lock()
            .people
            .values()
            .find(|e| e.doc.national_id == national_id)
            .map(|e| e.doc.clone()))
    }

    async fn insert_person(&self, person: &NewPerson) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let doc = Person {
            id: id.clone(),
            name: person.name.clone(),
            national_id: person.national_id.clone(),
            birth_year: person.birth_year,
            password_hash: person.password_hash.clone(),
            role: person.role,
        };
        self.lock()
            .people
            .insert(id.clone(), Versioned { doc, version: 1 });
        Ok(id)
    }

    // Profile fields only; the credential hash is not writable here.
    async fn update_person(&self, id: &str, update: &UpdatePerson) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.people.get_mut(id) {
            Some(entry) => {
                entry.doc.name = update.name.clone();
                entry.doc.national_id = update.national_id.clone();
                entry.doc.birth_year = update.birth_year;
                entry.doc.role = update.role;
                entry.version += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_person(&self, id: &str) -> StoreResult<bool> {
        Ok(self.lock().people.remove(id).is_some())
    }

    async fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>> {
        Ok(self.lock().loans.get(id).map(|e| e.doc.clone()))
    }

    async fn list_loans(&self) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self.lock().loans.values().map(|e| e.doc.clone()).collect();
        loans.sort_by_key(|l| l.borrowed_at);
        Ok(loans)
    }

    async fn find_loans_by_person(&self, person_id: &str) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .lock()
            .loans
            .values()
            .filter(|e| e.doc.person_id == person_id)
            .map(|e| e.doc.clone())
            .collect();
        loans.sort_by_key(|l| l.borrowed_at);
        Ok(loans)
    }
}
