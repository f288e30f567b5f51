//! Lending transaction engine
//!
//! Borrow and Return execute as single store transactions: the
//! availability check, the loan write and the copy-count adjustment either
//! all apply or none do. No in-process locks are involved; correctness of
//! the `copies >= 0` invariant rests entirely on the store's transaction
//! primitive, and conflicted transactions are retried whole a bounded
//! number of times before `TransactionConflict` reaches the caller.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{BorrowRequest, Loan, NewLoan},
    store::{InventoryStore, InventoryTx},
};

#[derive(Clone)]
pub struct LendingService<S: InventoryStore + Clone> {
    store: Arc<S>,
    transaction_retries: u32,
}

impl<S: InventoryStore + Clone> LendingService<S> {
    pub fn new(store: Arc<S>, config: LendingConfig) -> Self {
        Self {
            store,
            transaction_retries: config.transaction_retries,
        }
    }

    /// Borrow one copy of a book for an already-resolved person.
    ///
    /// Returns the new loan id. When the request carries an idempotency
    /// key that an earlier borrow already stored, the existing loan id is
    /// returned and nothing is written.
    pub async fn borrow(&self, request: &BorrowRequest) -> AppResult<String> {
        if request.person_id.trim().is_empty() {
            return Err(AppError::IdentityMissing);
        }
        if request.book_id.trim().is_empty() {
            return Err(AppError::Validation("bookId is required".to_string()));
        }

        let mut attempt = 0;
        loop {
            match self.try_borrow(request).await {
                Err(AppError::TransactionConflict) if attempt < self.transaction_retries => {
                    attempt += 1;
                    tracing::debug!(
                        book_id = %request.book_id,
                        attempt,
                        "borrow transaction conflicted, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_borrow(&self, request: &BorrowRequest) -> AppResult<String> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        // Duplicate delivery of an already-applied borrow: collapse onto
        // the original loan. Checked inside the transaction so the lookup
        // and the insert below cannot interleave with another delivery.
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = tx.find_loan_by_idempotency_key(key).await? {
                tracing::debug!(loan_id = %existing.id, "borrow collapsed onto existing loan");
                return Ok(existing.id);
            }
        }

        let mut book = tx
            .get_book(&request.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {} not found", request.book_id)))?;

        // Abort before any write; the dropped transaction leaves no trace.
        if book.copies <= 0 {
            return Err(AppError::Unavailable(book.id));
        }

        let loan_id = tx
            .insert_loan(&NewLoan {
                book_id: request.book_id.clone(),
                person_id: request.person_id.clone(),
                borrowed_at: now,
                active: true,
                idempotency_key: request.idempotency_key.clone(),
            })
            .await?;

        book.copies -= 1;
        if book.copies == 0 {
            book.available = false;
            book.held_by = Some(request.person_id.clone());
        }
        tx.update_book(&book).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            book_id = %request.book_id,
            person_id = %request.person_id,
            "loan created"
        );
        Ok(loan_id)
    }

    /// Close a loan and put the copy back on the shelf.
    ///
    /// `book_id` is redundant with the loan's own field and is validated
    /// to match rather than trusted.
    pub async fn return_loan(&self, loan_id: &str, book_id: &str) -> AppResult<()> {
        let mut attempt = 0;
        loop {
            match self.try_return(loan_id, book_id).await {
                Err(AppError::TransactionConflict) if attempt < self.transaction_retries => {
                    attempt += 1;
                    tracing::debug!(
                        loan_id,
                        attempt,
                        "return transaction conflicted, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_return(&self, loan_id: &str, book_id: &str) -> AppResult<()> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut loan = tx
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("loan {loan_id} not found")))?;
        if loan.book_id != book_id {
            return Err(AppError::Validation(format!(
                "loan {loan_id} does not reference book {book_id}"
            )));
        }
        if !loan.active {
            return Err(AppError::AlreadyReturned(loan.id));
        }

        loan.active = false;
        loan.returned_at = Some(now);
        tx.update_loan(&loan).await?;

        let mut book = tx
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {book_id} not found")))?;
        book.copies += 1;
        if !book.available {
            // This return restores the first unit.
            book.available = true;
            book.held_by = None;
        }
        tx.update_book(&book).await?;
        tx.commit().await?;

        tracing::info!(loan_id, book_id, "loan returned");
        Ok(())
    }

    /// Full lending history, oldest first. The loan collection is an
    /// append-only audit trail, so this includes closed loans.
    pub async fn list_loans(&self) -> AppResult<Vec<Loan>> {
        Ok(self.store.list_loans().await?)
    }

    /// Lending history for one person, oldest first.
    pub async fn loans_for_person(&self, person_id: &str) -> AppResult<Vec<Loan>> {
        Ok(self.store.find_loans_by_person(person_id).await?)
    }
}
