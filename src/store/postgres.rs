//! Postgres-backed inventory store
//!
//! Tables `book`, `persona` and `prestamos` hold one row per document,
//! keyed by a store-assigned uuid. Transactions run at `SERIALIZABLE`
//! isolation; serialization failures surface as [`StoreError::Conflict`]
//! so the engine can retry the whole transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use super::{InventoryStore, InventoryTx, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::models::{Book, Loan, NewBook, NewLoan, NewPerson, Person, UpdateBook, UpdatePerson};

/// Explicitly constructed, injected store handle. Cheap to clone; all
/// clones share one connection pool. Call [`PgInventoryStore::close`] on
/// shutdown.
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: Pool<Postgres>,
}

impl PgInventoryStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the schema migrations shipped with the crate.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLSTATE 40001 (serialization_failure) and 40P01 (deadlock_detected)
/// are transient contention, everything else is a backend failure.
///
/// A 23505 on the idempotency key index is also contention: two deliveries
/// of the same borrow raced past the in-transaction key lookup and the
/// loser hit the index. Retrying re-reads the key and collapses onto the
/// winner's loan.
fn map_tx_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return StoreError::Conflict;
        }
        if db.code().as_deref() == Some("23505")
            && db.constraint() == Some("prestamos_idempotency_key_idx")
        {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(err)
}

pub struct PgInventoryTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryTx for PgInventoryTx {
    async fn get_book(&mut self, id: &str) -> StoreResult<Option<Book>> {
        sqlx::query_as::<_, Book>("SELECT * FROM book WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_tx_err)
    }

    async fn update_book(&mut self, book: &Book) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE book
            SET title = $2, author = $3, year = $4, description = $5,
                image_url = $6, copies = $7, available = $8, held_by = $9
            WHERE id = $1
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year)
        .bind(&book.description)
        .bind(&book.image_url)
        .bind(book.copies)
        .bind(book.available)
        .bind(&book.held_by)
        .execute(&mut *self.tx)
        .await
        .map_err(map_tx_err)?;
        Ok(())
    }

    async fn get_loan(&mut self, id: &str) -> StoreResult<Option<Loan>> {
        sqlx::query_as::<_, Loan>("SELECT * FROM prestamos WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_tx_err)
    }

    async fn find_loan_by_idempotency_key(&mut self, key: &str) -> StoreResult<Option<Loan>> {
        sqlx::query_as::<_, Loan>("SELECT * FROM prestamos WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_tx_err)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO prestamos (id, book_id, person_id, borrowed_at, returned_at, active, idempotency_key)
            VALUES ($1, $2, $3, $4, NULL, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(&loan.book_id)
        .bind(&loan.person_id)
        .bind(loan.borrowed_at)
        .bind(loan.active)
        .bind(&loan.idempotency_key)
        .execute(&mut *self.tx)
        .await
        .map_err(map_tx_err)?;
        Ok(id)
    }

    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        sqlx::query(
            "UPDATE prestamos SET returned_at = $2, active = $3 WHERE id = $1",
        )
        .bind(&loan.id)
        .bind(loan.returned_at)
        .bind(loan.active)
        .execute(&mut *self.tx)
        .await
        .map_err(map_tx_err)?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_tx_err)
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    type Tx = PgInventoryTx;

    async fn begin(&self) -> StoreResult<PgInventoryTx> {
        let mut tx = self.pool.begin().await.map_err(map_tx_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_tx_err)?;
        Ok(PgInventoryTx { tx })
    }

    async fn get_book(&self, id: &str) -> StoreResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM book WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM book ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn insert_book(&self, book: &NewBook) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO book (id, title, author, year, description, image_url, copies, available, held_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year)
        .bind(&book.description)
        .bind(&book.image_url)
        .bind(book.copies)
        .bind(book.available)
        .bind(&book.held_by)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    // Bibliographic columns only. `copies`, `available` and `held_by` are
    // written exclusively inside transactions, so this single statement
    // cannot revert a concurrent borrow.
    async fn update_book(&self, id: &str, update: &UpdateBook) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE book
            SET title = $2, author = $3, year = $4, description = $5, image_url = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.author)
        .bind(update.year)
        .bind(&update.description)
        .bind(&update.image_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_book(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM book WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>> {
        let person = sqlx::query_as::<_, Person>("SELECT * FROM persona WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(person)
    }

    async fn list_people(&self) -> StoreResult<Vec<Person>> {
        let people = sqlx::query_as::<_, Person>("SELECT * FROM persona ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(people)
    }

    async fn find_people_by_name(&self, name: &str) -> StoreResult<Vec<Person>> {
        let people = sqlx::query_as::<_, Person>("SELECT * FROM persona WHERE name = $1")
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        Ok(people)
    }

    async fn find_person_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>> {
        let person =
            sqlx::query_as::<_, Person>("SELECT * FROM persona WHERE national_id = $1")
                .bind(national_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(person)
    }

    async fn insert_person(&self, person: &NewPerson) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO persona (id, name, national_id, birth_year, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(&person.name)
        .bind(&person.national_id)
        .bind(person.birth_year)
        .bind(&person.password_hash)
        .bind(person.role)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    // `password_hash` stays out of the statement: a profile update must
    // never write back a credential it read earlier.
    async fn update_person(&self, id: &str, update: &UpdatePerson) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE persona
            SET name = $2, national_id = $3, birth_year = $4, role = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.national_id)
        .bind(update.birth_year)
        .bind(update.role)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_person(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM persona WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_loan(&self, id: &str) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM prestamos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn list_loans(&self) -> StoreResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>("SELECT * FROM prestamos ORDER BY borrowed_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    async fn find_loans_by_person(&self, person_id: &str) -> StoreResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM prestamos WHERE person_id = $1 ORDER BY borrowed_at",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }
}
