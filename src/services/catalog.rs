//! Catalog service
//!
//! Book browsing plus the registration and maintenance flows that live
//! outside the lending engine. Listing and search are not transactional:
//! they read whatever the store returns and filter client-side, so a
//! stale copy count during browsing is acceptable.

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Book, CreateBook, NewBook, UpdateBook},
    store::InventoryStore,
};

#[derive(Clone)]
pub struct CatalogService<S: InventoryStore + Clone> {
    store: Arc<S>,
}

impl<S: InventoryStore + Clone> CatalogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List all books, optionally filtered by a case-insensitive
    /// substring match on title or author. Never mutates.
    pub async fn list_books(&self, search: Option<&str>) -> AppResult<Vec<Book>> {
        let books = self.store.list_books().await?;
        let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(books);
        };
        let needle = term.to_lowercase();
        Ok(books
            .into_iter()
            .filter(|book| {
                book.title.to_lowercase().contains(&needle)
                    || book.author.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn get_book(&self, id: &str) -> AppResult<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {id} not found")))
    }

    /// Register a new book. Availability starts in sync with the copy
    /// count; from here on only the lending engine adjusts it.
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let row = NewBook {
            title: book.title,
            author: book.author,
            year: book.year,
            description: book.description,
            image_url: book.image_url,
            copies: book.copies,
            available: book.copies > 0,
            held_by: None,
        };
        let id = self.store.insert_book(&row).await?;
        tracing::info!(book_id = %id, title = %row.title, "book registered");
        Ok(Book {
            id,
            title: row.title,
            author: row.author,
            year: row.year,
            description: row.description,
            image_url: row.image_url,
            copies: row.copies,
            available: row.available,
            held_by: None,
        })
    }

    /// Edit bibliographic fields. Circulation state (`copies`,
    /// `available`, `heldBy`) is owned by the lending engine and is out of
    /// this write's reach entirely: the store primitive sets only the
    /// bibliographic columns, so an edit racing a borrow cannot revert the
    /// borrow's copy count.
    pub async fn update_book(&self, id: &str, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;
        if !self.store.update_book(id, &update).await? {
            return Err(AppError::NotFound(format!("book {id} not found")));
        }
        tracing::info!(book_id = %id, "book updated");
        self.get_book(id).await
    }

    pub async fn delete_book(&self, id: &str) -> AppResult<()> {
        if !self.store.delete_book(id).await? {
            return Err(AppError::NotFound(format!("book {id} not found")));
        }
        tracing::info!(book_id = %id, "book deleted");
        Ok(())
    }
}
