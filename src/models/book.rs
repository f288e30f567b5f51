//! Book model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Catalog entry for one title held by the library.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub description: String,
    pub image_url: String,
    /// Units currently held by the library. Never negative.
    pub copies: i32,
    /// False only while `copies == 0`; kept in sync by every mutation,
    /// not recomputed on read.
    pub available: bool,
    /// Person who took the last copy. Advisory for multi-copy titles.
    pub held_by: Option<String>,
}

/// Input for registering a new book in the catalog.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "author is required"))]
    pub author: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[validate(range(min = 0, message = "copies cannot be negative"))]
    pub copies: i32,
}

/// Bibliographic update for an existing book. Circulation fields
/// (`copies`, `available`, `heldBy`) are owned by the lending engine and
/// cannot be edited here.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "author is required"))]
    pub author: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
}

/// Row for a store-assigned insert; the backend allocates the id.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub description: String,
    pub image_url: String,
    pub copies: i32,
    pub available: bool,
    pub held_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_serializes_with_camel_case_field_names() {
        let book = Book {
            id: "b1".into(),
            title: "Cien años de soledad".into(),
            author: "García Márquez".into(),
            year: 1967,
            description: String::new(),
            image_url: String::new(),
            copies: 0,
            available: false,
            held_by: Some("p1".into()),
        };
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["imageUrl"], "");
        assert_eq!(json["heldBy"], "p1");
        assert_eq!(json["copies"], 0);
        assert_eq!(json["available"], false);
    }

    #[test]
    fn create_book_rejects_negative_copies() {
        use validator::Validate;
        let create = CreateBook {
            title: "t".into(),
            author: "a".into(),
            year: 2000,
            description: String::new(),
            image_url: String::new(),
            copies: -1,
        };
        assert!(create.validate().is_err());
    }
}
