//! Person (member) model and related types

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Membership role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "person_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// A registered library member.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    /// Display name, also used as the login key. Unique by convention,
    /// not enforced by the store.
    pub name: String,
    pub national_id: String,
    pub birth_year: i32,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
}

/// Registration input. The password arrives in clear and is hashed before
/// it reaches the store.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePerson {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "national id is required"))]
    pub national_id: String,
    #[serde(deserialize_with = "birth_year_from_int_or_text")]
    pub birth_year: i32,
    #[validate(length(min = 4, message = "password must be at least 4 characters"))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Member
}

/// Profile update applied by membership maintenance flows.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePerson {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "national id is required"))]
    pub national_id: String,
    #[serde(deserialize_with = "birth_year_from_int_or_text")]
    pub birth_year: i32,
    pub role: Role,
}

/// Row for a store-assigned insert; the backend allocates the id.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub name: String,
    pub national_id: String,
    pub birth_year: i32,
    pub password_hash: String,
    pub role: Role,
}

/// Older records encoded the birth year as text; the canonical
/// representation is an integer, normalized here at the boundary.
fn birth_year_from_int_or_text<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum YearRepr {
        Int(i32),
        Text(String),
    }

    match YearRepr::deserialize(deserializer)? {
        YearRepr::Int(year) => Ok(year),
        YearRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("birthYear must be numeric")),
    }
}
