//! Membership service
//!
//! Registration, login and member maintenance. Credentials are stored as
//! argon2 hashes and checked through the verifier, never by string
//! equality.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{CreatePerson, NewPerson, Person, UpdatePerson},
    store::InventoryStore,
};

#[derive(Clone)]
pub struct MembersService<S: InventoryStore + Clone> {
    store: Arc<S>,
}

impl<S: InventoryStore + Clone> MembersService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a new member. The national id must be unique.
    pub async fn register(&self, request: CreatePerson) -> AppResult<Person> {
        request.validate()?;
        if self
            .store
            .find_person_by_national_id(&request.national_id)
            .await?
            .is_some()
        {
            return Err(AppError::Duplicate(format!(
                "a person with national id {} already exists",
                request.national_id
            )));
        }

        let password_hash = self.hash_password(&request.password)?;
        let row = NewPerson {
            name: request.name,
            national_id: request.national_id,
            birth_year: request.birth_year,
            password_hash,
            role: request.role,
        };
        let id = self.store.insert_person(&row).await?;
        tracing::info!(person_id = %id, name = %row.name, "person registered");
        Ok(Person {
            id,
            name: row.name,
            national_id: row.national_id,
            birth_year: row.birth_year,
            password_hash: row.password_hash,
            role: row.role,
        })
    }

    /// Check a name/password pair. The failure message does not reveal
    /// whether the name exists.
    pub async fn authenticate(&self, name: &str, password: &str) -> AppResult<Person> {
        let matches = self.store.find_people_by_name(name).await?;
        let person = match matches.as_slice() {
            [person] => person.clone(),
            _ => {
                return Err(AppError::Authentication(
                    "invalid name or password".to_string(),
                ))
            }
        };
        if !self.verify_password(&person.password_hash, password)? {
            return Err(AppError::Authentication(
                "invalid name or password".to_string(),
            ));
        }
        Ok(person)
    }

    pub async fn get_person(&self, id: &str) -> AppResult<Person> {
        self.store
            .get_person(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("person {id} not found")))
    }

    pub async fn list_people(&self) -> AppResult<Vec<Person>> {
        Ok(self.store.list_people().await?)
    }

    /// Apply a maintenance update to a member's profile. The password is
    /// not touched here: the store primitive leaves the credential column
    /// out of the write, so this can never put a stale hash back.
    pub async fn update_person(&self, id: &str, update: UpdatePerson) -> AppResult<Person> {
        update.validate()?;
        if !self.store.update_person(id, &update).await? {
            return Err(AppError::NotFound(format!("person {id} not found")));
        }
        tracing::info!(person_id = %id, "person updated");
        self.get_person(id).await
    }

    pub async fn delete_person(&self, id: &str) -> AppResult<()> {
        if !self.store.delete_person(id).await? {
            return Err(AppError::NotFound(format!("person {id} not found")));
        }
        tracing::info!(person_id = %id, "person deleted");
        Ok(())
    }

    /// Hash a password using Argon2
    fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, hash: &str, password: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|_| AppError::Internal("invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
