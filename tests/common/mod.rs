#![allow(dead_code)]

use std::sync::Arc;

use prestamos_server::{
    config::LendingConfig,
    models::{Book, CreateBook, CreatePerson, Person, Role},
    services::Services,
    store::MemoryStore,
};

/// Services over a fresh in-memory store. The retry bound is generous so
/// contention tests never exhaust it by accident.
pub fn services() -> (Arc<MemoryStore>, Services<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let services = Services::new(
        Arc::clone(&store),
        LendingConfig {
            transaction_retries: 16,
        },
    );
    (store, services)
}

pub async fn seed_book(
    services: &Services<MemoryStore>,
    title: &str,
    author: &str,
    copies: i32,
) -> Book {
    services
        .catalog
        .create_book(CreateBook {
            title: title.to_string(),
            author: author.to_string(),
            year: 1950,
            description: String::new(),
            image_url: String::new(),
            copies,
        })
        .await
        .expect("seed book")
}

pub async fn seed_person(services: &Services<MemoryStore>, name: &str) -> Person {
    services
        .members
        .register(CreatePerson {
            name: name.to_string(),
            national_id: format!("nid-{name}"),
            birth_year: 1990,
            password: "secret".to_string(),
            role: Role::Member,
        })
        .await
        .expect("seed person")
}
