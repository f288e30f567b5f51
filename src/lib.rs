//! Prestamos - library loan tracking backend
//!
//! Catalog browsing, member registration and the lending transaction
//! engine for a small library, backed by a document store that provides
//! atomic multi-document transactions. The presentation layer (routing,
//! pages, cookies) lives outside this crate and calls into [`services`],
//! mapping each [`AppError`] kind onto a user-facing message.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
