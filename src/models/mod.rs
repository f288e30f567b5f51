//! Domain models

pub mod book;
pub mod loan;
pub mod person;

// Re-export commonly used types
pub use book::{Book, CreateBook, NewBook, UpdateBook};
pub use loan::{BorrowRequest, Loan, NewLoan};
pub use person::{CreatePerson, NewPerson, Person, Role, UpdatePerson};
