pub mod auth;
pub mod categories;
pub mod common;
pub mod inventory;
pub mod products;
pub mod reports;
pub mod transactions;
pub mod users;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
