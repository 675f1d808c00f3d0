pub mod alert_repository;
pub mod database;

pub use alert_repository::SqliteAlertStore;
pub use database::Database;
