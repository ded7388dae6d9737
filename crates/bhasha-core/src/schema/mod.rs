pub mod db;
pub mod migrations;

pub use db::{Database, StatusCounts};
pub use migrations::{Migration, MIGRATIONS};
