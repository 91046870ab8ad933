pub mod cache;
pub mod config;
pub mod images;
pub mod models;
pub mod repository;

pub use models::{Image, Outcome};
pub use repository::{RepositoryError, SkinRepository};
