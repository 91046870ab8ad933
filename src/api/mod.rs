pub mod error;
pub mod skins;

pub use error::ApiError;
