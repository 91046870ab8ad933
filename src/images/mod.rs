pub mod fetcher;
pub mod tools;

pub use fetcher::{resolve, SkinFetcher};
pub use tools::{decode_raw, scale, FetchError, RAW_LEN, RAW_SIZE};
