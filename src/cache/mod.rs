pub mod loading;

pub use loading::LoadingCache;
