pub mod bitmap;

pub use self::bitmap::{Image, Outcome};
