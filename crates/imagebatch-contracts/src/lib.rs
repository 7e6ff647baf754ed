pub mod error;
pub mod events;
pub mod records;
pub mod sizes;
pub mod styles;

pub use error::{BatchError, Result};
