mod catalog;
mod resolver;

pub use catalog::{parse_dims, SizeCatalog, SupportedSize};
pub use resolver::{SizeResolution, SizeResolver};
