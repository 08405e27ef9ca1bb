pub mod catalog;
pub mod client;

pub use catalog::{Catalog, CatalogEntry};
pub use client::{CatalogSource, ProviderClient, ProviderError, ProviderSettings};
