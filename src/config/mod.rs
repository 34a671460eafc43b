mod loader;

pub use loader::{CatalogPaths, Config, PathsConfig};
