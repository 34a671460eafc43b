mod file_finder;

pub use file_finder::{DocumentKind, FileFinder, ProjectLayout};
