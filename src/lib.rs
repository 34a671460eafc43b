//! manifestpatch - text-preserving editor for mobile platform documents
//!
//! This library rewrites AndroidManifest.xml, Info.plist, entitlements,
//! AppDelegate.swift and Podfile so that they declare a requested set of
//! permissions and third-party service integrations, while leaving every
//! byte it does not own untouched.
//!
//! # Architecture
//!
//! 1. **Discovery** - Locate the platform documents in a project tree
//! 2. **Catalog** - Known permissions and per-service fragment templates
//! 3. **Editors** - Pure `&str -> String` rewrites per document kind
//! 4. **Extraction** - Rebuild the configured services from the documents
//! 5. **Session** - Orchestrate a save and write back changed documents

pub mod android;
pub mod applinks;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod ios;
pub mod locator;
pub mod model;
pub mod session;

pub use catalog::{Catalog, CatalogError, ServiceConfig};
pub use config::Config;
pub use discovery::{FileFinder, ProjectLayout};
pub use extract::{declared_permissions, extract_services, DocumentSources};
pub use model::{PermissionEntry, PermissionKind, PermissionValue, SaveRequest, ServiceEntry};
pub use session::{save, DocumentStore, FsStore, MemoryStore, SaveContext, SaveOutcome};
