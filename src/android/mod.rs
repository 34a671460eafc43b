//! AndroidManifest.xml and string-resource editors.

pub mod manifest;
pub mod services;
pub mod strings;

pub use manifest::{declared_android_permissions, normalize_permission_names, package_name, update_manifest};
pub use services::AndroidDocuments;
