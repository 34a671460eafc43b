//! Info.plist, entitlements, AppDelegate.swift and Podfile editors.

pub mod app_delegate;
pub mod plist;
pub mod podfile;
pub mod services;

pub use plist::{declared_plist_permissions, remove_plist_keys, update_plist};
pub use podfile::{patch_podfile, required_macros, PodfileError};
pub use services::IosDocuments;
