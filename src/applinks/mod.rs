//! App links (Android) and universal links (iOS).
//!
//! This is the one service the generic catalog fragments cannot express: a
//! single free-text `domains` field fans out into verified-host intent
//! filters, custom-scheme intent filters, associated-domain entitlements and
//! URL schemes. It is special-cased here instead of inside the catalog
//! routines.

pub mod android;
pub mod ios;

use crate::ios::services::split_list;
use crate::model::ServiceEntry;

/// Catalog id of the app-links service
pub const SERVICE_ID: &str = "applinks";

/// Field holding the free-text domain and scheme list
pub const DOMAINS_FIELD: &str = "domains";

/// Hosts and custom schemes parsed from the `domains` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTargets {
    /// Verified `https` hosts, lowercase
    pub hosts: Vec<String>,

    /// Custom URL schemes without `://`
    pub schemes: Vec<String>,
}

impl LinkTargets {
    /// Parse a comma, semicolon or whitespace separated list.
    ///
    /// `http(s)://host/path` contributes its host, `other://` contributes a
    /// custom scheme, and bare tokens are hosts. Duplicates are dropped.
    pub fn parse(text: &str) -> Self {
        let mut targets = LinkTargets::default();

        for token in split_list(text) {
            let token = token.to_ascii_lowercase();
            match token.split_once("://") {
                Some((scheme, rest)) if scheme == "http" || scheme == "https" => {
                    targets.push_host(host_of(rest));
                }
                Some((scheme, _)) => targets.push_scheme(scheme),
                None => targets.push_host(host_of(&token)),
            }
        }

        targets
    }

    pub fn from_entry(entry: &ServiceEntry) -> Self {
        entry.value(DOMAINS_FIELD).map(Self::parse).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.schemes.is_empty()
    }

    /// Render back into the `domains` field format.
    pub fn to_field_text(&self) -> String {
        self.hosts
            .iter()
            .cloned()
            .chain(self.schemes.iter().map(|s| format!("{}://", s)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn push_host(&mut self, host: &str) {
        let host = host.trim().to_ascii_lowercase();
        if !host.is_empty() && !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
    }

    pub fn push_scheme(&mut self, scheme: &str) {
        let scheme = scheme.trim().to_ascii_lowercase();
        if !scheme.is_empty() && !self.schemes.contains(&scheme) {
            self.schemes.push(scheme);
        }
    }
}

fn host_of(text: &str) -> &str {
    let end = text.find(['/', '?', '#']).unwrap_or(text.len());
    &text[..end]
}
