use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for manifestpatch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit document locations, relative to the project root
    pub paths: PathsConfig,

    /// Catalog overrides
    pub catalog: CatalogPaths,

    /// Patterns to skip while discovering documents
    pub exclude: Vec<String>,

    /// Indentation unit for inserted manifest children
    pub indent: String,
}

/// Per-document path overrides. Anything left unset is discovered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub manifest: Option<PathBuf>,
    pub strings: Option<PathBuf>,
    pub plist: Option<PathBuf>,
    pub podfile: Option<PathBuf>,
    pub app_delegate: Option<PathBuf>,
    pub entitlements: Option<PathBuf>,
    pub asset_links: Option<PathBuf>,
    pub apple_app_site_association: Option<PathBuf>,
    pub xcode_project: Option<PathBuf>,
}

/// Catalog files replacing the built-in copies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPaths {
    pub services: Option<PathBuf>,
    pub android_permissions: Option<PathBuf>,
    pub ios_permissions: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            catalog: CatalogPaths::default(),
            exclude: vec![
                "**/build/**".to_string(),
                "**/Pods/**".to_string(),
                "**/.gradle/**".to_string(),
                "**/.idea/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/DerivedData/**".to_string(),
            ],
            indent: "    ".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".manifestpatch.yml",
            ".manifestpatch.yaml",
            ".manifestpatch.toml",
            "manifestpatch.yml",
            "manifestpatch.yaml",
            "manifestpatch.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // No config file found, use defaults
        Ok(Self::default())
    }

    /// Check if a pattern matches for exclusion
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|pattern| glob_match(pattern, &path_str))
    }
}

/// Simple glob matching for patterns like "**/build/**" or "*.xcodeproj"
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        // "*.xcodeproj" matches "Runner.xcodeproj"
        return text.ends_with(&pattern[1..]);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }

    if pattern.contains("**") {
        let cleaned = pattern.replace("**/", "").replace("/**", "");

        // "**/build/**" must match a whole directory name, "/buildSrc/" does not count
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let dir_name = cleaned.trim_matches('/');
            let dir_pattern = format!("/{}/", dir_name);
            return text.contains(&dir_pattern) || text.starts_with(&format!("{}/", dir_name));
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }

            if prefix.is_empty() {
                return text.ends_with(suffix) || text.contains(&format!("/{}", suffix));
            }

            if suffix.is_empty() {
                return text.starts_with(prefix) || text.contains(&format!("{}/", prefix));
            }

            return (text.starts_with(prefix) || text.contains(&format!("/{}/", prefix)))
                && (text.ends_with(suffix) || text.contains(&format!("/{}", suffix)));
        }
    }

    text == pattern
}
