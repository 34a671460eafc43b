use crate::config::{Config, PathsConfig};
use ignore::WalkBuilder;
use miette::{miette, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Kind of document the editors work on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Manifest,
    Strings,
    Plist,
    Podfile,
    AppDelegate,
    Entitlements,
    AssetLinks,
    SiteAssociation,
    XcodeProject,
}

impl DocumentKind {
    /// Determine document kind from path
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("");

        match file_name {
            "AndroidManifest.xml" => Some(DocumentKind::Manifest),
            "strings.xml" if parent == "values" => Some(DocumentKind::Strings),
            "Info.plist" => Some(DocumentKind::Plist),
            "Podfile" => Some(DocumentKind::Podfile),
            "AppDelegate.swift" => Some(DocumentKind::AppDelegate),
            "assetlinks.json" => Some(DocumentKind::AssetLinks),
            "apple-app-site-association" | "apple-app-site-association.json" => {
                Some(DocumentKind::SiteAssociation)
            }
            "project.pbxproj" => Some(DocumentKind::XcodeProject),
            name if name.ends_with(".entitlements") => Some(DocumentKind::Entitlements),
            _ => None,
        }
    }

    /// How well `path` fits this kind when several files match; higher wins.
    fn preference(&self, path: &Path) -> i32 {
        let path_str = path.to_string_lossy().replace('\\', "/");
        let bonus = match self {
            DocumentKind::Manifest | DocumentKind::Strings if path_str.contains("/src/main/") => 100,
            DocumentKind::Plist | DocumentKind::AppDelegate | DocumentKind::Entitlements
                if path_str.contains("/Runner/") =>
            {
                100
            }
            DocumentKind::XcodeProject if path_str.contains("/Runner.xcodeproj/") => 100,
            _ => 0,
        };
        // Shallower paths win among equals
        bonus - path.components().count() as i32
    }
}

/// Where each document lives. `None` means the project has no such file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub manifest: Option<PathBuf>,
    pub strings: Option<PathBuf>,
    pub plist: Option<PathBuf>,
    pub podfile: Option<PathBuf>,
    pub app_delegate: Option<PathBuf>,
    pub entitlements: Option<PathBuf>,
    pub asset_links: Option<PathBuf>,
    pub site_association: Option<PathBuf>,
    pub xcode_project: Option<PathBuf>,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    fn slot(&mut self, kind: DocumentKind) -> &mut Option<PathBuf> {
        match kind {
            DocumentKind::Manifest => &mut self.manifest,
            DocumentKind::Strings => &mut self.strings,
            DocumentKind::Plist => &mut self.plist,
            DocumentKind::Podfile => &mut self.podfile,
            DocumentKind::AppDelegate => &mut self.app_delegate,
            DocumentKind::Entitlements => &mut self.entitlements,
            DocumentKind::AssetLinks => &mut self.asset_links,
            DocumentKind::SiteAssociation => &mut self.site_association,
            DocumentKind::XcodeProject => &mut self.xcode_project,
        }
    }

    /// Explicit configured paths replace discovered ones.
    pub fn apply_overrides(&mut self, paths: &PathsConfig) {
        let overrides = [
            (DocumentKind::Manifest, &paths.manifest),
            (DocumentKind::Strings, &paths.strings),
            (DocumentKind::Plist, &paths.plist),
            (DocumentKind::Podfile, &paths.podfile),
            (DocumentKind::AppDelegate, &paths.app_delegate),
            (DocumentKind::Entitlements, &paths.entitlements),
            (DocumentKind::AssetLinks, &paths.asset_links),
            (DocumentKind::SiteAssociation, &paths.apple_app_site_association),
            (DocumentKind::XcodeProject, &paths.xcode_project),
        ];
        for (kind, path) in overrides {
            if let Some(path) = path {
                let full = self.root.join(path);
                *self.slot(kind) = Some(full);
            }
        }
    }

    /// Entitlements file to write: the existing one, else `Runner.entitlements`
    /// beside Info.plist.
    pub fn entitlements_target(&self) -> Option<PathBuf> {
        self.entitlements.clone().or_else(|| {
            self.plist
                .as_ref()
                .and_then(|p| p.parent())
                .map(|dir| dir.join("Runner.entitlements"))
        })
    }
}

/// File finder for locating the platform documents in a project
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find every document kind under `root`, then apply configured paths.
    pub fn discover(&self, root: &Path) -> Result<ProjectLayout> {
        if !root.is_dir() {
            return Err(miette!("Project directory not found: {}", root.display()));
        }
        debug!("Scanning for documents in: {}", root.display());

        let mut layout = ProjectLayout::new(root);
        let mut best: Vec<(DocumentKind, PathBuf, i32)> = Vec::new();

        for (kind, path) in self.scan_directory(root) {
            let score = kind.preference(&path);
            match best.iter_mut().find(|(k, _, _)| *k == kind) {
                Some(slot) if slot.2 >= score => {}
                Some(slot) => *slot = (kind, path, score),
                None => best.push((kind, path, score)),
            }
        }

        for (kind, path, _) in best {
            trace!("Using {:?}: {}", kind, path.display());
            *layout.slot(kind) = Some(path);
        }
        layout.apply_overrides(&self.config.paths);

        Ok(layout)
    }

    /// Walk `dir` and classify every file
    fn scan_directory(&self, dir: &Path) -> Vec<(DocumentKind, PathBuf)> {
        // `.well-known/` holds the link association files, so hidden
        // directories are walked and `.git` is skipped by hand
        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .follow_links(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();

                if self.config.should_exclude(path) {
                    trace!("Excluding: {}", path.display());
                    return None;
                }

                let kind = DocumentKind::from_path(path)?;
                Some((kind, path.to_path_buf()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_document_kind_from_path() {
        assert_eq!(
            DocumentKind::from_path(Path::new("android/app/src/main/AndroidManifest.xml")),
            Some(DocumentKind::Manifest)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("app/src/main/res/values/strings.xml")),
            Some(DocumentKind::Strings)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("app/src/main/res/values-fr/strings.xml")),
            None
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("ios/Runner/Runner.entitlements")),
            Some(DocumentKind::Entitlements)
        );
        assert_eq!(DocumentKind::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn test_discover_prefers_main_sources() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "android/app/src/debug/AndroidManifest.xml");
        touch(root, "android/app/src/main/AndroidManifest.xml");
        touch(root, "ios/Runner/Info.plist");
        touch(root, "ios/RunnerTests/Info.plist");
        touch(root, "ios/Pods/Firebase/Info.plist");
        touch(root, "ios/Podfile");
        touch(root, "web/.well-known/assetlinks.json");

        let config = Config::default();
        let layout = FileFinder::new(&config).discover(root).unwrap();

        assert_eq!(layout.manifest, Some(root.join("android/app/src/main/AndroidManifest.xml")));
        assert_eq!(layout.plist, Some(root.join("ios/Runner/Info.plist")));
        assert_eq!(layout.podfile, Some(root.join("ios/Podfile")));
        assert_eq!(layout.asset_links, Some(root.join("web/.well-known/assetlinks.json")));
        assert_eq!(layout.app_delegate, None);
        assert_eq!(layout.entitlements_target(), Some(root.join("ios/Runner/Runner.entitlements")));
    }

    #[test]
    fn test_configured_paths_win() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "android/app/src/main/AndroidManifest.xml");

        let mut config = Config::default();
        config.paths.manifest = Some(PathBuf::from("custom/AndroidManifest.xml"));
        let layout = FileFinder::new(&config).discover(root).unwrap();
        assert_eq!(layout.manifest, Some(root.join("custom/AndroidManifest.xml")));
    }

    #[test]
    fn test_missing_root_is_error() {
        let config = Config::default();
        assert!(FileFinder::new(&config).discover(Path::new("/definitely/not/here")).is_err());
    }
}
