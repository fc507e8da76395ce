//! Project configuration (`fthtmlconfig.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "fthtmlconfig.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Can not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Settings shared by every document of a project.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Base directory for `import` statements.
    pub import_dir: Option<PathBuf>,
    /// Base directory for `json(...)` files.
    pub json_dir: Option<PathBuf>,
    pub globalvars: BTreeMap<String, serde_json::Value>,
    /// Template name → template source, e.g. `"a(href='${val}')"`.
    #[serde(alias = "tinytemplates")]
    pub global_tiny_templates: BTreeMap<String, String>,
    /// Glob patterns of files that are never checked.
    pub exclude: Vec<String>,
    /// Formatter settings, passed through untouched.
    pub format: Option<serde_json::Value>,
    /// Directory the configuration was loaded from.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.root = path.parent().map(Path::to_path_buf);
        debug!(path = %path.display(), "loaded project configuration");
        Ok(config)
    }

    /// Look for a configuration file in `start` and each of its ancestors.
    pub fn discover(start: &Path) -> Result<Option<Self>, ConfigError> {
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Self::load(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    pub fn import_dir(&self) -> Option<PathBuf> {
        self.import_dir.as_deref().map(|dir| self.resolve(dir))
    }

    pub fn json_dir(&self) -> Option<PathBuf> {
        self.json_dir.as_deref().map(|dir| self.resolve(dir))
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        match &self.root {
            Some(root) if dir.is_relative() => root.join(dir),
            _ => dir.to_path_buf(),
        }
    }

    pub fn exclusions(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|source| ConfigError::Glob {
            pattern: self.exclude.join(", "),
            source,
        })
    }

    /// Whether `path` matches one of the `exclude` globs. Paths under the
    /// configuration root are matched relative to it.
    pub fn is_excluded(&self, path: &Path) -> Result<bool, ConfigError> {
        if self.exclude.is_empty() {
            return Ok(false);
        }
        let set = self.exclusions()?;
        let relative = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        Ok(set.is_match(relative) || set.is_match(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_json_camel_case() {
        let config = ProjectConfig::from_json(
            r#"{
                "importDir": "templates",
                "jsonDir": "data",
                "globalvars": { "site": "Example", "year": 2024 },
                "globalTinyTemplates": { "bold": "b" },
                "exclude": ["drafts/**"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.import_dir, Some(PathBuf::from("templates")));
        assert_eq!(config.json_dir, Some(PathBuf::from("data")));
        assert_eq!(config.globalvars["year"], serde_json::json!(2024));
        assert_eq!(config.global_tiny_templates["bold"], "b");
    }

    #[test]
    fn test_legacy_tinytemplates_key() {
        let config = ProjectConfig::from_json(r#"{ "tinytemplates": { "i": "em" } }"#).unwrap();
        assert_eq!(config.global_tiny_templates["i"], "em");
    }

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::from_json("{}").unwrap();
        assert!(config.import_dir.is_none());
        assert!(config.exclude.is_empty());
        assert!(!config.is_excluded(Path::new("a.fthtml")).unwrap());
    }

    #[test]
    fn test_load_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "importDir": "partials" }"#).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.import_dir(), Some(dir.path().join("partials")));
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{}").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = ProjectConfig::discover(&nested).unwrap().unwrap();
        assert_eq!(config.root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ nope").unwrap();
        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn test_exclusions_relative_to_root() {
        let mut config = ProjectConfig::from_json(r#"{ "exclude": ["drafts/**"] }"#).unwrap();
        config.root = Some(PathBuf::from("/site"));
        assert!(config.is_excluded(Path::new("/site/drafts/a.fthtml")).unwrap());
        assert!(!config.is_excluded(Path::new("/site/pages/a.fthtml")).unwrap());
    }

    #[test]
    fn test_bad_glob() {
        let config = ProjectConfig::from_json(r#"{ "exclude": ["a[" ] }"#).unwrap();
        assert!(matches!(
            config.is_excluded(Path::new("x")),
            Err(ConfigError::Glob { .. })
        ));
    }
}
