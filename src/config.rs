//! # Project Configuration
//!
//! A project is described by a YAML configuration file (conventionally
//! `modbuild.yaml`) naming the repositories to load, the modules to
//! build, option assignments and the output path. Configurations can
//! extend other configurations; the extending file is parsed after its
//! bases, so its entries win whenever both assign the same option.
//!
//! All paths in a configuration are resolved relative to the file that
//! contains them, so an inherited base configuration keeps working no
//! matter where the extending file lives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::descriptor::scalar_to_string;
use crate::error::{Error, Result};

/// A version-control mirror entry, reported by `init` and `update`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VcsEntry {
    /// The tool managing the mirror, e.g. `git`.
    pub tool: String,
    pub url: String,
    /// Checkout location relative to the configuration file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// On-disk shape of one configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    extends: Vec<PathBuf>,
    #[serde(default)]
    repositories: Vec<PathBuf>,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default)]
    options: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    outpath: Option<PathBuf>,
    #[serde(default)]
    vcs: Vec<VcsEntry>,
}

/// The merged result of a configuration file and everything it extends.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub filename: Option<PathBuf>,
    /// Repository descriptor files, resolved to absolute paths.
    pub repositories: Vec<PathBuf>,
    /// Requested module names, possibly partial.
    pub modules: Vec<String>,
    /// Option assignments in merge order; a later entry for the same
    /// name wins.
    pub options: Vec<(String, String)>,
    pub outpath: Option<PathBuf>,
    pub vcs: Vec<VcsEntry>,
}

impl Configuration {
    /// Parse a configuration file, following its `extends` chain.
    pub fn parse(path: &Path) -> Result<Self> {
        let mut stack = Vec::new();
        Self::parse_inner(path, &mut stack)
    }

    fn parse_inner(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Self> {
        let canonical = path.canonicalize().map_err(|error| Error::Config {
            message: format!("Cannot read configuration '{}': {error}", path.display()),
            hint: None,
        })?;
        if stack.contains(&canonical) {
            return Err(Error::Config {
                message: format!(
                    "Circular 'extends' chain through '{}'",
                    canonical.display()
                ),
                hint: None,
            });
        }
        stack.push(canonical.clone());
        debug!("parsing configuration {}", canonical.display());

        let content = std::fs::read_to_string(&canonical)?;
        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|error| Error::Config {
            message: format!("Malformed configuration '{}': {error}", path.display()),
            hint: None,
        })?;
        let base_dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

        // bases first, so this file's entries override theirs
        let mut merged = Configuration::default();
        for base in &file.extends {
            let inherited = Self::parse_inner(&base_dir.join(base), stack)?;
            merged.absorb(inherited);
        }

        merged.filename = Some(canonical.clone());
        merged
            .repositories
            .extend(file.repositories.iter().map(|p| base_dir.join(p)));
        merged.modules.extend(file.modules.iter().cloned());
        for (name, value) in &file.options {
            merged.options.push((name.clone(), scalar_to_string(value)));
        }
        if let Some(outpath) = &file.outpath {
            merged.outpath = Some(base_dir.join(outpath));
        }
        merged.vcs.extend(file.vcs.iter().cloned());

        stack.pop();
        Ok(merged)
    }

    fn absorb(&mut self, other: Configuration) {
        self.repositories.extend(other.repositories);
        self.modules.extend(other.modules);
        self.options.extend(other.options);
        if other.outpath.is_some() {
            self.outpath = other.outpath;
        }
        self.vcs.extend(other.vcs);
    }

    /// Append `NAME=VALUE` option definitions from the command line.
    /// They are appended last, so they override every file-based
    /// assignment.
    pub fn add_commandline_options<'a, I>(&mut self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for definition in definitions {
            let (name, value) = definition.split_once('=').ok_or_else(|| Error::Argument {
                message: format!(
                    "Invalid option definition '{definition}', expected 'NAME=VALUE'"
                ),
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Argument {
                    message: format!("Empty option name in '{definition}'"),
                });
            }
            self.options.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Final option assignments with later entries overriding earlier
    /// ones.
    pub fn option_map(&self) -> BTreeMap<String, String> {
        self.options
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// The directory of the configuration file.
    pub fn base_dir(&self) -> PathBuf {
        self.filename
            .as_ref()
            .and_then(|f| f.parent().map(Path::to_path_buf))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_minimal_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modbuild.yaml");
        fs::write(
            &path,
            r#"
repositories:
  - repo/repo.yaml
modules:
  - "repo:uart"
options:
  "repo:target": f4
  "repo:uart:baudrate": 115200
outpath: generated
"#,
        )
        .unwrap();

        let config = Configuration::parse(&path).unwrap();
        assert_eq!(config.repositories.len(), 1);
        assert!(config.repositories[0].ends_with("repo/repo.yaml"));
        assert_eq!(config.modules, vec!["repo:uart"]);
        assert_eq!(
            config.option_map().get("repo:uart:baudrate"),
            Some(&"115200".to_string())
        );
        assert!(config.outpath.unwrap().ends_with("generated"));
    }

    #[test]
    fn test_extends_merges_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.yaml"),
            r#"
repositories:
  - repo/repo.yaml
modules:
  - "repo:core"
options:
  "repo:target": f4
outpath: base-out
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("project.yaml"),
            r#"
extends:
  - base.yaml
modules:
  - "repo:uart"
options:
  "repo:target": f7
"#,
        )
        .unwrap();

        let config = Configuration::parse(&dir.path().join("project.yaml")).unwrap();
        assert_eq!(config.modules, vec!["repo:core", "repo:uart"]);
        // the extending file wins
        assert_eq!(
            config.option_map().get("repo:target"),
            Some(&"f7".to_string())
        );
        // outpath inherited from the base
        assert!(config.outpath.unwrap().ends_with("base-out"));
    }

    #[test]
    fn test_circular_extends_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "extends: [b.yaml]\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "extends: [a.yaml]\n").unwrap();

        let error = Configuration::parse(&dir.path().join("a.yaml")).unwrap_err();
        assert!(error.to_string().contains("Circular"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = Configuration::parse(Path::new("/nonexistent/modbuild.yaml")).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/modbuild.yaml"));
    }

    #[test]
    fn test_commandline_options_override_file() {
        let mut config = Configuration::default();
        config
            .options
            .push(("repo:target".to_string(), "f4".to_string()));
        config
            .add_commandline_options(["repo:target=f7", "repo:uart:baudrate=9600"])
            .unwrap();

        let map = config.option_map();
        assert_eq!(map.get("repo:target"), Some(&"f7".to_string()));
        assert_eq!(map.get("repo:uart:baudrate"), Some(&"9600".to_string()));
    }

    #[test]
    fn test_malformed_definition_rejected() {
        let mut config = Configuration::default();
        let error = config.add_commandline_options(["no-equals"]).unwrap_err();
        assert!(matches!(error, Error::Argument { .. }));
        let error = config.add_commandline_options(["=value"]).unwrap_err();
        assert!(matches!(error, Error::Argument { .. }));
    }
}
