use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

type Result<T> = std::result::Result<T, ConfigError>;

/// Project-level configuration (`graphgen.yaml`): which schema files to
/// combine, which language profile to drive, and where output lands.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub schemas: Vec<PathBuf>,
    pub language: String,
    pub output: PathBuf,
}

impl ProjectConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_yaml(path.as_ref())
    }
}

/// Per-language profile (`languages/<lang>/config.yaml`).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LanguageProfile {
    /// Scalar name -> native type token.
    #[serde(default)]
    pub scalars: IndexMap<String, String>,

    /// Definition names treated as operation roots.
    #[serde(default)]
    pub roots: Vec<String>,

    /// Top-level template names, one concurrent generation unit each.
    #[serde(default)]
    pub templates: Vec<String>,

    #[serde(default)]
    pub formatter: FormatterConfig,

    /// Opaque key/value map passed through verbatim to templates.
    #[serde(default)]
    pub config: IndexMap<String, String>,
}

impl LanguageProfile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_yaml(path.as_ref())
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.roots.iter().any(|root| root == name)
    }

    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.scalars.get(name).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FormatterConfig {
    /// Formatter executable. Empty means no formatting (pass-through).
    #[serde(default)]
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::FileReadError {
            file_path: path.to_path_buf(),
            err,
        })?;
    serde_yaml::from_str(&content).map_err(|err| ConfigError::InvalidYaml {
        file_path: path.to_path_buf(),
        err,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {file_path:?}: {err}")]
    FileReadError {
        file_path: PathBuf,
        err: std::io::Error,
    },

    #[error("invalid YAML in {file_path:?}: {err}")]
    InvalidYaml {
        file_path: PathBuf,
        err: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_profile_yaml() {
        let profile: LanguageProfile = serde_yaml::from_str(concat!(
            "scalars:\n",
            "  String: string\n",
            "  ID: string\n",
            "roots: [Query, Mutation]\n",
            "templates: [definitions, adapters]\n",
            "formatter:\n",
            "  cmd: gofmt\n",
            "config:\n",
            "  package: generated\n",
        ))
        .unwrap();

        assert_eq!(profile.scalar("String"), Some("string"));
        assert!(profile.is_root("Mutation"));
        assert!(!profile.is_root("Todo"));
        assert_eq!(profile.templates, vec!["definitions", "adapters"]);
        assert_eq!(profile.formatter.cmd, "gofmt");
        assert!(profile.formatter.args.is_empty());
        assert_eq!(profile.config.get("package").unwrap(), "generated");
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let profile: LanguageProfile = serde_yaml::from_str("roots: [Query]\n").unwrap();
        assert!(profile.scalars.is_empty());
        assert!(profile.templates.is_empty());
        assert!(profile.formatter.cmd.is_empty());
    }
}
