use std::path::Path;
use std::path::PathBuf;
use tera::Tera;
use thiserror::Error;

type Result<T> = std::result::Result<T, TemplateError>;

const TEMPLATE_EXT: &str = "tmpl";

/// The raw template sources for one language, keyed by file stem.
/// Entry-point templates (named in the language profile) and fragment
/// templates (`NativeObject`, `SchemaList`, ...) live side by side in
/// the language directory.
///
/// Kept as sources rather than a live engine so every generation unit
/// can build its own `Tera` instance with its own function bindings --
/// the shared base set is never mutated after loading.
#[derive(Clone, Debug, Default)]
pub struct TemplateSet {
    sources: Vec<(String, String)>,
}

impl TemplateSet {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|err| TemplateError::DirReadError {
            dir: dir.to_path_buf(),
            err,
        })?;

        let mut sources = vec![];
        for entry in entries {
            let entry = entry.map_err(|err| TemplateError::DirReadError {
                dir: dir.to_path_buf(),
                err,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXT) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content =
                std::fs::read_to_string(&path).map_err(|err| TemplateError::FileReadError {
                    file_path: path.clone(),
                    err,
                })?;
            sources.push((name.to_string(), content));
        }
        // Directory iteration order is platform-dependent.
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        if sources.is_empty() {
            return Err(TemplateError::NoTemplatesFound {
                dir: dir.to_path_buf(),
            });
        }
        Ok(Self { sources })
    }

    pub fn from_sources(
        sources: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|(name, content)| (name.into(), content.into()))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.iter().any(|(n, _)| n == name)
    }

    /// A bare engine over these sources: no functions registered,
    /// autoescaping off (this is a code generator, not an HTML
    /// renderer). Callers register the function surface they need.
    pub fn build_engine(&self) -> Result<Tera> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        for (name, content) in &self.sources {
            tera.add_raw_template(name, content)
                .map_err(|err| TemplateError::InvalidTemplate {
                    name: name.clone(),
                    err: Box::new(err),
                })?;
        }
        Ok(tera)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template directory {dir:?}: {err}")]
    DirReadError {
        dir: PathBuf,
        err: std::io::Error,
    },

    #[error("failed to read template file {file_path:?}: {err}")]
    FileReadError {
        file_path: PathBuf,
        err: std::io::Error,
    },

    #[error("no `.{}` templates found in {dir:?}", TEMPLATE_EXT)]
    NoTemplatesFound {
        dir: PathBuf,
    },

    #[error("template `{name}` failed to parse: {err}")]
    InvalidTemplate {
        name: String,
        err: Box<tera::Error>,
    },
}
