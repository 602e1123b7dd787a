//! Recipe lookup in the configured recipes directory.

use std::path::{Path, PathBuf};

use crate::error::SpawnError;

#[derive(Debug, Clone)]
pub struct RecipeCatalog {
    dir: PathBuf,
    extension: String,
}

impl RecipeCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a recipe name to an existing file. The configured extension is
    /// appended unless the name already ends with it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, SpawnError> {
        let path = self.dir.join(self.file_name(name));
        if path.is_file() {
            Ok(path)
        } else {
            Err(SpawnError::RecipeMissing {
                name: name.to_string(),
                path,
            })
        }
    }

    /// Recipe name with the extension stripped, as stored on agent records.
    pub fn recipe_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(&format!(".{}", self.extension))
            .unwrap_or(name)
    }

    /// Sorted names (without extension) of every recipe file. A missing
    /// directory lists as empty.
    pub fn list(&self) -> std::io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .filter_map(|e| {
                let path = e.path();
                let ext = path.extension()?.to_str()?;
                if ext != self.extension {
                    return None;
                }
                path.file_stem()?.to_str().map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn file_name(&self, name: &str) -> String {
        if self.recipe_name(name) != name {
            name.to_string()
        } else {
            format!("{name}.{}", self.extension)
        }
    }
}
