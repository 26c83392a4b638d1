use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use thiserror::Error;

use crate::color::Color;

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Theme '{0}' not found.")]
    NotFound(String),

    #[error("theme '{name}' is unreadable: {detail}")]
    Invalid { name: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesColors {
    pub clones: Color,
    pub views: Color,
}

/// Default palette for a chart; request overrides take precedence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Theme {
    pub background_color: Color,
    pub text_color: Color,
    pub grid_color: Color,
    pub line_colors: SeriesColors,
    pub point_colors: SeriesColors,
}

/// Read-only directory of `<name>.json` theme files. Successfully parsed
/// themes are kept for the life of the store.
#[derive(Debug)]
pub struct ThemeStore {
    dir: PathBuf,
    loaded: RwLock<HashMap<String, Arc<Theme>>>,
}

impl ThemeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// The themes shipped alongside this crate.
    pub fn bundled() -> Self {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("themes"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, name: &str) -> Result<Arc<Theme>, ThemeError> {
        if let Some(theme) = self.loaded.read().unwrap().get(name) {
            return Ok(Arc::clone(theme));
        }

        let theme = Arc::new(self.read(name)?);
        self.loaded
            .write()
            .unwrap()
            .insert(name.to_owned(), Arc::clone(&theme));
        Ok(theme)
    }

    fn read(&self, name: &str) -> Result<Theme, ThemeError> {
        // Names become file names; anything path-like can't be a theme.
        let well_formed = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(ThemeError::NotFound(name.to_owned()));
        }

        let path = self.dir.join(format!("{name}.json"));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ThemeError::NotFound(name.to_owned()));
            }
            Err(e) => {
                return Err(ThemeError::Invalid {
                    name: name.to_owned(),
                    detail: e.to_string(),
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| ThemeError::Invalid {
            name: name.to_owned(),
            detail: e.to_string(),
        })
    }
}
