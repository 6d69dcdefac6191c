//! Site configuration.

use std::path::Path;

use folio_eval::{Generation, Limits};
use folio_parser::DEFAULT_MAX_NESTING;
use serde::{Deserialize, Serialize};

use crate::error::{SiteError, SiteResult};

/// Site-wide settings, usually read from a JSON file. Missing fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Output flavours. Empty means one default generation.
    pub generations: Vec<Generation>,
    /// Extension of template files, without the dot.
    pub template_extension: String,
    /// File name of the per-directory ancestor initializer.
    pub initializer: String,
    pub max_nesting: usize,
    pub gas_limit: u64,
    pub max_call_depth: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            generations: Vec::new(),
            template_extension: "tpl".to_string(),
            initializer: "_init.tpl".to_string(),
            max_nesting: DEFAULT_MAX_NESTING,
            gas_limit: limits.gas_limit,
            max_call_depth: limits.max_call_depth,
        }
    }
}

impl SiteConfig {
    pub fn from_json(json: &str) -> SiteResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> SiteResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| SiteError::io(path, e))?;
        Self::from_json(&json)
    }

    /// The configured generations, or the single default one.
    pub fn generations(&self) -> Vec<Generation> {
        if self.generations.is_empty() {
            vec![Generation::default()]
        } else {
            self.generations.clone()
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            gas_limit: self.gas_limit,
            max_call_depth: self.max_call_depth,
        }
    }

    /// Whether `name` looks like a template file.
    pub fn is_template(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| ext == self.template_extension)
    }

    /// `name` with the template extension appended when it has none.
    pub fn with_extension(&self, name: &str) -> String {
        let file = name.rsplit('/').next().unwrap_or(name);
        if file.contains('.') {
            name.to_string()
        } else {
            format!("{name}.{}", self.template_extension)
        }
    }
}
