use nhaml_compiler::CompileOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "nhaml.config.json";

/// NHaml configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory templates are looked up in
    #[serde(default = "default_views_dir")]
    pub views_dir: String,

    /// Layout wrapped around every rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,

    #[serde(default)]
    pub compiler_options: CompileOptions,
}

fn default_views_dir() -> String {
    "views".to_string()
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            debug!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            debug!(cwd, "no config file, using defaults");
            Ok(Config::default())
        }
    }

    pub fn get_views_dir(&self, cwd: &str) -> PathBuf {
        PathBuf::from(cwd).join(&self.views_dir)
    }

    /// Path of a template given on the command line
    ///
    /// Tried relative to `cwd` first, then to the views directory. The
    /// template extension is appended when the name has none.
    pub fn template_path(&self, cwd: &str, name: &str) -> PathBuf {
        let candidates = [
            self.with_extension(PathBuf::from(cwd).join(name)),
            self.with_extension(self.get_views_dir(cwd).join(name)),
        ];
        let fallback = candidates[1].clone();
        candidates
            .into_iter()
            .find(|path| path.is_file())
            .unwrap_or(fallback)
    }

    /// Layout to use: the explicit one, else the configured one
    pub fn layout_path(&self, cwd: &str, explicit: Option<&str>, no_layout: bool) -> Option<PathBuf> {
        if no_layout {
            return None;
        }
        explicit
            .or(self.layout.as_deref())
            .map(|name| self.template_path(cwd, name))
    }

    fn with_extension(&self, mut path: PathBuf) -> PathBuf {
        let extension = self.compiler_options.template_extension.as_str();
        if path.extension().is_none() && !extension.is_empty() {
            path.set_extension(extension);
        }
        path
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            views_dir: default_views_dir(),
            layout: None,
            compiler_options: CompileOptions::default(),
        }
    }
}
