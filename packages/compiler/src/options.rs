use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether identical expression text compiles to one shared unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitSharing {
    /// One unit per distinct `(kind, source)` pair
    #[default]
    Dedupe,
    /// One unit per occurrence in the template
    PerSite,
}

/// Options for view compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Libraries handed to the expression compiler alongside the program
    #[serde(default = "default_references")]
    pub references: Vec<String>,

    #[serde(default)]
    pub unit_sharing: UnitSharing,

    /// Upper bound for one walk + batch compile
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,

    /// Suffix appended to partial names that have none
    #[serde(default = "default_template_extension")]
    pub template_extension: String,
}

fn default_references() -> Vec<String> {
    vec!["core".to_string()]
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}

fn default_template_extension() -> String {
    "haml".to_string()
}

impl CompileOptions {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            references: default_references(),
            unit_sharing: UnitSharing::default(),
            compile_timeout_ms: default_compile_timeout_ms(),
            template_extension: default_template_extension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let json = r#"{
            "references": ["core", "extra"],
            "unitSharing": "perSite",
            "compileTimeoutMs": 500
        }"#;

        let options: CompileOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.references, vec!["core", "extra"]);
        assert_eq!(options.unit_sharing, UnitSharing::PerSite);
        assert_eq!(options.compile_timeout(), Duration::from_millis(500));
        assert_eq!(options.template_extension, "haml");
    }

    #[test]
    fn test_default_options() {
        let options: CompileOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CompileOptions::default());
        assert_eq!(options.references, vec!["core"]);
        assert_eq!(options.unit_sharing, UnitSharing::Dedupe);
    }
}
