//! Suite configuration file schema.
//!
//! A suite directory may hold a `cmdtest.yaml` (or `cmdtest.toml`) describing
//! how the `cmdtest` binary should run it:
//!
//! ```yaml
//! parallel: false
//! keep_root_dirs: false
//! programs:
//!   my-cli: ../target/debug/my-cli
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Suite-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Executables to register as commands, by command name.
    /// Relative paths are resolved against the suite directory.
    #[serde(default)]
    pub programs: BTreeMap<String, PathBuf>,

    /// Run test files in parallel, without root directories or `ROOTDIR`.
    #[serde(default)]
    pub parallel: bool,

    /// Keep each test file's root directory after the run.
    #[serde(default)]
    pub keep_root_dirs: bool,

    /// Don't log commands and their output.
    #[serde(default)]
    pub disable_logging: bool,
}

impl SuiteConfig {
    /// `programs`, with relative paths resolved against `suite_dir`.
    pub fn resolved_programs(&self, suite_dir: &Path) -> Vec<(String, PathBuf)> {
        self.programs
            .iter()
            .map(|(name, path)| (name.clone(), suite_dir.join(path)))
            .collect()
    }
}

/// Generate the JSON Schema for the suite configuration file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(SuiteConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config: SuiteConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, SuiteConfig::default());
    }

    #[test]
    fn reject_unknown_fields() {
        let result: Result<SuiteConfig, _> = serde_yaml::from_str("paralel: true");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_program_paths() {
        let config: SuiteConfig = serde_yaml::from_str(
            r#"
programs:
  rel: bin/tool
  abs: /usr/bin/env
"#,
        )
        .unwrap();
        let programs = config.resolved_programs(Path::new("suite"));
        assert_eq!(
            programs,
            [
                ("abs".to_string(), PathBuf::from("/usr/bin/env")),
                ("rel".to_string(), PathBuf::from("suite/bin/tool")),
            ]
        );
    }

    #[test]
    fn schema_lists_fields() {
        let schema = serde_json::to_value(generate_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for field in ["programs", "parallel", "keep_root_dirs", "disable_logging"] {
            assert!(properties.contains_key(field), "missing {field}");
        }
    }
}
