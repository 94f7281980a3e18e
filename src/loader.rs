//! Locating test files and suite configuration on disk.

use crate::error::LoadError;
use crate::schema::SuiteConfig;
use std::path::{Path, PathBuf};

/// Extension of test files.
pub const TEST_FILE_EXTENSION: &str = "ct";

/// Names of the suite configuration file, in lookup order.
pub const SUITE_CONFIG_FILENAMES: [&str; 2] = ["cmdtest.yaml", "cmdtest.toml"];

/// Find the `.ct` files directly inside `dir`, sorted by name.
pub fn find_test_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == TEST_FILE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load suite configuration from `dir`.
///
/// Looks for `cmdtest.yaml`, then `cmdtest.toml`. Returns `None` if neither
/// exists, and an error if the one found is invalid.
pub fn load_suite_config(dir: &Path) -> Result<Option<SuiteConfig>, LoadError> {
    let Some(path) = SUITE_CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
    else {
        return Ok(None);
    };

    let contents = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let config = if path.extension().is_some_and(|e| e == "toml") {
        toml::from_str(&contents).map_err(|source| LoadError::Toml { path, source })?
    } else {
        serde_yaml::from_str(&contents).map_err(|source| LoadError::Yaml { path, source })?
    };
    Ok(Some(config))
}
