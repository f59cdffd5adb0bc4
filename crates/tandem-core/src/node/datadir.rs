use std::path::{Path, PathBuf};

use crate::{config::ConfigError, errors::HarnessError};

/// Resets `datadir` and seeds it with `template` saved as `conf_file_name`.
///
/// Any existing directory is removed first, so the node starts from an empty chain.
/// Returns the path of the copied config.
///
/// # Errors
///
/// - [`ConfigError::NotFound`] if `template` does not exist (nothing is removed)
/// - [`HarnessError::Io`] if the directory cannot be reset or the file copied
pub fn prepare_datadir(
    datadir: &Path,
    template: &Path,
    conf_file_name: &str,
) -> Result<PathBuf, HarnessError> {
    if !template.is_file() {
        return Err(ConfigError::NotFound(template.to_path_buf()).into());
    }

    if datadir.exists() {
        tracing::debug!(datadir = %datadir.display(), "removing existing datadir");
        std::fs::remove_dir_all(datadir)?;
    }
    std::fs::create_dir_all(datadir)?;

    let conf_path = datadir.join(conf_file_name);
    std::fs::copy(template, &conf_path)?;
    tracing::info!(
        datadir = %datadir.display(),
        template = %template.display(),
        "prepared datadir"
    );
    Ok(conf_path)
}
