use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::UserDirs;

/// Expands a leading `~` to the home directory.
///
/// Returns `Ok(None)` if the path doesn't start with `~`.
pub fn expand_home(path: &Path) -> anyhow::Result<Option<PathBuf>> {
    if let Ok(rest) = path.strip_prefix("~") {
        let dirs = UserDirs::new().context("error retrieving home directory")?;
        Ok(Some([dirs.home_dir(), rest].iter().collect()))
    } else {
        Ok(None)
    }
}

/// Default location of the saved session.
pub fn default_session_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "tracetree")?;
    let dir = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Some(dir.join("session.json"))
}
