//! Confinement of archive-supplied paths under a destination root

use std::path::{Path, PathBuf};

/// A relative path that was rejected because it would leave its root
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("path '{path}' escapes the destination root")]
pub struct PathEscape {
    pub path: String,
}

/// Split an archive or Windows path into safe components.
///
/// Both `\` and `/` separate components. Empty and `.` components are
/// dropped, `..` is refused. A leading separator is therefore ignored, which
/// turns `\Windows\System32` into `Windows/System32`.
pub fn confined_components(raw: &str) -> Result<Vec<&str>, PathEscape> {
    let mut components = Vec::new();
    for part in raw.split(|c: char| c == '\\' || c == '/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(PathEscape {
                    path: raw.to_string(),
                })
            }
            other => components.push(other),
        }
    }
    Ok(components)
}

/// Join `raw` under `root`, refusing anything that could resolve outside it
pub fn confined_join(root: &Path, raw: &str) -> Result<PathBuf, PathEscape> {
    let components = confined_components(raw)?;
    if components.is_empty() {
        return Err(PathEscape {
            path: raw.to_string(),
        });
    }
    let mut path = root.to_path_buf();
    path.extend(components);
    Ok(path)
}
