use relative_path::{RelativePath, RelativePathBuf};
use std::path::Path;

/* 📖 # Why use RelativePathBuf for FilePath?

Configuration files are addressed relative to the directory the service was started
in (`conf/settings.toml`, `conf/.secrets.toml`). Keeping PAL paths relative makes the
same settings code work against RealPal's base directory and MockPal's in-memory map.
*/

/// Path of a file relative to the PAL's base directory.
///
/// ```
/// use typereg_base::FilePath;
///
/// let settings = FilePath::from("conf/settings.toml");
/// assert_eq!(settings.to_string(), "conf/settings.toml");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath(RelativePathBuf);

impl FilePath {
    pub fn as_relative(&self) -> &RelativePath {
        &self.0
    }

    /// Relative path portion as a std Path, without any base directory.
    pub fn as_path(&self) -> &Path {
        Path::new(self.0.as_str())
    }
}

impl From<&str> for FilePath {
    fn from(s: &str) -> Self {
        Self(RelativePathBuf::from(s))
    }
}

impl From<String> for FilePath {
    fn from(s: String) -> Self {
        Self(RelativePathBuf::from(s))
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
