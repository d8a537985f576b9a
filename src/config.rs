use super::{Error, Result};

/// Configuration for a single edit of an object's debug information.
///
/// Mirrors the knobs a command-line front end would expose; the fields are
/// bit-exact with what reaches the editor, not the raw command-line syntax.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct Config {
    /// The build-time directory prefix to replace.
    ///
    /// Forced to end with a separator by [`Config::new`].
    pub base_dir: Option<Vec<u8>>,
    /// The deployment-time directory prefix to substitute.
    ///
    /// Forced to end with a separator by [`Config::new`]. Must not be longer
    /// than `base_dir` once both are normalized.
    pub dest_dir: Option<Vec<u8>>,
    /// Rewrite rewritten paths to use `\` instead of `/`.
    pub win_path: bool,
}

impl Config {
    /// Build a normalized configuration from raw `base`/`dest` strings.
    ///
    /// Trailing separators are added if missing; `win_path` selects `\` as
    /// the separator appended to `dest`. Returns an error if `dest` is
    /// configured without `base`, or if `dest` is longer than `base`.
    pub fn new(
        base_dir: Option<Vec<u8>>,
        dest_dir: Option<Vec<u8>>,
        win_path: bool,
    ) -> Result<Self> {
        let sep = if win_path { b'\\' } else { b'/' };

        let base_dir = base_dir.map(|mut b| {
            if b.last() != Some(&b'/') && b.last() != Some(&b'\\') {
                b.push(b'/');
            }
            b
        });
        let dest_dir = dest_dir.map(|mut d| {
            if d.last() != Some(&b'/') && d.last() != Some(&b'\\') {
                d.push(sep);
            }
            d
        });

        if let Some(dest) = &dest_dir {
            let Some(base) = &base_dir else {
                return Err(Error::config(
                    "dest-dir requires base-dir to be configured",
                ));
            };
            if dest.len() > base.len() {
                return Err(Error::config("dest-dir must not be longer than base-dir"));
            }
        }

        Ok(Config {
            base_dir,
            dest_dir,
            win_path,
        })
    }

    pub(crate) fn base(&self) -> Option<&[u8]> {
        self.base_dir.as_deref()
    }

    pub(crate) fn dest(&self) -> Option<&[u8]> {
        self.dest_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_trailing_separator() {
        let config = Config::new(Some(b"/build/src".to_vec()), Some(b"/out".to_vec()), false)
            .unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(&b"/build/src/"[..]));
        assert_eq!(config.dest_dir.as_deref(), Some(&b"/out/"[..]));
    }

    #[test]
    fn windows_separator() {
        let config = Config::new(Some(b"/build/".to_vec()), Some(b"/out".to_vec()), true).unwrap();
        assert_eq!(config.dest_dir.as_deref(), Some(&b"/out\\"[..]));
    }

    #[test]
    fn rejects_dest_longer_than_base() {
        let err = Config::new(Some(b"/a/".to_vec()), Some(b"/aaaa/".to_vec()), false).unwrap_err();
        assert_eq!(err.kind(), super::super::ErrorKind::Config);
    }

    #[test]
    fn rejects_dest_without_base() {
        let err = Config::new(None, Some(b"/out/".to_vec()), false).unwrap_err();
        assert_eq!(err.kind(), super::super::ErrorKind::Config);
    }
}
