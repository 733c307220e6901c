use std::path::{Component, Path};

use crate::StorageError;

/// Prefix of staging files holding in-flight uploads.
///
/// Names starting with it are reserved and hidden from listings.
pub const PARTIAL_PREFIX: &str = ".ferry-partial-";

/// Reduces a logical filename to its final path component.
///
/// Both `/` and `\` count as separators, so `a/../../etc/x` and `etc\x`
/// both become `x`. Rejects:
/// - Empty results (`""`, `"dir/"`)
/// - `.` and `..`
/// - NUL bytes
/// - Anything that does not parse as a single normal component
///   (e.g. Windows drive prefixes)
/// - Reserved staging names
pub fn basename(name: &str) -> Result<&str, StorageError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    if base.is_empty() {
        return Err(StorageError::InvalidName(format!("empty filename: {name:?}")));
    }

    if base.contains('\0') {
        return Err(StorageError::InvalidName("filename contains NUL".into()));
    }

    let mut components = Path::new(base).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(StorageError::InvalidName(format!(
                "not a plain filename: {base:?}"
            )));
        }
    }

    if base.starts_with(PARTIAL_PREFIX) {
        return Err(StorageError::InvalidName(format!(
            "reserved filename: {base:?}"
        )));
    }

    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_unchanged() {
        assert_eq!(basename("report.pdf").unwrap(), "report.pdf");
    }

    #[test]
    fn strips_directories() {
        assert_eq!(basename("etc/x").unwrap(), "x");
        assert_eq!(basename("a/../../etc/x").unwrap(), "x");
        assert_eq!(basename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(basename("/abs/path/file.txt").unwrap(), "file.txt");
    }

    #[test]
    fn strips_backslash_directories() {
        assert_eq!(basename("..\\..\\windows\\win.ini").unwrap(), "win.ini");
    }

    #[test]
    fn accepts_dotfile() {
        assert_eq!(basename(".bashrc").unwrap(), ".bashrc");
    }

    #[test]
    fn rejects_empty() {
        assert!(basename("").is_err());
        assert!(basename("dir/").is_err());
    }

    #[test]
    fn rejects_dot_components() {
        assert!(basename(".").is_err());
        assert!(basename("..").is_err());
        assert!(basename("a/..").is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(basename("a\0b").is_err());
    }

    #[test]
    fn rejects_reserved_prefix() {
        let name = format!("{PARTIAL_PREFIX}1234");
        assert!(matches!(
            basename(&name),
            Err(StorageError::InvalidName(_))
        ));
    }
}
