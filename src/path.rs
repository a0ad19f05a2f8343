//! Path splitting shared by every command in [`crate::fs`].

use crate::error::{Error, Result};
use crate::layout::{MAX_FILENAME, MAX_PATH_COMPONENTS};

/// Splits an ExFS2 path into its components.
///
/// `/` is the separator; a leading `/` is optional and stripped. Empty
/// paths and `/` alone yield zero components. Consecutive separators
/// collapse (an empty component between two slashes is skipped). Fails
/// with [`Error::NoSpace`] if there are more than [`MAX_PATH_COMPONENTS`]
/// components or any component is [`MAX_FILENAME`] bytes or longer (the
/// layout has no room for its NUL terminator).
pub fn split_path(path: &str) -> Result<Vec<String>> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut components = Vec::new();
    for part in trimmed.split('/') {
        if part.is_empty() {
            continue;
        }
        if part.len() > MAX_FILENAME - 1 {
            return Err(Error::NoSpace);
        }
        if components.len() >= MAX_PATH_COMPONENTS {
            return Err(Error::NoSpace);
        }
        components.push(part.to_string());
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_empty_yield_no_components() {
        assert_eq!(split_path("/").unwrap(), Vec::<String>::new());
        assert_eq!(split_path("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn splits_on_slash_with_or_without_leading_slash() {
        assert_eq!(split_path("/a/b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_path("a/b/c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn collapses_consecutive_separators() {
        assert_eq!(split_path("/a//b").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn rejects_too_many_components() {
        let path = (0..33).map(|i| format!("d{i}")).collect::<Vec<_>>().join("/");
        assert!(matches!(split_path(&path), Err(Error::NoSpace)));
        let path32 = (0..32).map(|i| format!("d{i}")).collect::<Vec<_>>().join("/");
        assert!(split_path(&path32).is_ok());
    }

    #[test]
    fn rejects_component_too_long() {
        let long = "a".repeat(MAX_FILENAME);
        assert!(matches!(split_path(&long), Err(Error::NoSpace)));
        let ok = "a".repeat(MAX_FILENAME - 1);
        assert!(split_path(&ok).is_ok());
    }
}
