//! Key relativization and include/exclude glob matching

use std::collections::BTreeSet;

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

/// Strip `prefix` from every key
///
/// Keys that do not start with `prefix` are kept unchanged; listings under a
/// prefix never produce such keys.
pub fn relativize<I, S>(keys: I, prefix: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .map(|key| {
            let key = key.as_ref();
            key.strip_prefix(prefix).unwrap_or(key).to_string()
        })
        .collect()
}

/// First path segment of `key` below `root`, if any
pub fn child_name<'a>(key: &'a str, root: &str) -> Option<&'a str> {
    let relative = key.strip_prefix(root).unwrap_or(key).trim_start_matches('/');
    relative.split('/').next().filter(|name| !name.is_empty())
}

/// Compiled include/exclude glob filter
///
/// Excludes are checked first and always win. With no include patterns every
/// name is included. `*` also matches `/`, so `*.jpg` matches `a/b.jpg`.
#[derive(Debug, Clone)]
pub struct Matcher {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Matcher {
    /// Compile glob patterns; an invalid pattern is a configuration error
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        let include = if include.is_empty() {
            vec![compile("*")?]
        } else {
            include.iter().map(|p| compile(p.as_ref())).collect::<Result<_>>()?
        };
        let exclude = exclude
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<_>>()?;
        Ok(Self { include, exclude })
    }

    /// Matcher that accepts everything
    pub fn any() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn is_match(&self, name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        if self.exclude.iter().any(|p| p.matches_with(name, options)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches_with(name, options))
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::Config(format!("invalid glob pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relativize_strips_prefix() {
        let rel = relativize(["data/a.txt", "data/sub/b.txt"], "data/");
        assert_eq!(
            rel.into_iter().collect::<Vec<_>>(),
            vec!["a.txt", "sub/b.txt"]
        );
    }

    #[test]
    fn test_relativize_keeps_foreign_keys() {
        let rel = relativize(vec!["other/x".to_string()], "data/");
        assert!(rel.contains("other/x"));
    }

    #[test]
    fn test_relativize_empty_prefix() {
        let rel = relativize(["a", "b/c"], "");
        assert!(rel.contains("a") && rel.contains("b/c"));
    }

    #[test]
    fn test_child_name() {
        assert_eq!(child_name("roots/src/A/x.txt", "roots/src/"), Some("A"));
        assert_eq!(child_name("roots/src/B/deep/y", "roots/src/"), Some("B"));
        assert_eq!(child_name("roots/src//C/z", "roots/src/"), Some("C"));
        assert_eq!(child_name("roots/src/", "roots/src/"), None);
        assert_eq!(child_name("top.txt", ""), Some("top.txt"));
    }

    #[test]
    fn test_default_include_matches_everything() {
        let m = Matcher::new::<&str>(&[], &[]).unwrap();
        assert!(m.is_match("anything/at/all"));
        assert!(Matcher::any().is_match("x"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let m = Matcher::new(&["*.jpg"], &["tmp/*"]).unwrap();
        assert!(!m.is_match("tmp/x.jpg"));
        assert!(m.is_match("img/x.jpg"));
        assert!(!m.is_match("img/x.png"));
    }

    #[test]
    fn test_multiple_includes() {
        let m = Matcher::new(&["*.jpg", "*.png"], &[]).unwrap();
        assert!(m.is_match("a.png"));
        assert!(m.is_match("a.jpg"));
        assert!(!m.is_match("a.gif"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Matcher::new(&["[unclosed"], &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
