//! Glob matching for page-view exclusion rules.
//!
//! Patterns are matched against the page path and are anchored at both ends,
//! with an optional trailing `/` tolerated:
//!
//! - `*` matches any run of characters other than whitespace and `/`
//! - `**` matches anything, including `/`
//! - every other character matches itself
//!
//! ```
//! use plausible_tracker::glob::ExclusionPattern;
//!
//! let pattern = ExclusionPattern::compile("/blog/*").unwrap();
//! assert!(pattern.matches("/blog/post"));
//! assert!(!pattern.matches("/blog/post/extra"));
//! ```

use std::fmt;

use regex::Regex;

use crate::error::{TrackerError, TrackerResult};

/// Regex fragment for a single `*`.
const SEGMENT_WILDCARD: &str = r"[^\s/]*";

/// Regex fragment for `**`.
const DEEP_WILDCARD: &str = ".*";

/// A compiled exclusion glob.
#[derive(Clone)]
pub struct ExclusionPattern {
    glob: String,
    regex: Regex,
}

impl ExclusionPattern {
    /// Compile a glob into a matcher. Surrounding whitespace is ignored.
    pub fn compile(glob: &str) -> TrackerResult<Self> {
        let glob = glob.trim();
        let regex = Regex::new(&glob_to_regex(glob)).map_err(|source| {
            TrackerError::InvalidExclusionPattern {
                pattern: glob.to_string(),
                source,
            }
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    /// The glob this matcher was compiled from.
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Whether `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl fmt::Debug for ExclusionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionPattern")
            .field("glob", &self.glob)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl fmt::Display for ExclusionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

/// Translate a glob into an anchored regular expression.
///
/// `**` is consumed before a lone `*` is considered, so a double star never
/// expands into two segment wildcards.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 4);
    out.push('^');

    let mut chars = glob.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(DEEP_WILDCARD);
            }
            '*' => out.push_str(SEGMENT_WILDCARD),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    out.push_str("/?$");
    out
}

/// The ordered set of exclusion patterns configured for a site.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionRules {
    /// Compile every glob, in order. Blank entries are skipped.
    pub fn compile<S: AsRef<str>>(globs: &[S]) -> TrackerResult<Self> {
        let patterns = globs
            .iter()
            .map(AsRef::as_ref)
            .filter(|g| !g.trim().is_empty())
            .map(ExclusionPattern::compile)
            .collect::<TrackerResult<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Whether no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// The first pattern matching `path`, if any.
    pub fn first_match(&self, path: &str) -> Option<&ExclusionPattern> {
        self.patterns.iter().find(|p| p.matches(path))
    }

    /// Whether any pattern matches `path`. Always `false` with no patterns.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.first_match(path).is_some()
    }

    /// Iterate over the compiled patterns.
    pub fn iter(&self) -> impl Iterator<Item = &ExclusionPattern> {
        self.patterns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(glob: &str) -> ExclusionPattern {
        ExclusionPattern::compile(glob).unwrap()
    }

    #[test]
    fn test_double_star_matches_nested_paths() {
        let p = pattern("/blog/**");
        assert!(p.matches("/blog/2024/post"));
        assert!(p.matches("/blog/"));
        assert!(!p.matches("/about"));
    }

    #[test]
    fn test_single_star_stops_at_separator() {
        let p = pattern("/blog/*");
        assert!(p.matches("/blog/post"));
        assert!(p.matches("/blog/post/"), "trailing separator is tolerated");
        assert!(!p.matches("/blog/post/extra"));
    }

    #[test]
    fn test_single_star_rejects_whitespace() {
        let p = pattern("/docs/*");
        assert!(!p.matches("/docs/two words"));
    }

    #[test]
    fn test_dot_is_literal() {
        let p = pattern("/file.html");
        assert!(p.matches("/file.html"));
        assert!(!p.matches("/fileXhtml"));
    }

    #[test]
    fn test_anchored_at_both_ends() {
        let p = pattern("/admin");
        assert!(p.matches("/admin"));
        assert!(!p.matches("/admin/users"));
        assert!(!p.matches("/site/admin"));
    }

    #[test]
    fn test_regex_metacharacters_are_escaped() {
        let p = pattern("/search(1)+[x]");
        assert!(p.matches("/search(1)+[x]"));
        assert!(!p.matches("/search1"));
    }

    #[test]
    fn test_glob_is_trimmed() {
        let p = pattern("  /private/**  ");
        assert_eq!(p.as_str(), "/private/**");
        assert!(p.matches("/private/a/b"));
    }

    #[test]
    fn test_star_in_middle_of_segment() {
        let p = pattern("/user-*/settings");
        assert!(p.matches("/user-42/settings"));
        assert!(!p.matches("/user-42/x/settings"));
    }

    #[test]
    fn test_rules_empty_never_exclude() {
        let rules = ExclusionRules::compile::<&str>(&[]).unwrap();
        assert!(rules.is_empty());
        assert!(!rules.is_excluded("/anything"));
    }

    #[test]
    fn test_rules_first_match_in_order() {
        let rules = ExclusionRules::compile(&["/a/**", "/a/b"]).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.first_match("/a/b").unwrap().as_str(), "/a/**");
        assert!(rules.first_match("/c").is_none());
    }

    #[test]
    fn test_rules_skip_blank_entries() {
        let rules = ExclusionRules::compile(&["", "  ", "/x"]).unwrap();
        assert_eq!(rules.len(), 1);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_literal_glob_matches_itself(path in "/[a-z0-9._-]{0,12}(/[a-z0-9._-]{1,12}){0,3}") {
                let p = ExclusionPattern::compile(&path)?;
                prop_assert!(p.matches(&path), "{} should match itself", path);
                let with_slash = format!("{}/", path);
                prop_assert!(p.matches(&with_slash), "{} should tolerate trailing slash", path);
            }

            #[test]
            fn test_deep_wildcard_matches_every_suffix(
                prefix in "/[a-z]{1,8}",
                suffix in "[a-z0-9/ ._-]{0,24}",
            ) {
                let p = ExclusionPattern::compile(&format!("{}/**", prefix))?;
                let path = format!("{}/{}", prefix, suffix);
                prop_assert!(p.matches(&path), "{} should match {}/**", path, prefix);
            }

            #[test]
            fn test_segment_wildcard_never_crosses_separator(
                prefix in "/[a-z]{1,8}",
                a in "[a-z0-9]{1,8}",
                b in "[a-z0-9]{1,8}",
            ) {
                let p = ExclusionPattern::compile(&format!("{}/*", prefix))?;
                let single = format!("{}/{}", prefix, a);
                let nested = format!("{}/{}/{}", prefix, a, b);
                prop_assert!(p.matches(&single));
                prop_assert!(!p.matches(&nested));
            }
        }
    }
}
