//! Include/exclude filtering of class file locations.
//!
//! Locations have the form `archive.jar@nested.jar@com/foo/Bar$Inner.class`.
//! Only the part after the last `@` is matched, with the `.class` suffix
//! removed and `/`, `\` and `$` replaced by `.`, so `com.*` selects
//! everything in the `com` package regardless of the archive it came from.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Invalid location pattern '{pattern}': {source}")]
pub struct FilterError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// Predicate over class file locations built from `;`-separated patterns.
#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl LocationFilter {
    /// Build a filter; an empty include list accepts every location
    pub fn parse(includes: &str, excludes: &str) -> Result<Self, FilterError> {
        Ok(Self {
            includes: compile_patterns(includes)?,
            excludes: compile_patterns(excludes)?,
        })
    }

    /// Filter that accepts everything
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.includes.is_empty() || !self.excludes.is_empty()
    }

    pub fn is_included(&self, location: &str) -> bool {
        let class_name = normalize_location(location);
        if self.excludes.iter().any(|re| re.is_match(&class_name)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|re| re.is_match(&class_name))
    }
}

fn compile_patterns(patterns: &str) -> Result<Vec<Regex>, FilterError> {
    patterns
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pattern| {
            let separators_as_dots = pattern.replace(['/', '\\', '$'], ".");
            Regex::new(&wildcard_to_regex(&separators_as_dots)).map_err(|source| FilterError {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

fn normalize_location(location: &str) -> String {
    let inner = location.rsplit('@').next().unwrap_or(location);
    let inner = inner.strip_suffix(".class").unwrap_or(inner);
    inner.replace(['/', '\\', '$'], ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn include(patterns: &str) -> LocationFilter {
        LocationFilter::parse(patterns, "").unwrap()
    }

    #[test]
    fn test_path_patterns_match_like_dotted_ones() {
        let filter = include("src/*");
        assert!(filter.is_included("src/app.js"));
        assert!(filter.is_included("src/nested/util.js"));
        assert!(!filter.is_included("lib/src/app.js"));

        let filter = include("com/foo/*;com\\goo\\Bar$*");
        assert!(filter.is_included("file.jar@com/foo/Bar.class"));
        assert!(filter.is_included("com/goo/Bar$Inner.class"));
        assert!(!filter.is_included("com/goo/Baz.class"));
    }

    #[test]
    fn test_package_prefix_pattern() {
        let filter = include("com.*");
        for accepted in [
            "file.jar@com/foo/Bar.class",
            "file.jar@com/foo/Bar$Goo.class",
            "file1.jar@goo/file2.jar@com/foo/Bar.class",
            "com/foo/Bar.class",
            "com.foo/Bar.class",
        ] {
            assert!(filter.is_included(accepted), "{accepted} should be included");
        }
        for rejected in [
            "foo/com/Bar.class",
            "com.class",
            "file.jar@com.class",
            "A$com$Bar.class",
        ] {
            assert!(!filter.is_included(rejected), "{rejected} should be rejected");
        }
    }

    #[test]
    fn test_leading_wildcard_pattern() {
        let filter = include("*com.*");
        for accepted in [
            "file.jar@com/foo/Bar.class",
            "foo/com/goo/Bar.class",
            "A$com$Bar.class",
            "src/com/foo/Bar.class",
        ] {
            assert!(filter.is_included(accepted), "{accepted} should be included");
        }
        assert!(include("*com.customer.*").is_included(
            "C:\\client-daily\\client\\plugins\\com.customer.something.client_1.2.3.4.jar@com/customer/something/SomeClass.class"
        ));
    }

    #[test]
    fn test_multiple_patterns() {
        let includes = include("*com.*;*de.*");
        assert!(includes.is_included("file.jar@com/foo/Bar.class"));
        assert!(includes.is_included("file.jar@de/foo/Bar$Goo.class"));
        assert!(!includes.is_included("file.jar@org/foo/Bar.class"));

        let excludes = LocationFilter::parse("", "*com.*;*de.*").unwrap();
        assert!(!excludes.is_included("file.jar@com/foo/Bar.class"));
        assert!(!excludes.is_included("file.jar@de/foo/Bar$Goo.class"));
        assert!(excludes.is_included("file.jar@org/foo/Bar.class"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = LocationFilter::parse("com.*", "com.generated.*").unwrap();
        assert!(filter.is_included("com/foo/Bar.class"));
        assert!(!filter.is_included("com/generated/Stub.class"));
        assert!(filter.is_active());
        assert!(!LocationFilter::accept_all().is_active());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let filter = include("com.foo+bar.*");
        assert!(filter.is_included("com/foo+bar/X.class"));
        assert!(!filter.is_included("com/foooobar/X.class"));
    }
}
