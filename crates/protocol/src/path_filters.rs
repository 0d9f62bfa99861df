//! Loose ignore patterns for watcher events.
//!
//! A pattern is a substring test unless it contains a wildcard, in which
//! case it is a glob matched against the whole path and the file name.

/// Substring match, or glob match when the pattern carries `*`, `?` or `[`.
pub fn matches_loose_pattern(path: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return false;
    }
    let path = path.replace('\\', "/");

    if !pattern.contains(['*', '?', '[']) {
        return path.contains(pattern);
    }

    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    glob::Pattern::new(pattern)
        .map(|p| p.matches_with(&path, options) || file_name_matches(&p, &path, options))
        .unwrap_or(false)
}

pub fn matches_any_loose_pattern(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches_loose_pattern(path, p))
}

fn file_name_matches(pattern: &glob::Pattern, path: &str, options: glob::MatchOptions) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|name| pattern.matches_with(name, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_patterns_support_substring_and_wildcards() {
        assert!(matches_loose_pattern("src/node_modules/x.js", "node_modules"));
        assert!(!matches_loose_pattern("src/main.rs", "node_modules"));
        assert!(matches_loose_pattern("logs/app.log", "*.log"));
        assert!(matches_loose_pattern("deep/nested/file.tmp", "*.tmp"));
        assert!(!matches_loose_pattern("src/lib.rs", "*.log"));
        assert!(matches_loose_pattern("src/lib.rs", "src/*.rs"));
    }

    #[test]
    fn blank_patterns_never_match() {
        assert!(!matches_loose_pattern("src/lib.rs", ""));
        assert!(!matches_loose_pattern("src/lib.rs", "   "));
    }

    #[test]
    fn any_pattern_matches_with_windows_separators() {
        let patterns = vec!["dist".to_string(), "*.map".to_string()];
        assert!(matches_any_loose_pattern("build\\dist\\out.js", &patterns));
        assert!(matches_any_loose_pattern("src\\app.js.map", &patterns));
        assert!(!matches_any_loose_pattern("src\\app.js", &patterns));
    }
}
