//! Task text → normalized keyword set.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "for", "with", "from", "by", "at",
    "is", "are", "be", "it", "this", "that", "as", "into", "when", "so", "not", "do", "does",
    "fix", "add", "update", "change", "make", "implement", "please", "should", "can", "we",
    "bug", "issue", "use", "new",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Split camelCase or PascalCase into words
fn split_camel_case(word: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_upper = false;

    for ch in word.chars() {
        if ch.is_uppercase() {
            if !current.is_empty() && !prev_upper {
                tokens.push(std::mem::take(&mut current));
            }
            prev_upper = true;
        } else {
            prev_upper = false;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Lowercased words of `text`: split on punctuation, underscores and camel
/// humps, stopwords and single characters dropped.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .flat_map(split_camel_case)
        .map(|token| token.to_lowercase())
        .filter(|token| token.chars().count() > 1 && !is_stopword(token))
        .collect()
}

/// Words of a workspace path: directory names and the file stem.
pub fn path_tokens(path: &str) -> BTreeSet<String> {
    let without_ext = match path.rsplit_once('.') {
        Some((head, _)) if !head.ends_with('/') && !head.is_empty() => head,
        _ => path,
    };
    tokenize(without_ext)
}

/// Jaccard index of two token sets; 0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn tokenizes_task_text() {
        assert_eq!(tokenize("Fix the main function"), set(&["main", "function"]));
        assert_eq!(
            tokenize("parseConfig in user_service"),
            set(&["parse", "config", "user", "service"])
        );
    }

    #[test]
    fn path_words_skip_extension() {
        assert_eq!(
            path_tokens("src/userService.ts"),
            set(&["src", "user", "service"])
        );
    }

    #[test]
    fn jaccard_index() {
        let a = set(&["login", "form"]);
        let b = set(&["login", "page"]);
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }
}
