use context_symbols::Language;

pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;
const DENSE_CHARS_PER_TOKEN: f64 = 3.5;
const VERBOSE_CHARS_PER_TOKEN: f64 = 4.5;
const BLANK_LINE_DISCOUNT: f64 = 0.5;

/// Characters per token; symbol-heavy languages pack fewer characters into a token.
pub fn chars_per_token(language: Language) -> f64 {
    match language {
        Language::Rust | Language::Cpp | Language::TypeScript | Language::Tsx => {
            DENSE_CHARS_PER_TOKEN
        }
        Language::Python | Language::Ruby | Language::Markdown | Language::Json => {
            VERBOSE_CHARS_PER_TOKEN
        }
        _ => DEFAULT_CHARS_PER_TOKEN,
    }
}

/// Approximate token count of `text`. Blank lines cost less than their characters
/// suggest; non-empty text is never below one token.
pub fn estimate_tokens(text: &str, language: Language) -> usize {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    let (lines, blank) = text.lines().fold((0usize, 0usize), |(lines, blank), line| {
        (lines + 1, blank + usize::from(line.trim().is_empty()))
    });
    let blank_ratio = if lines == 0 {
        0.0
    } else {
        blank as f64 / lines as f64
    };
    let estimate = chars / chars_per_token(language) * (1.0 - BLANK_LINE_DISCOUNT * blank_ratio);
    (estimate.ceil() as usize).max(1)
}

/// Token estimate for a file, language inferred from its path.
pub fn estimate_file_tokens(path: &str, text: &str) -> usize {
    estimate_tokens(text, Language::from_path(path))
}
