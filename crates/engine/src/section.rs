use context_scoring::estimate_tokens;
use context_symbols::Language;
use serde::{Deserialize, Serialize};

/// One bounded block of generated text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSection {
    pub content: String,
    pub tokens: usize,
    pub truncated: bool,
    /// Lines that did not fit.
    pub omitted_lines: usize,
}

/// Appends lines while they fit a token budget.
///
/// Each line is charged on its own, newline included; the sum bounds the
/// estimate of the whole text.
pub(crate) struct SectionWriter {
    budget: usize,
    used: usize,
    content: String,
    omitted: usize,
}

pub(crate) fn line_cost(line: &str) -> usize {
    estimate_tokens(&format!("{line}\n"), Language::Unknown)
}

impl SectionWriter {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            content: String::new(),
            omitted: 0,
        }
    }

    /// Append `line` unless it would overrun the budget.
    pub(crate) fn push_line(&mut self, line: &str) -> bool {
        let cost = line_cost(line);
        if self.omitted > 0 || self.used + cost > self.budget {
            self.omitted += 1;
            return false;
        }
        self.used += cost;
        self.content.push_str(line);
        self.content.push('\n');
        true
    }

    pub(crate) fn is_full(&self) -> bool {
        self.omitted > 0
    }

    pub(crate) fn skip(&mut self, lines: usize) {
        self.omitted += lines;
    }

    pub(crate) fn finish(mut self) -> RenderedSection {
        if self.omitted > 0 {
            let marker = format!("... {} more lines", self.omitted);
            let cost = line_cost(&marker);
            if self.used + cost <= self.budget {
                self.used += cost;
                self.content.push_str(&marker);
                self.content.push('\n');
            }
        }
        let tokens = estimate_tokens(&self.content, Language::Unknown);
        RenderedSection {
            content: self.content,
            tokens,
            truncated: self.omitted > 0,
            omitted_lines: self.omitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_budget_and_reports_omissions() {
        let mut writer = SectionWriter::new(6);
        assert!(writer.push_line("aaaaaaa"));
        assert!(!writer.push_line(&"b".repeat(40)));
        assert!(!writer.push_line("c"));
        let section = writer.finish();
        assert!(section.truncated);
        assert_eq!(section.omitted_lines, 2);
        assert!(section.tokens <= 6);
        assert!(section.content.starts_with("aaaaaaa\n"));
    }
}
