use crate::section::{RenderedSection, SectionWriter};
use context_symbols::{ExtractedSymbol, ParsedFile};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMap {
    pub section: RenderedSection,
    /// Files with at least one symbol line rendered.
    pub file_count: usize,
    pub symbol_count: usize,
}

pub fn symbol_line(symbol: &ExtractedSymbol) -> String {
    let export = if symbol.exported { " [export]" } else { "" };
    format!(
        "  {} {} ({}){export}",
        symbol.kind,
        symbol.qualified_name(),
        symbol.start.line
    )
}

/// Per-file symbol listing, files in the given (score) order, cut at `budget`.
pub fn render_code_map(files: &[(String, Arc<ParsedFile>)], budget: usize) -> CodeMap {
    let mut writer = SectionWriter::new(budget);
    let mut file_count = 0usize;
    let mut symbol_count = 0usize;

    for (path, parsed) in files {
        if parsed.symbols.is_empty() {
            continue;
        }
        if writer.is_full() {
            writer.skip(1 + parsed.symbols.len());
            continue;
        }
        if !writer.push_line(&format!("{path} ({})", parsed.language)) {
            writer.skip(parsed.symbols.len());
            continue;
        }
        file_count += 1;

        let mut symbols: Vec<&ExtractedSymbol> = parsed.symbols.iter().collect();
        symbols.sort_by_key(|s| (s.start.line, s.start.column));
        for symbol in symbols {
            if writer.push_line(&symbol_line(symbol)) {
                symbol_count += 1;
            }
        }
    }

    CodeMap {
        section: writer.finish(),
        file_count,
        symbol_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_symbols::SymbolParser;

    fn parsed(path: &str, source: &str) -> (String, Arc<ParsedFile>) {
        let parser = SymbolParser::default();
        (path.to_string(), Arc::new(parser.parse_source(path, source)))
    }

    #[test]
    fn lists_symbols_in_file_order() {
        let files = vec![
            parsed(
                "src/runner.ts",
                "export function main() {}\nfunction helper() {}\n",
            ),
            parsed("README.md", "# nothing to see"),
        ];
        let map = render_code_map(&files, 1_000);
        assert_eq!(
            map.section.content,
            "src/runner.ts (typescript)\n  function main (1) [export]\n  function helper (2)\n"
        );
        assert_eq!(map.file_count, 1);
        assert_eq!(map.symbol_count, 2);
    }

    #[test]
    fn budget_cuts_lower_ranked_files() {
        let files: Vec<(String, Arc<ParsedFile>)> = (0..50)
            .map(|i| parsed(&format!("src/f{i}.ts"), &format!("export function f{i}() {{}}\n")))
            .collect();
        let map = render_code_map(&files, 40);
        assert!(map.section.truncated);
        assert!(map.section.tokens <= 40);
        assert!(map.file_count < 50);
        assert!(map.section.content.starts_with("src/f0.ts"));
    }
}
