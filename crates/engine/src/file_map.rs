//! Indented tree of the candidate files with per-file token estimates.

use crate::section::{RenderedSection, SectionWriter};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapEntry {
    pub path: String,
    pub tokens: usize,
    pub selected: bool,
}

#[derive(Default)]
struct DirNode<'a> {
    dirs: BTreeMap<&'a str, DirNode<'a>>,
    files: BTreeMap<&'a str, &'a FileMapEntry>,
}

impl<'a> DirNode<'a> {
    fn insert(&mut self, entry: &'a FileMapEntry) {
        let mut node = self;
        let mut parts = entry.path.split('/').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.files.insert(part, entry);
            } else {
                node = node.dirs.entry(part).or_default();
            }
        }
    }

    fn line_count(&self) -> usize {
        self.files.len()
            + self
                .dirs
                .values()
                .map(|d| 1 + d.line_count())
                .sum::<usize>()
    }

    fn render(&self, depth: usize, out: &mut SectionWriter) {
        let indent = "  ".repeat(depth);
        for (name, dir) in &self.dirs {
            if out.is_full() {
                out.skip(1 + dir.line_count());
                continue;
            }
            out.push_line(&format!("{indent}{name}/"));
            dir.render(depth + 1, out);
        }
        for (name, entry) in &self.files {
            let mark = if entry.selected { " *" } else { "" };
            out.push_line(&format!("{indent}{name} ({} tokens){mark}", entry.tokens));
        }
    }
}

/// Render `entries` as a directory tree within `budget` tokens. Selected
/// files are marked with `*`.
pub fn render_file_map(entries: &[FileMapEntry], budget: usize) -> RenderedSection {
    let mut root = DirNode::default();
    for entry in entries {
        root.insert(entry);
    }
    let selected = entries.iter().filter(|e| e.selected).count();
    let mut writer = SectionWriter::new(budget);
    writer.push_line(&format!("{} files, {selected} selected", entries.len()));
    root.render(0, &mut writer);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(path: &str, tokens: usize, selected: bool) -> FileMapEntry {
        FileMapEntry {
            path: path.to_string(),
            tokens,
            selected,
        }
    }

    #[test]
    fn renders_nested_tree() {
        let entries = vec![
            entry("README.md", 10, false),
            entry("src/main.ts", 120, true),
            entry("src/util/a.ts", 40, false),
        ];
        let section = render_file_map(&entries, 1_000);
        assert_eq!(
            section.content,
            "3 files, 1 selected\nsrc/\n  util/\n    a.ts (40 tokens)\n  main.ts (120 tokens) *\nREADME.md (10 tokens)\n"
        );
        assert!(!section.truncated);
    }

    #[test]
    fn truncates_to_budget() {
        let entries: Vec<FileMapEntry> = (0..200)
            .map(|i| entry(&format!("src/file_{i:03}.ts"), 100, false))
            .collect();
        let section = render_file_map(&entries, 50);
        assert!(section.truncated);
        assert!(section.tokens <= 50);
        assert!(section.omitted_lines > 150);
        assert!(section.content.starts_with("200 files, 0 selected\nsrc/\n"));
    }
}
