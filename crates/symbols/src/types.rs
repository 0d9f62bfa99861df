use serde::{Deserialize, Serialize};

/// Kind of an extracted declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Method,
    Enum,
    Constant,
}

impl SymbolKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Method => "method",
            Self::Enum => "enum",
            Self::Constant => "constant",
        }
    }

    /// Functions and methods.
    pub const fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source position (1-indexed line, 0-indexed column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start: Position,
    pub end: Position,

    /// Declaration head up to the body, whitespace-collapsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Decision points inside the declaration, starting at 1
    pub complexity: u32,

    /// Visible outside its module (export keyword, `pub`, naming convention)
    pub exported: bool,

    pub is_async: bool,

    /// Identifier occurrences elsewhere in the same file
    pub reference_count: u32,

    /// A doc comment or docstring accompanies the declaration
    #[serde(default)]
    pub documented: bool,

    /// Owning class, trait or impl target for members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Workspace-relative path of the owning file
    pub file: String,
}

impl ExtractedSymbol {
    /// `Parent.name` for members, plain `name` otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }

    #[must_use]
    pub const fn line_span(&self) -> usize {
        self.end.line.saturating_sub(self.start.line) + 1
    }
}

/// Result of parsing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,

    /// Language tag; `"unknown"` when the file could not be parsed
    pub language: String,

    pub symbols: Vec<ExtractedSymbol>,

    pub parse_duration_ms: u64,

    /// Top-level import lines (capped)
    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub line_count: usize,
}

impl ParsedFile {
    pub const UNKNOWN_LANGUAGE: &'static str = "unknown";

    /// Empty result for files without a usable parse.
    pub fn unknown(path: impl Into<String>, line_count: usize) -> Self {
        Self {
            path: path.into(),
            language: Self::UNKNOWN_LANGUAGE.to_string(),
            symbols: Vec::new(),
            parse_duration_ms: 0,
            imports: Vec::new(),
            line_count,
        }
    }

    /// Empty result for a recognized language without a grammar.
    pub fn without_symbols(path: impl Into<String>, language: &str, line_count: usize) -> Self {
        Self {
            language: language.to_string(),
            ..Self::unknown(path, line_count)
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.language == Self::UNKNOWN_LANGUAGE
    }

    pub fn exported_symbols(&self) -> impl Iterator<Item = &ExtractedSymbol> {
        self.symbols.iter().filter(|s| s.exported)
    }

    pub fn find_symbol(&self, name: &str) -> Option<&ExtractedSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Highest per-symbol complexity, 0 for files without symbols.
    pub fn max_complexity(&self) -> u32 {
        self.symbols.iter().map(|s| s.complexity).max().unwrap_or(0)
    }

    pub fn total_references(&self) -> u32 {
        self.symbols.iter().map(|s| s.reference_count).sum()
    }
}
