//! Language adapters for annotation scanning
//!
//! Each supported language is described by an adapter value: its file
//! extensions and which comment constructs the extractor should recognize.
//! The extraction algorithm itself is shared; adapters only parameterize
//! the comment grammar.

use std::path::Path;

/// Directories never descended into, regardless of nesting depth
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    ".git",
    "build",
    "dist",
    "target",
    ".idea",
    ".vscode",
    "__pycache__",
    ".gradle",
    ".mvn",
];

/// Source files above this size are skipped: 10 MiB
pub const MAX_SOURCE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Comment grammar for one language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageAdapter {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    /// Recognize `/* ... */` and `/** ... */` blocks
    pub block_comments: bool,
    /// Recognize runs of `// ...` lines as one block
    pub line_comments: bool,
}

pub const JAVA: LanguageAdapter = LanguageAdapter {
    name: "java",
    extensions: &["java"],
    block_comments: true,
    line_comments: false,
};

pub const TYPESCRIPT: LanguageAdapter = LanguageAdapter {
    name: "typescript",
    extensions: &["ts", "tsx"],
    block_comments: true,
    line_comments: true,
};

pub const GO: LanguageAdapter = LanguageAdapter {
    name: "go",
    extensions: &["go"],
    block_comments: true,
    line_comments: true,
};

/// Registry of supported languages, keyed by file extension
pub const ADAPTERS: &[&LanguageAdapter] = &[&JAVA, &TYPESCRIPT, &GO];

/// Find the adapter responsible for a path, by extension
pub fn adapter_for_path(path: &Path) -> Option<&'static LanguageAdapter> {
    let extension = path.extension()?.to_str()?;
    ADAPTERS
        .iter()
        .find(|adapter| adapter.extensions.contains(&extension))
        .copied()
}

/// True when a directory name should never be entered
pub fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Hidden entries start with a dot
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
