// source.rs — Source files and locations
//
// A compilation unit may span several files pulled together by `@include`.
// Files live in a `SourceFiles` table and are referred to by `FileId`, so
// AST nodes and include back-references never own one another.
//
// Preconditions: none.
// Postconditions: a path is registered at most once per table.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;
use std::path::{Path, PathBuf};

// ── File identity ───────────────────────────────────────────────────────────

/// Index of a file in its unit's `SourceFiles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub usize);

/// A (line, file) pair. Lines are 1-based; line 0 means "before any code".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub file: FileId,
}

impl SourceLoc {
    pub fn new(line: u32, file: FileId) -> Self {
        SourceLoc { line, file }
    }
}

/// The place an `@include` directive pulled a file in from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeSite {
    /// The including file.
    pub file: FileId,
    /// Location of the directive inside the including file.
    pub loc: SourceLoc,
}

/// One source file of a compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Name as written by the user (or in the include directive).
    pub file_name: String,
    /// Absolute path; the identity of the file.
    pub full_path: PathBuf,
    /// Include directives that pulled this file in. Diagnostics only.
    pub included_from: Vec<IncludeSite>,
}

// ── File table ──────────────────────────────────────────────────────────────

/// Table of every file touched by one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct SourceFiles {
    files: Vec<SourceFile>,
}

impl SourceFiles {
    pub fn new() -> Self {
        SourceFiles::default()
    }

    /// Register `full_path`, returning the existing id if it is already known.
    pub fn add(&mut self, file_name: impl Into<String>, full_path: &Path) -> FileId {
        if let Some(id) = self.find(full_path) {
            return id;
        }
        self.files.push(SourceFile {
            file_name: file_name.into(),
            full_path: full_path.to_path_buf(),
            included_from: Vec::new(),
        });
        FileId(self.files.len() - 1)
    }

    pub fn find(&self, full_path: &Path) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.full_path == full_path)
            .map(FileId)
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0)
    }

    pub fn get_mut(&mut self, id: FileId) -> Option<&mut SourceFile> {
        self.files.get_mut(id.0)
    }

    /// Display name of a file, or `<unknown>` for a foreign id.
    pub fn name(&self, id: FileId) -> &str {
        self.get(id).map_or("<unknown>", |f| f.file_name.as_str())
    }

    /// Follow `included_from` links up to the file that started the unit.
    pub fn top_file(&self, mut id: FileId) -> FileId {
        // Bounded by the table size so a malformed table cannot loop forever.
        for _ in 0..self.files.len() {
            match self.get(id).and_then(|f| f.included_from.first()) {
                Some(site) => id = site.file,
                None => break,
            }
        }
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files.iter().enumerate().map(|(i, f)| (FileId(i), f))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ── Line index ──────────────────────────────────────────────────────────────

/// Maps byte offsets of one source text to 1-based line numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex { starts }
    }

    /// 1-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        self.starts.partition_point(|&start| start <= offset) as u32
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}
