// registry.rs — Source registry for multi-file units
//
// Follows `@include` directives from a root file and merges every reached
// file into one `Ast`. A target is looked up next to the including file
// first, then in each search directory in order.
//
// Preconditions: none.
// Postconditions: each file is read and parsed at most once per unit; the
//   declarations of an included file precede those of its includer; only
//   the root file's include directives and top-level call are kept.
// Failure modes: `IncludeNotFound`, `CyclicInclude`, `Io`, plus any error
//   from parsing a reached file.
// Side effects: reads files.

use std::path::{Path, PathBuf};

use crate::ast::{Ast, ParsedFile};
use crate::diag::{Error, Result};
use crate::frontend;
use crate::source::{FileId, IncludeSite};

// ── Registry ────────────────────────────────────────────────────────────────

/// Resolves and loads the files of a compilation unit.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    search_paths: Vec<PathBuf>,
}

impl SourceRegistry {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        SourceRegistry { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Read `path` and build the unit rooted at it.
    pub fn parse_file(&self, path: &Path) -> Result<Ast> {
        let source = read(path)?;
        self.parse_unit(&source, path)
    }

    /// Build the unit rooted at already-read `source`. Relative includes
    /// resolve against the directory of `path`.
    pub fn parse_unit(&self, source: &str, path: &Path) -> Result<Ast> {
        let name = path.display().to_string();
        let mut loader = Loader {
            registry: self,
            ast: Ast::default(),
            stack: Vec::new(),
        };
        let root = loader.ast.files.add(name.clone(), &identity(path));
        loader.stack.push(root);
        let parsed = frontend::load(source, root, &name, &mut loader.ast.interner)?;
        loader.includes(root, &parsed)?;
        frontend::merge(&mut loader.ast, parsed, &name, true)?;
        log::debug!(
            "{name}: unit of {} files, {} callables",
            loader.ast.files.len(),
            loader.ast.callables.len()
        );
        Ok(loader.ast)
    }

    /// Find the file an include directive names. On failure, returns the
    /// directories that were searched.
    pub fn resolve(
        &self,
        include: &str,
        from_dir: Option<&Path>,
    ) -> std::result::Result<PathBuf, Vec<PathBuf>> {
        let mut searched = Vec::new();
        let dirs = from_dir
            .into_iter()
            .chain(self.search_paths.iter().map(PathBuf::as_path));
        for dir in dirs {
            let candidate = dir.join(include);
            if candidate.is_file() {
                return Ok(identity(&candidate));
            }
            searched.push(dir.to_path_buf());
        }
        Err(searched)
    }
}

// ── Loader ──────────────────────────────────────────────────────────────────

/// Depth-first walk over the include graph of one unit.
struct Loader<'r> {
    registry: &'r SourceRegistry,
    ast: Ast,
    /// Files whose parse is in progress, outermost first.
    stack: Vec<FileId>,
}

impl Loader<'_> {
    fn includes(&mut self, file: FileId, parsed: &ParsedFile) -> Result<()> {
        let dir = self
            .ast
            .files
            .get(file)
            .and_then(|f| f.full_path.parent())
            .map(Path::to_path_buf);
        for include in &parsed.includes {
            let site = IncludeSite {
                file,
                loc: include.node.loc,
            };
            let path = self
                .registry
                .resolve(&include.value, dir.as_deref())
                .map_err(|searched| Error::IncludeNotFound {
                    file: self.ast.files.name(file).to_string(),
                    line: site.loc.line,
                    include: include.value.clone(),
                    searched,
                })?;
            self.visit(&include.value, &path, site)?;
        }
        Ok(())
    }

    fn visit(&mut self, name: &str, path: &Path, site: IncludeSite) -> Result<()> {
        if let Some(id) = self.ast.files.find(path) {
            // Known files are either on the stack (a cycle) or finished.
            if let Some(pos) = self.stack.iter().position(|&f| f == id) {
                let files = &self.ast.files;
                let mut chain: Vec<String> = self.stack[pos..]
                    .iter()
                    .map(|&f| files.name(f).to_string())
                    .collect();
                chain.push(files.name(id).to_string());
                return Err(Error::CyclicInclude {
                    file: files.name(site.file).to_string(),
                    line: site.loc.line,
                    chain,
                });
            }
            log::trace!("{name}: already loaded");
            if let Some(f) = self.ast.files.get_mut(id) {
                f.included_from.push(site);
            }
            return Ok(());
        }

        let source = read(path)?;
        let id = self.ast.files.add(name, path);
        if let Some(f) = self.ast.files.get_mut(id) {
            f.included_from.push(site);
        }
        log::debug!("including {}", path.display());

        self.stack.push(id);
        let parsed = frontend::load(&source, id, name, &mut self.ast.interner)?;
        self.includes(id, &parsed)?;
        frontend::merge(&mut self.ast, parsed, name, false)?;
        self.stack.pop();
        Ok(())
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Identity of a file: its canonical path when it exists.
fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| frontend::absolute(path))
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::diag::codes;

    const STAGE_A: &str = "stage A(\n    src py \"a\",\n)\n";

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).expect("write fixture");
        path
    }

    #[test]
    fn relative_include_is_merged_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "lib.mro", STAGE_A);
        let main = write(
            dir.path(),
            "main.mro",
            "@include \"lib.mro\"\n\npipeline P()\n{\n    call A()\n\n    return ()\n}\n",
        );
        let ast = SourceRegistry::default().parse_file(&main).expect("parse");
        let ids: Vec<_> = ast.callables.keys().map(|&k| ast.name(k)).collect();
        assert_eq!(ids, vec!["A", "P"]);
        assert_eq!(ast.files.len(), 2);
        assert_eq!(ast.includes.len(), 1);
        let lib = ast.files.get(FileId(1)).expect("lib file");
        assert_eq!(lib.file_name, "lib.mro");
        assert_eq!(lib.included_from[0].file, FileId(0));
    }

    #[test]
    fn search_paths_are_tried_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&first).expect("mkdir");
        fs::create_dir_all(&second).expect("mkdir");
        write(&first, "lib.mro", "filetype one;\n");
        write(&second, "lib.mro", "filetype two;\n");
        let main = write(dir.path(), "main.mro", "@include \"lib.mro\"\n");

        let reg = SourceRegistry::new(vec![first, second]);
        let ast = reg.parse_file(&main).expect("parse");
        assert_eq!(ast.name(ast.user_types[0].id), "one");
    }

    #[test]
    fn missing_include_lists_searched_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let main = write(dir.path(), "main.mro", "filetype x;\n@include \"nope.mro\"\n");
        let err = SourceRegistry::new(vec![PathBuf::from("/no/such/dir")])
            .parse_file(&main)
            .unwrap_err();
        assert_eq!(err.code(), codes::INCLUDE_NOT_FOUND);
        match err {
            Error::IncludeNotFound { searched, include, .. } => {
                assert_eq!(include, "nope.mro");
                assert_eq!(searched.len(), 2);
                assert_eq!(searched[1], PathBuf::from("/no/such/dir"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn include_cycle_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "a.mro", "@include \"b.mro\"\n");
        write(dir.path(), "b.mro", "@include \"a.mro\"\n");
        let main = dir.path().join("a.mro");
        let err = SourceRegistry::default().parse_file(&main).unwrap_err();
        match err {
            Error::CyclicInclude { file, line, chain } => {
                assert_eq!(file, "b.mro");
                assert_eq!(line, 1);
                assert_eq!(chain.len(), 3);
                assert_eq!(chain[1], "b.mro");
                assert_eq!(chain[2], chain[0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn diamond_include_parses_shared_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "common.mro", "filetype json;\n");
        write(dir.path(), "left.mro", "@include \"common.mro\"\n");
        write(dir.path(), "right.mro", "@include \"common.mro\"\n");
        let main = write(
            dir.path(),
            "main.mro",
            "@include \"left.mro\"\n@include \"right.mro\"\n",
        );
        let ast = SourceRegistry::default().parse_file(&main).expect("parse");
        assert_eq!(ast.user_types.len(), 1);
        assert_eq!(ast.files.len(), 4);
        let common = ast
            .files
            .iter()
            .find(|(_, f)| f.file_name == "common.mro")
            .map(|(_, f)| f)
            .expect("common.mro");
        assert_eq!(common.included_from.len(), 2);
    }

    #[test]
    fn duplicate_callable_across_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "lib.mro", STAGE_A);
        let main = write(dir.path(), "main.mro", &format!("@include \"lib.mro\"\n\n{STAGE_A}"));
        let err = SourceRegistry::default().parse_file(&main).unwrap_err();
        assert_eq!(err.code(), codes::DUPLICATE_IDENTIFIER);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn unreadable_root_is_io_error() {
        let err = SourceRegistry::default()
            .parse_file(Path::new("/definitely/not/here.mro"))
            .unwrap_err();
        assert_eq!(err.code(), codes::IO);
    }
}
