// frontend.rs — Source text to `Ast`
//
// Drives one file through lex → parse → comment attachment → validation and
// merges the result into a compilation unit. `parse_source` handles a lone
// file without touching the filesystem; multi-file units go through
// `registry::SourceRegistry`.
//
// Preconditions: none.
// Postconditions: the returned `Ast` satisfies every structural rule; no
//   partial AST is ever returned.
// Failure modes: `Lex`, `Parse`, `DuplicateIdentifier`.
// Side effects: none.

use std::path::{Path, PathBuf};

use crate::ast::*;
use crate::diag::{Error, Result};
use crate::intern::Interner;
use crate::source::FileId;

/// Parse a single source text. `@include` directives are kept but not
/// followed.
pub fn parse_source(source: &str, file_name: &str) -> Result<Ast> {
    let mut ast = Ast::default();
    let file = ast.files.add(file_name, &absolute(Path::new(file_name)));
    let parsed = load(source, file, file_name, &mut ast.interner)?;
    merge(&mut ast, parsed, file_name, true)?;
    Ok(ast)
}

/// Parse, attach comments and validate one file of a unit.
pub(crate) fn load(
    source: &str,
    file: FileId,
    file_name: &str,
    interner: &mut Interner,
) -> Result<ParsedFile> {
    let mut parsed = crate::parser::parse(source, file, file_name, interner)?;
    crate::comments::attach(&mut parsed);
    crate::validate::check_file(&parsed, file_name, interner)?;
    Ok(parsed)
}

/// Add one file's declarations to `ast`. Only the root file contributes
/// include directives and the top-level call.
pub(crate) fn merge(ast: &mut Ast, parsed: ParsedFile, file_name: &str, root: bool) -> Result<()> {
    if root {
        ast.includes = parsed.includes;
        ast.call = parsed.call;
    } else if parsed.call.is_some() {
        log::warn!("{file_name}: ignoring top-level call in included file");
    }

    for dec in parsed.decs {
        let callable = match dec {
            Dec::UserType(t) => {
                ast.user_types.push(t);
                continue;
            }
            Dec::Stage(s) => Callable::Stage(s),
            Dec::Pipeline(p) => Callable::Pipeline(p),
        };
        let id = callable.id();
        if ast.callables.contains_key(&id) {
            return Err(Error::DuplicateIdentifier {
                file: file_name.to_string(),
                line: callable.node().loc.line,
                kind: "callable",
                id: ast.name(id).to_string(),
            });
        }
        ast.callables.insert(id, callable);
    }
    ast.comments.extend(parsed.comments);
    Ok(())
}

/// Absolute form of `path`, used as file identity. Falls back to the path
/// as given when the working directory is unavailable.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
