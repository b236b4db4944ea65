// format.rs — Canonical MRO text from an `Ast`
//
// Renders a compilation unit as deterministic, column-aligned source text.
// Formatting canonical text reproduces it byte for byte.
//
// The `Printer` carries the file of the last node it printed comments for.
// When output crosses into a different file an `# @include` banner is
// emitted after flushing the previous file's pooled comments. Within one
// node's scope comments, a single blank line between two of them in the
// source is kept.
//
// Preconditions: `ast` came from the front end (or obeys the same rules).
// Postconditions: output ends with a newline unless the unit is empty.
// Failure modes: formatting an `Ast` never fails; `format_source*` report
//   front-end and include-rewrite errors.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::ast::*;
use crate::diag::{Error, Result};
use crate::intern::DEFAULT_ID;
use crate::literal;
use crate::source::FileId;
use crate::toposort::topo_order;

pub const INDENT: &str = "    ";

/// Parameter ids this long or longer do not widen the id column.
const MAX_ALIGNED_PARAM_ID: usize = 35;
/// Help strings this long or longer do not widen the help column.
const MAX_ALIGNED_HELP: usize = 25;
/// Binding ids this long or longer do not widen the `=` column.
const MAX_ALIGNED_BINDING_ID: usize = 30;
/// Past these widths the split block is measured on its own.
const SPLIT_REMEASURE_ID: usize = 30;
const SPLIT_REMEASURE_HELP: usize = 20;

// ── Public API ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Print `@include` directives. Off for flattened multi-file output.
    pub write_includes: bool,
    /// Handed to the include rewriter, if any.
    pub search_paths: Vec<PathBuf>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            write_includes: true,
            search_paths: Vec::new(),
        }
    }
}

/// Post-parse transform that may rewrite include directive paths in place.
pub trait IncludeRewriter {
    fn rewrite(
        &self,
        ast: &mut Ast,
        search_paths: &[PathBuf],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Parse one source text and return its canonical form.
pub fn format_source(source: &str, file_name: &str) -> Result<String> {
    format_source_with(source, file_name, &FormatOptions::default(), None)
}

pub fn format_source_with(
    source: &str,
    file_name: &str,
    options: &FormatOptions,
    rewriter: Option<&dyn IncludeRewriter>,
) -> Result<String> {
    let mut ast = crate::frontend::parse_source(source, file_name)?;
    if let Some(rewriter) = rewriter {
        rewriter
            .rewrite(&mut ast, &options.search_paths)
            .map_err(Error::Rewrite)?;
    }
    Ok(format_ast(&ast, options.write_includes))
}

/// Render a unit.
pub fn format_ast(ast: &Ast, write_includes: bool) -> String {
    let mut printer = Printer::new(ast);
    printer.unit(write_includes);
    printer.out
}

// ── Printer ─────────────────────────────────────────────────────────────────

/// One binding as printed. Synthetic modifier bindings borrow printer-local
/// nodes, so this does not point into a `BindStm`.
struct Binding<'b> {
    id: &'b str,
    node: &'b AstNode,
    exp: &'b Exp,
    sweep: bool,
}

fn binding_views<'b>(ast: &'b Ast, stms: &'b BindStms) -> Vec<Binding<'b>> {
    stms.list
        .iter()
        .map(|b| Binding {
            id: ast.name(b.id),
            node: &b.node,
            exp: &b.exp,
            sweep: b.sweep,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Widths {
    mode: usize,
    ty: usize,
    id: usize,
    help: usize,
}

fn pad(width: usize, len: usize) -> String {
    " ".repeat(width.saturating_sub(len))
}

struct Printer<'a> {
    ast: &'a Ast,
    out: String,
    /// Unattached comments per file, flushed when output leaves the file.
    pool: BTreeMap<FileId, Vec<&'a CommentBlock>>,
    /// File of the last node or comment printed; `None` before the first
    /// one when the unit has no file table.
    last_file: Option<FileId>,
}

impl<'a> Printer<'a> {
    fn new(ast: &'a Ast) -> Self {
        let mut pool: BTreeMap<FileId, Vec<&'a CommentBlock>> = BTreeMap::new();
        for comment in &ast.comments {
            pool.entry(comment.loc.file).or_default().push(comment);
        }
        // Start at the top of the root file so that declarations merged in
        // from an include get their banner.
        let last_file = (!ast.files.is_empty()).then(|| ast.files.top_file(FileId(0)));
        Printer {
            ast,
            out: String::new(),
            pool,
            last_file,
        }
    }

    fn print_comments(&mut self, node: &AstNode, prefix: &str) {
        if let Some(last) = self.last_file {
            if last != node.loc.file {
                self.dump_file_comments(last);
                let _ = write!(
                    self.out,
                    "#\n# @include \"{}\"\n#\n\n",
                    self.ast.files.name(node.loc.file)
                );
            }
        }
        // Only gaps between comments of this node count; the separator
        // before the node is the printer's own.
        let mut prev_line = None;
        for c in &node.scope_comments {
            if prev_line.is_some_and(|l: u32| l + 2 == c.loc.line) {
                self.out.push('\n');
            }
            prev_line = Some(c.loc.line);
            let _ = writeln!(self.out, "{prefix}{}", c.value);
        }
        if !node.scope_comments.is_empty() {
            self.out.push('\n');
        }
        for c in &node.comments {
            let _ = writeln!(self.out, "{prefix}{c}");
        }
        self.last_file = Some(node.loc.file);
    }

    fn dump_file_comments(&mut self, file: FileId) {
        for c in self.pool.remove(&file).unwrap_or_default() {
            let _ = writeln!(self.out, "{}", c.value);
        }
    }

    fn dump_all_comments(&mut self) {
        for c in std::mem::take(&mut self.pool).into_values().flatten() {
            let _ = writeln!(self.out, "{}", c.value);
        }
    }

    // ── Unit ──

    fn unit(&mut self, write_includes: bool) {
        let ast = self.ast;
        let mut need_spacer = false;

        if write_includes {
            for include in &ast.includes {
                self.print_comments(&include.node, "");
                let _ = writeln!(self.out, "@include \"{}\"", include.value);
                need_spacer = true;
            }
        }

        if need_spacer && !ast.user_types.is_empty() {
            self.out.push('\n');
        }
        for user_type in &ast.user_types {
            self.print_comments(&user_type.node, "");
            let _ = writeln!(self.out, "filetype {};", ast.name(user_type.id));
            need_spacer = true;
        }

        if need_spacer && !ast.callables.is_empty() {
            self.out.push('\n');
        }
        for (i, callable) in ast.callables.values().enumerate() {
            if i != 0 {
                self.out.push('\n');
            }
            match callable {
                Callable::Stage(stage) => self.stage(stage),
                Callable::Pipeline(pipeline) => self.pipeline(pipeline),
            }
        }

        if let Some(call) = &ast.call {
            if !ast.callables.is_empty() || need_spacer {
                self.out.push('\n');
            }
            self.call(call, "");
        }

        // Comments after the last node of each file.
        self.dump_all_comments();
    }

    // ── Parameters ──

    fn measure<'p>(&self, list: impl Iterator<Item = Param<'p>>) -> Widths {
        let mut w = Widths::default();
        for p in list {
            let id_len = self.ast.name(p.id()).len();
            let help_len = p.help().map_or(0, str::len);
            w.mode = w.mode.max(p.mode().len());
            w.ty = w.ty.max(self.ast.name(p.tname()).len() + 2 * p.array_dim());
            if id_len < MAX_ALIGNED_PARAM_ID {
                w.id = w.id.max(id_len);
            }
            if help_len < MAX_ALIGNED_HELP {
                w.help = w.help.max(help_len);
            }
        }
        w
    }

    fn param(&mut self, p: Param<'_>, w: Widths) {
        let ast = self.ast;
        self.print_comments(p.node(), INDENT);
        let id = match ast.name(p.id()) {
            DEFAULT_ID => "",
            id => id,
        };
        let mode = p.mode();
        let tname = ast.name(p.tname());
        let help = p.help().unwrap_or_default();
        let type_pad = pad(w.ty, tname.len() + 2 * p.array_dim());
        let id_pad = pad(w.id, id.len());

        let _ = write!(
            self.out,
            "{INDENT}{mode}{} {tname}{}",
            pad(w.mode, mode.len()),
            "[]".repeat(p.array_dim())
        );
        if !id.is_empty() {
            let _ = write!(self.out, "{type_pad} {id}");
        }
        if !help.is_empty() {
            if id.is_empty() {
                let _ = write!(self.out, "{type_pad} ");
            }
            let _ = write!(self.out, "{id_pad}  \"{help}\"");
        }
        if let Some(out_name) = p.out_name() {
            if help.is_empty() {
                let _ = write!(self.out, "{id_pad}  ");
            }
            let _ = write!(self.out, "{}  \"{out_name}\"", pad(w.help, help.len()));
        }
        self.out.push_str(",\n");
    }

    fn params(&mut self, ins: &[InParam], outs: &[OutParam], w: Widths) {
        for p in params(ins, outs) {
            self.param(p, w);
        }
    }

    // ── Stage ──

    fn stage(&mut self, stage: &Stage) {
        let ast = self.ast;
        self.print_comments(&stage.node, "");

        let chunk = stage
            .split
            .iter()
            .flat_map(|s| params(&s.in_params, &s.out_params));
        let mut w = self.measure(params(&stage.in_params, &stage.out_params).chain(chunk));
        w.mode = w.mode.max("src".len());

        let _ = writeln!(self.out, "stage {}(", ast.name(stage.id));
        self.params(&stage.in_params, &stage.out_params, w);
        self.src(&stage.src, w);
        if let Some(split) = &stage.split {
            if w.id > SPLIT_REMEASURE_ID || w.help > SPLIT_REMEASURE_HELP {
                let own = self.measure(params(&split.in_params, &split.out_params));
                w.id = own.id;
                w.help = own.help;
            }
            self.print_comments(&split.node, INDENT);
            self.out.push_str(") split (\n");
            self.params(&split.in_params, &split.out_params, w);
        }
        if let Some(resources) = &stage.resources {
            self.resources(resources);
        }
        if let Some(retain) = &stage.retain {
            self.print_comments(&retain.node, INDENT);
            self.out.push_str(") retain (\n");
            for param in &retain.params {
                self.print_comments(&param.node, INDENT);
                let _ = writeln!(self.out, "{INDENT}{},", ast.name(param.id));
            }
        }
        self.out.push_str(")\n");
    }

    fn src(&mut self, src: &SrcParam, w: Widths) {
        self.print_comments(&src.node, INDENT);
        let lang = self.ast.name(src.lang);
        let command = std::iter::once(src.path.as_str())
            .chain(src.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            self.out,
            "{INDENT}src{} {lang}{} \"{command}\",",
            pad(w.mode, "src".len()),
            pad(w.ty, lang.len())
        );
    }

    fn resources(&mut self, res: &Resources) {
        self.print_comments(&res.node, INDENT);
        self.out.push_str(") using (\n");
        // mem_gb   = x,
        // special  = y,
        // threads  = y,
        // volatile = strict,
        let (mem_pad, thread_pad) = if res.volatile.is_some() {
            ("  ", " ")
        } else if res.special.is_some() || res.threads.is_some() {
            (" ", "")
        } else {
            ("", "")
        };
        if let Some(mem) = &res.mem_gb {
            self.print_comments(&mem.node, INDENT);
            let _ = writeln!(
                self.out,
                "{INDENT}mem_gb{mem_pad} = {},",
                literal::format_int(mem.value)
            );
        }
        if let Some(special) = &res.special {
            self.print_comments(&special.node, INDENT);
            let _ = writeln!(
                self.out,
                "{INDENT}special{thread_pad} = {},",
                literal::format_string(&special.value)
            );
        }
        if let Some(threads) = &res.threads {
            self.print_comments(&threads.node, INDENT);
            let _ = writeln!(
                self.out,
                "{INDENT}threads{thread_pad} = {},",
                literal::format_int(threads.value)
            );
        }
        if let Some(node) = &res.volatile {
            self.print_comments(node, INDENT);
            let _ = writeln!(self.out, "{INDENT}volatile = strict,");
        }
    }

    // ── Pipeline ──

    fn pipeline(&mut self, pipeline: &Pipeline) {
        let ast = self.ast;
        self.print_comments(&pipeline.node, "");

        let w = self.measure(params(&pipeline.in_params, &pipeline.out_params));
        let _ = writeln!(self.out, "pipeline {}(", ast.name(pipeline.id));
        self.params(&pipeline.in_params, &pipeline.out_params, w);
        self.out.push_str(")\n{");

        for i in topo_order(&pipeline.calls) {
            self.out.push('\n');
            self.call(&pipeline.calls[i], INDENT);
        }

        self.out.push('\n');
        self.print_comments(&pipeline.ret.node, INDENT);
        let _ = writeln!(self.out, "{INDENT}return (");
        let views = binding_views(ast, &pipeline.ret.bindings);
        self.bindings(&pipeline.ret.bindings.node, &views, INDENT);
        let _ = writeln!(self.out, "{INDENT})");

        if let Some(retain) = &pipeline.retain {
            self.out.push('\n');
            self.print_comments(&retain.node, INDENT);
            let _ = writeln!(self.out, "{INDENT}retain (");
            let inner = format!("{INDENT}{INDENT}");
            for r in &retain.refs {
                self.print_comments(&r.node, &inner);
                self.out.push_str(&inner);
                self.ref_exp(r);
                self.out.push_str(",\n");
            }
            let _ = writeln!(self.out, "{INDENT})");
        }
        self.out.push_str("}\n");
    }

    // ── Calls and bindings ──

    fn call(&mut self, call: &CallStm, prefix: &str) {
        let ast = self.ast;
        self.print_comments(&call.node, prefix);
        let _ = write!(self.out, "{prefix}call {}", ast.name(call.dec_id));
        if call.id != call.dec_id {
            let _ = write!(self.out, " as {}", ast.name(call.id));
        }
        self.out.push_str("(\n");
        let views = binding_views(ast, &call.bindings);
        self.bindings(&call.bindings.node, &views, prefix);
        self.out.push_str(prefix);

        let mods = &call.modifiers;
        if !mods.is_empty() {
            self.out.push_str(") using (\n");
            // Bare modifiers print in bound form; an explicit binding of the
            // same name wins.
            let loc = mods.bindings.as_ref().map_or(call.node.loc, |b| b.node.loc);
            let synthetic_node = AstNode::new(loc);
            let synthetic_true = Exp::Val(ValExp {
                node: synthetic_node.clone(),
                value: Value::Bool(true),
            });
            let mut list = mods
                .bindings
                .as_ref()
                .map(|b| binding_views(ast, b))
                .unwrap_or_default();
            for (set, id) in [
                (mods.local, "local"),
                (mods.preflight, "preflight"),
                (mods.volatile, "volatile"),
            ] {
                if set && !list.iter().any(|b| b.id == id) {
                    list.push(Binding {
                        id,
                        node: &synthetic_node,
                        exp: &synthetic_true,
                        sweep: false,
                    });
                }
            }
            list.sort_by(|a, b| a.id.cmp(b.id));
            let stms_node = mods.bindings.as_ref().map_or(&synthetic_node, |b| &b.node);
            self.bindings(stms_node, &list, prefix);
            self.out.push_str(prefix);
        }
        self.out.push_str(")\n");
    }

    fn bindings(&mut self, node: &AstNode, list: &[Binding<'_>], prefix: &str) {
        self.print_comments(node, prefix);
        let width = list
            .iter()
            .map(|b| b.id.len())
            .filter(|&n| n < MAX_ALIGNED_BINDING_ID)
            .max()
            .unwrap_or(0);
        let inner = format!("{prefix}{INDENT}");
        for b in list {
            self.print_comments(b.node, &inner);
            self.print_comments(b.exp.node(), &inner);
            let _ = write!(self.out, "{inner}{}{} = ", b.id, pad(width, b.id.len()));
            match b.exp {
                Exp::Val(ValExp {
                    value: Value::Array(items),
                    ..
                }) if b.sweep && items.len() > 1 => self.sweep(items, &inner),
                exp => self.exp(exp, &inner),
            }
            self.out.push_str(",\n");
        }
    }

    // ── Expressions ──

    fn sweep(&mut self, items: &[Exp], prefix: &str) {
        self.out.push_str("sweep(\n");
        self.items(items, prefix);
        self.out.push(')');
    }

    /// One item per line at `prefix` + one indent, then `prefix`.
    fn items(&mut self, items: &[Exp], prefix: &str) {
        let inner = format!("{prefix}{INDENT}");
        for item in items {
            self.out.push_str(&inner);
            self.exp(item, &inner);
            self.out.push_str(",\n");
        }
        self.out.push_str(prefix);
    }

    fn exp(&mut self, exp: &Exp, prefix: &str) {
        let value = match exp {
            Exp::Ref(r) => return self.ref_exp(r),
            Exp::Val(v) => &v.value,
        };
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => self.out.push_str(literal::format_bool(*b)),
            Value::Int(n) => self.out.push_str(&literal::format_int(*n)),
            Value::Float(f) => self.out.push_str(&literal::format_float(*f)),
            Value::String(s) => self.out.push_str(&literal::format_string(s)),
            Value::Array(items) => match items.as_slice() {
                [] => self.out.push_str("[]"),
                [only] => {
                    self.out.push('[');
                    self.exp(only, prefix);
                    self.out.push(']');
                }
                _ => {
                    self.out.push_str("[\n");
                    self.items(items, prefix);
                    self.out.push(']');
                }
            },
            Value::Map(entries) if entries.is_empty() => self.out.push_str("{}"),
            Value::Map(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                self.out.push_str("{\n");
                let inner = format!("{prefix}{INDENT}");
                for key in keys {
                    let _ = write!(self.out, "{inner}\"{key}\": ");
                    self.exp(&entries[key.as_str()], &inner);
                    self.out.push_str(",\n");
                }
                self.out.push_str(prefix);
                self.out.push('}');
            }
        }
    }

    fn ref_exp(&mut self, r: &RefExp) {
        let ast = self.ast;
        match r.target {
            RefTarget::Call { id, output_id } => {
                self.out.push_str(ast.name(id));
                let output = ast.name(output_id);
                if output != DEFAULT_ID {
                    let _ = write!(self.out, ".{output}");
                }
            }
            RefTarget::SelfInput { id } => {
                let _ = write!(self.out, "self.{}", ast.name(id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::frontend;
    use crate::source::{IncludeSite, SourceLoc};

    fn fmt(source: &str) -> String {
        format_source(source, "test.mro").unwrap_or_else(|e| panic!("unexpected error: {e}"))
    }

    /// Canonical input must come back unchanged.
    fn assert_canonical(source: &str) {
        assert_eq!(fmt(source), source);
    }

    #[test]
    fn empty_unit() {
        assert_eq!(fmt(""), "");
    }

    #[test]
    fn normalizes_spacing() {
        let out = fmt("filetype json;filetype bam;stage A(in int x,out json y,src py \"a.py\",)");
        assert_eq!(
            out,
            "filetype json;\nfiletype bam;\n\nstage A(\n    in  int  x,\n    out json y,\n    src py   \"a.py\",\n)\n"
        );
    }

    #[test]
    fn param_columns_with_help_and_out_name() {
        assert_canonical(
            r#"stage SUM(
    in  int[] values,
    in  map   opts    "tuning knobs",
    out json  result  "merged output"  "result.json",
    src py    "stages/sum",
)
"#,
        );
    }

    #[test]
    fn unnamed_output_keeps_id_column() {
        // The sentinel's own length still counts toward the id column.
        assert_canonical(
            r#"stage A(
    in  int  x,
    out file          "data.bin",
    src py   "a",
)
"#,
        );
    }

    #[test]
    fn long_ids_do_not_widen_column() {
        assert_canonical(
            r#"stage A(
    in  int a_parameter_name_that_is_very_long_indeed,
    in  int b  "short",
    src py  "a",
)
"#,
        );
    }

    #[test]
    fn split_with_resources_and_retain() {
        assert_canonical(
            r#"stage A(
    in  int x,
    out bam y,
    src comp "bin/a mode=fast",
) split (
    in  int chunk,
    out int count,
) using (
    mem_gb   = 4,
    special  = "gpu",
    threads  = 2,
    volatile = strict,
) retain (
    y,
)
"#,
        );
    }

    #[test]
    fn resource_padding_without_volatile() {
        assert_canonical("stage A(\n    src py \"a\",\n) using (\n    mem_gb  = 0,\n    threads = 1,\n)\n");
        assert_canonical("stage A(\n    src py \"a\",\n) using (\n    mem_gb = 2,\n)\n");
    }

    #[test]
    fn legacy_split_using_is_canonicalized() {
        let out = fmt("stage A(\n    in int x,\n    src py \"a\",\n) split using (\n    in int y,\n)\n");
        assert_eq!(
            out,
            "stage A(\n    in  int x,\n    src py  \"a\",\n) split (\n    in  int y,\n)\n"
        );
    }

    #[test]
    fn split_measures_own_columns_after_long_id() {
        assert_canonical(
            r#"stage A(
    in  int chunk_boundary_alignment_source,
    src py  "a",
) split (
    in  int y      "chunk",
    out int count,
)
"#,
        );
    }

    #[test]
    fn split_measures_own_columns_after_long_help() {
        assert_canonical(
            r#"stage A(
    in  int x  "twenty-one characters",
    src py  "a",
) split (
    out int y  "h"  "out.txt",
)
"#,
        );
    }

    #[test]
    fn comment_above_split_stays_above_it() {
        assert_canonical(
            "stage A(\n    in  int x,\n    src py  \"a\",\n    # chunked by x\n) split (\n    in  int y,\n)\n",
        );
    }

    #[test]
    fn comment_under_closing_paren_is_stable() {
        let out = fmt(
            "pipeline P()\n{\n    call A(\n        x = 1,\n    )\n    # about B\n\n    call B()\n\n    return ()\n}\n",
        );
        assert_eq!(
            out,
            "pipeline P(\n)\n{\n    call A(\n        x = 1,\n    )\n\n    # about B\n\n    call B(\n    )\n\n    return (\n    )\n}\n"
        );
        assert_eq!(fmt(&out), out);

        let out = fmt("stage A(\n    src py \"a\",\n)\n# note\n\nstage B(\n    src py \"b\",\n)\n");
        assert_eq!(
            out,
            "stage A(\n    src py \"a\",\n)\n\n# note\n\nstage B(\n    src py \"b\",\n)\n"
        );
        assert_eq!(fmt(&out), out);
    }

    #[test]
    fn bare_modifiers_become_bindings() {
        let out = fmt(
            "pipeline P()\n{\n    call volatile local A(\n        x = 1,\n    ) using (\n        local    = false,\n        disabled = self.skip,\n    )\n\n    return ()\n}\n",
        );
        assert_eq!(
            out,
            "pipeline P(\n)\n{\n    call A(\n        x = 1,\n    ) using (\n        disabled = self.skip,\n        local    = false,\n        volatile = true,\n    )\n\n    return (\n    )\n}\n"
        );
        assert_eq!(fmt(&out), out);
    }

    #[test]
    fn preflight_without_using_block() {
        assert_eq!(
            fmt("call preflight CHECK()\n"),
            "call CHECK(\n) using (\n    preflight = true,\n)\n"
        );
    }

    #[test]
    fn values_and_sweeps() {
        assert_canonical(
            r#"call A as B(
    none   = null,
    flag   = true,
    ratio  = 5e-10,
    one    = [1],
    empty  = [],
    nested = {
        "a": [
            1,
            2,
        ],
        "b": {},
    },
    s      = sweep(
        "x",
        "y",
    ),
    r      = C.out,
)
"#,
        );
    }

    #[test]
    fn map_keys_sorted() {
        let out = fmt("call A(m = {\"z\": 1, \"a\": 2.50})\n");
        assert_eq!(out, "call A(\n    m = {\n        \"a\": 2.5,\n        \"z\": 1,\n    },\n)\n");
    }

    #[test]
    fn single_alternative_sweep_prints_as_array() {
        assert_eq!(fmt("call A(x = sweep(\"a\"))\n"), "call A(\n    x = [\"a\"],\n)\n");
    }

    #[test]
    fn calls_are_topologically_sorted() {
        let out = fmt(
            "pipeline P()\n{\n    call B(\n        x = A.y,\n    )\n\n    call A()\n\n    return ()\n}\n",
        );
        assert_eq!(
            out,
            "pipeline P(\n)\n{\n    call A(\n    )\n\n    call B(\n        x = A.y,\n    )\n\n    return (\n    )\n}\n"
        );
    }

    #[test]
    fn pipeline_retain_block() {
        assert_canonical(
            r#"pipeline P(
    in  int x,
    out int y,
)
{
    call A(
        x = self.x,
    )

    return (
        y = A.y,
    )

    retain (
        # keep it
        A.y,
    )
}
"#,
        );
    }

    #[test]
    fn scope_comment_spacing() {
        assert_canonical(
            "# Copyright\n\n# Description\n# continues\n\n# Docs.\nstage A(\n    src py \"a\",\n)\n# trailing\n",
        );
    }

    #[test]
    fn flattened_unit_gets_include_banners() {
        let mut ast = Ast::default();
        let root = ast.files.add("main.mro", Path::new("/t/main.mro"));
        let lib = ast.files.add("lib.mro", Path::new("/t/lib.mro"));
        if let Some(f) = ast.files.get_mut(lib) {
            f.included_from.push(IncludeSite {
                file: root,
                loc: SourceLoc::new(1, root),
            });
        }
        let parsed = frontend::load("filetype bam;\n# lib end\n", lib, "lib.mro", &mut ast.interner)
            .unwrap_or_else(|e| panic!("unexpected error: {e}"));
        frontend::merge(&mut ast, parsed, "lib.mro", false).unwrap_or_else(|e| panic!("{e}"));
        let parsed = frontend::load(
            "@include \"lib.mro\"\n\nstage A(\n    src py \"a\",\n)\n",
            root,
            "main.mro",
            &mut ast.interner,
        )
        .unwrap_or_else(|e| panic!("unexpected error: {e}"));
        frontend::merge(&mut ast, parsed, "main.mro", true).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(
            format_ast(&ast, false),
            "#\n# @include \"lib.mro\"\n#\n\nfiletype bam;\n\n# lib end\n#\n# @include \"main.mro\"\n#\n\nstage A(\n    src py \"a\",\n)\n"
        );
    }

    struct Relativize;

    impl IncludeRewriter for Relativize {
        fn rewrite(
            &self,
            ast: &mut Ast,
            _search_paths: &[PathBuf],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            for include in &mut ast.includes {
                include.value = include.value.trim_start_matches("/abs/").to_string();
            }
            Ok(())
        }
    }

    struct Broken;

    impl IncludeRewriter for Broken {
        fn rewrite(
            &self,
            _ast: &mut Ast,
            _search_paths: &[PathBuf],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("no such include".into())
        }
    }

    #[test]
    fn include_rewriter_runs_before_printing() {
        let out = format_source_with(
            "@include \"/abs/lib.mro\"\n",
            "t.mro",
            &FormatOptions::default(),
            Some(&Relativize),
        )
        .unwrap_or_else(|e| panic!("unexpected error: {e}"));
        assert_eq!(out, "@include \"lib.mro\"\n");
    }

    #[test]
    fn include_rewriter_failure_propagates() {
        let err = format_source_with("", "t.mro", &FormatOptions::default(), Some(&Broken))
            .unwrap_err();
        assert!(matches!(err, Error::Rewrite(_)));
    }
}
