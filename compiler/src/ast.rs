// AST node types for MRO source files.
//
// One `Ast` is one compilation unit, possibly spanning several files pulled
// together by `@include`. Every syntactic construct embeds an `AstNode`
// carrying its location and the comments attached to it after parsing.
//
// Preconditions: produced by the parser from a fully valid token stream.
// Postconditions: callable ids are unique across the unit; every node's
//   scope comments precede it in the same file.
// Failure modes: none (data-only module).
// Side effects: none.

use indexmap::IndexMap;

use crate::intern::{Interner, Sym};
use crate::source::{SourceFiles, SourceLoc};

// ── Common node header ──

/// Header shared by every syntactic construct.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AstNode {
    pub loc: SourceLoc,
    /// Comment lines directly above the node, printed right before it.
    pub comments: Vec<String>,
    /// Earlier comment blocks forming the node's documentation header.
    pub scope_comments: Vec<CommentBlock>,
}

impl AstNode {
    pub fn new(loc: SourceLoc) -> Self {
        AstNode {
            loc,
            comments: Vec::new(),
            scope_comments: Vec::new(),
        }
    }
}

/// One comment line with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBlock {
    pub loc: SourceLoc,
    pub value: String,
}

// ── Root ──

/// A compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub includes: Vec<Include>,
    pub user_types: Vec<UserType>,
    /// Stages and pipelines in declaration order, keyed by id.
    pub callables: IndexMap<Sym, Callable>,
    /// Optional top-level invocation.
    pub call: Option<CallStm>,
    pub files: SourceFiles,
    /// Comments not attached to any node, in file order.
    pub comments: Vec<CommentBlock>,
    pub interner: Interner,
}

impl Ast {
    /// Text of an interned identifier.
    pub fn name(&self, sym: Sym) -> &str {
        self.interner.resolve(sym)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.callables.values().filter_map(|c| match c {
            Callable::Stage(s) => Some(s),
            Callable::Pipeline(_) => None,
        })
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.callables.values().filter_map(|c| match c {
            Callable::Pipeline(p) => Some(p),
            Callable::Stage(_) => None,
        })
    }

    /// Look up a callable by name.
    pub fn callable(&self, id: &str) -> Option<&Callable> {
        self.interner
            .get(id)
            .and_then(|sym| self.callables.get(&sym))
    }
}

// ── Declarations ──

/// `@include "path"`
#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub node: AstNode,
    pub value: String,
}

/// A top-level declaration, in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Dec {
    UserType(UserType),
    Stage(Stage),
    Pipeline(Pipeline),
}

/// `filetype json;`
#[derive(Debug, Clone, PartialEq)]
pub struct UserType {
    pub node: AstNode,
    pub id: Sym,
}

/// A stage or pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    Stage(Stage),
    Pipeline(Pipeline),
}

impl Callable {
    pub fn id(&self) -> Sym {
        match self {
            Callable::Stage(s) => s.id,
            Callable::Pipeline(p) => p.id,
        }
    }

    pub fn node(&self) -> &AstNode {
        match self {
            Callable::Stage(s) => &s.node,
            Callable::Pipeline(p) => &p.node,
        }
    }

    pub fn in_params(&self) -> &[InParam] {
        match self {
            Callable::Stage(s) => &s.in_params,
            Callable::Pipeline(p) => &p.in_params,
        }
    }

    pub fn out_params(&self) -> &[OutParam] {
        match self {
            Callable::Stage(s) => &s.out_params,
            Callable::Pipeline(p) => &p.out_params,
        }
    }
}

// ── Parameters ──

#[derive(Debug, Clone, PartialEq)]
pub struct InParam {
    pub node: AstNode,
    /// Type name; dotted user types are kept whole (`bam.bai`).
    pub tname: Sym,
    /// List nesting depth: `int[][]` has 2.
    pub array_dim: usize,
    /// `default` when the parameter is unnamed.
    pub id: Sym,
    pub help: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutParam {
    pub node: AstNode,
    pub tname: Sym,
    pub array_dim: usize,
    pub id: Sym,
    pub help: Option<String>,
    /// Output file basename override.
    pub out_name: Option<String>,
}

/// Borrowed view over either kind of parameter.
#[derive(Debug, Clone, Copy)]
pub enum Param<'a> {
    In(&'a InParam),
    Out(&'a OutParam),
}

impl<'a> Param<'a> {
    pub fn mode(&self) -> &'static str {
        match self {
            Param::In(_) => "in",
            Param::Out(_) => "out",
        }
    }

    pub fn node(&self) -> &'a AstNode {
        match self {
            Param::In(p) => &p.node,
            Param::Out(p) => &p.node,
        }
    }

    pub fn tname(&self) -> Sym {
        match self {
            Param::In(p) => p.tname,
            Param::Out(p) => p.tname,
        }
    }

    pub fn array_dim(&self) -> usize {
        match self {
            Param::In(p) => p.array_dim,
            Param::Out(p) => p.array_dim,
        }
    }

    pub fn id(&self) -> Sym {
        match self {
            Param::In(p) => p.id,
            Param::Out(p) => p.id,
        }
    }

    pub fn help(&self) -> Option<&'a str> {
        match self {
            Param::In(p) => p.help.as_deref(),
            Param::Out(p) => p.help.as_deref(),
        }
    }

    pub fn out_name(&self) -> Option<&'a str> {
        match self {
            Param::In(_) => None,
            Param::Out(p) => p.out_name.as_deref(),
        }
    }
}

/// Iterate in-params then out-params as `Param` views.
pub fn params<'a>(ins: &'a [InParam], outs: &'a [OutParam]) -> impl Iterator<Item = Param<'a>> {
    ins.iter()
        .map(Param::In)
        .chain(outs.iter().map(Param::Out))
}

// ── Stage ──

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub node: AstNode,
    pub id: Sym,
    pub in_params: Vec<InParam>,
    pub out_params: Vec<OutParam>,
    pub src: SrcParam,
    pub split: Option<SplitParams>,
    pub resources: Option<Resources>,
    pub retain: Option<RetainParams>,
}

/// `src py "path arg1 arg2",`
#[derive(Debug, Clone, PartialEq)]
pub struct SrcParam {
    pub node: AstNode,
    pub lang: Sym,
    pub path: String,
    pub args: Vec<String>,
}

/// Per-chunk parameters of a split stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitParams {
    pub node: AstNode,
    pub in_params: Vec<InParam>,
    pub out_params: Vec<OutParam>,
}

/// An explicitly set resource field. Zero is a valid explicit value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceField<T> {
    pub node: AstNode,
    pub value: T,
}

/// `using (mem_gb = 4, threads = 2, special = "x", volatile = strict,)`
#[derive(Debug, Clone, PartialEq)]
pub struct Resources {
    pub node: AstNode,
    pub mem_gb: Option<ResourceField<i64>>,
    pub threads: Option<ResourceField<i64>>,
    pub special: Option<ResourceField<String>>,
    /// Present when `volatile = strict` was written.
    pub volatile: Option<AstNode>,
}

/// Stage-level `retain (id, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetainParams {
    pub node: AstNode,
    pub params: Vec<RetainParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetainParam {
    pub node: AstNode,
    pub id: Sym,
}

// ── Pipeline ──

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub node: AstNode,
    pub id: Sym,
    pub in_params: Vec<InParam>,
    pub out_params: Vec<OutParam>,
    pub calls: Vec<CallStm>,
    /// Call id → callable id, filled in by the reference check.
    pub scope: IndexMap<Sym, Sym>,
    pub ret: ReturnStm,
    pub retain: Option<PipelineRetains>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStm {
    pub node: AstNode,
    pub bindings: BindStms,
}

/// Pipeline-level `retain (REF, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRetains {
    pub node: AstNode,
    pub refs: Vec<RefExp>,
}

// ── Calls and bindings ──

/// `call [modifiers] DEC [as ID](bindings) [using (modifier bindings)]`
#[derive(Debug, Clone, PartialEq)]
pub struct CallStm {
    pub node: AstNode,
    /// Name of this call inside its pipeline.
    pub id: Sym,
    /// Callable being invoked; equal to `id` unless aliased with `as`.
    pub dec_id: Sym,
    pub modifiers: Modifiers,
    pub bindings: BindStms,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modifiers {
    pub local: bool,
    pub preflight: bool,
    pub volatile: bool,
    /// The `using (...)` block: bound-form flags and `disabled = REF`.
    pub bindings: Option<BindStms>,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !self.local
            && !self.preflight
            && !self.volatile
            && self.bindings.as_ref().map_or(true, |b| b.list.is_empty())
    }
}

/// Ordered binding list. Ids are unique within one list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindStms {
    pub node: AstNode,
    pub list: Vec<BindStm>,
}

impl BindStms {
    pub fn get(&self, id: Sym) -> Option<&BindStm> {
        self.list.iter().find(|b| b.id == id)
    }
}

/// `id = exp` or `id = sweep(exp, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindStm {
    pub node: AstNode,
    pub id: Sym,
    /// For a sweep, an array of the alternatives.
    pub exp: Exp,
    pub sweep: bool,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Val(ValExp),
    Ref(RefExp),
}

impl Exp {
    pub fn node(&self) -> &AstNode {
        match self {
            Exp::Val(v) => &v.node,
            Exp::Ref(r) => &r.node,
        }
    }

    /// Visit every reference inside this expression, depth first.
    pub fn for_each_ref<'a>(&'a self, f: &mut impl FnMut(&'a RefExp)) {
        match self {
            Exp::Ref(r) => f(r),
            Exp::Val(v) => match &v.value {
                Value::Array(items) => items.iter().for_each(|e| e.for_each_ref(f)),
                Value::Map(entries) => entries.values().for_each(|e| e.for_each_ref(f)),
                _ => {}
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValExp {
    pub node: AstNode,
    pub value: Value,
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Raw text between the quotes, escapes undecoded.
    String(String),
    Array(Vec<Exp>),
    /// Keys unique; printed sorted.
    Map(IndexMap<String, Exp>),
}

impl Value {
    /// Kind tag used in diagnostics and the JSON export.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefExp {
    pub node: AstNode,
    pub target: RefTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    /// `CALL[.OUTPUT]`; a missing output is `default`.
    Call { id: Sym, output_id: Sym },
    /// `self.INPUT`
    SelfInput { id: Sym },
}

// ── Per-file parse result ──

/// Everything one file declares, before merging into a unit.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub includes: Vec<Include>,
    pub decs: Vec<Dec>,
    pub call: Option<CallStm>,
    /// Comments not claimed by any node of this file.
    pub comments: Vec<CommentBlock>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    fn val(value: Value) -> Exp {
        Exp::Val(ValExp {
            node: AstNode::default(),
            value,
        })
    }

    fn call_ref(interner: &mut Interner, id: &str, out: &str) -> Exp {
        Exp::Ref(RefExp {
            node: AstNode::default(),
            target: RefTarget::Call {
                id: interner.intern(id),
                output_id: interner.intern(out),
            },
        })
    }

    #[test]
    fn for_each_ref_descends_into_containers() {
        let mut interner = Interner::new();
        let mut map = IndexMap::new();
        map.insert("a".to_string(), call_ref(&mut interner, "B", "x"));
        map.insert("b".to_string(), val(Value::Int(1)));
        let exp = val(Value::Array(vec![
            call_ref(&mut interner, "A", "default"),
            val(Value::Map(map)),
        ]));
        let mut seen = Vec::new();
        exp.for_each_ref(&mut |r| {
            if let RefTarget::Call { id, .. } = r.target {
                seen.push(interner.resolve(id).to_string());
            }
        });
        assert_eq!(seen, vec!["A", "B"]);
    }

    #[test]
    fn modifiers_empty() {
        let mut m = Modifiers::default();
        assert!(m.is_empty());
        m.bindings = Some(BindStms::default());
        assert!(m.is_empty());
        m.preflight = true;
        assert!(!m.is_empty());
    }

    #[test]
    fn param_view_accessors() {
        let mut interner = Interner::new();
        let out = OutParam {
            node: AstNode::new(SourceLoc::new(3, FileId(0))),
            tname: interner.intern("json"),
            array_dim: 1,
            id: interner.intern("result"),
            help: Some("merged".into()),
            out_name: Some("result.json".into()),
        };
        let p = Param::Out(&out);
        assert_eq!(p.mode(), "out");
        assert_eq!(p.array_dim(), 1);
        assert_eq!(p.help(), Some("merged"));
        assert_eq!(p.out_name(), Some("result.json"));
        assert_eq!(p.node().loc.line, 3);
    }
}
