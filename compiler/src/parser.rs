// Parser for MRO source files.
//
// Parses the token stream of one file (from the lexer) into its includes,
// declarations and optional top-level call. Uses chumsky combinators.
//
// Preconditions: `interner` is the interner of the unit the file belongs to.
// Postconditions: returns the file's declarations with every comment still
//   unattached in `ParsedFile::comments` (see `comments::attach`).
// Failure modes: the first lex or grammar error aborts; no partial result.
// Side effects: interns identifiers into `interner`.

use std::cell::RefCell;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;
use indexmap::IndexMap;

use crate::ast::*;
use crate::diag::{Error, Result};
use crate::intern::{Interner, Sym, DEFAULT_ID};
use crate::lexer::Token;
use crate::source::{FileId, LineIndex, SourceLoc};

type Extra<'tokens> = extra::Err<Rich<'tokens, Token, SimpleSpan>>;

/// Parse one MRO source file. Lexes then parses.
pub fn parse(
    source: &str,
    file: FileId,
    file_name: &str,
    interner: &mut Interner,
) -> Result<ParsedFile> {
    let lexed = crate::lexer::lex(source).map_err(|e| Error::Lex {
        file: file_name.to_string(),
        line: e.line,
        message: e.message,
    })?;
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lexed.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let ctx = ParseCtx {
        source,
        lines: LineIndex::new(source),
        file,
        interner: RefCell::new(std::mem::take(interner)),
        duplicate: RefCell::new(None),
    };

    let result = {
        let parser = file_parser(&ctx);
        let (parsed, errors) = parser.parse(stream).into_output_errors();
        match (parsed, errors.first()) {
            (_, Some(err)) => Err(convert_error(&ctx, file_name, err)),
            (Some(parsed), None) => Ok(parsed),
            (None, None) => Err(Error::Parse {
                file: file_name.to_string(),
                line: ctx.lines.line_of(len),
                expected: "a declaration".to_string(),
                found: "end of input".to_string(),
            }),
        }
    };
    *interner = ctx.interner.into_inner();

    let mut parsed = result?;
    if let Some((line, expected, found)) = ctx.duplicate.into_inner() {
        return Err(Error::Parse {
            file: file_name.to_string(),
            line,
            expected: expected.to_string(),
            found,
        });
    }
    parsed.comments = lexed
        .comments
        .into_iter()
        .map(|c| CommentBlock {
            loc: SourceLoc::new(c.line, file),
            value: c.text,
        })
        .collect();
    log::debug!(
        "{file_name}: parsed {} includes, {} declarations",
        parsed.includes.len(),
        parsed.decs.len()
    );
    Ok(parsed)
}

// ── Parse context ──
//
// Shared by every combinator closure. Mutable state sits in `RefCell`s
// because chumsky closures are `Fn`.

struct ParseCtx<'src> {
    source: &'src str,
    lines: LineIndex,
    file: FileId,
    interner: RefCell<Interner>,
    /// First duplicate map key or resource field: (line, expected, found).
    /// Reported once the file has parsed, so it never competes with
    /// grammar errors from abandoned alternatives.
    duplicate: RefCell<Option<(u32, &'static str, String)>>,
}

impl<'src> ParseCtx<'src> {
    fn text(&self, span: SimpleSpan) -> &'src str {
        &self.source[span.start()..span.end()]
    }

    fn node(&self, span: SimpleSpan) -> AstNode {
        AstNode::new(SourceLoc::new(self.lines.line_of(span.start()), self.file))
    }

    fn intern(&self, s: &str) -> Sym {
        self.interner.borrow_mut().intern(s)
    }

    fn duplicate(&self, span: SimpleSpan, expected: &'static str, found: String) {
        let mut slot = self.duplicate.borrow_mut();
        if slot.is_none() {
            *slot = Some((self.lines.line_of(span.start()), expected, found));
        }
    }
}

fn convert_error(ctx: &ParseCtx<'_>, file_name: &str, err: &Rich<'_, Token, SimpleSpan>) -> Error {
    let span = *err.span();
    let line = ctx.lines.line_of(span.start());
    let mut expected: Vec<String> = err.expected().map(|p| p.to_string()).collect();
    expected.sort();
    expected.dedup();
    let expected = if expected.is_empty() {
        "nothing".to_string()
    } else {
        expected.join(", ")
    };
    let found = if err.found().is_none() || span.start() >= ctx.source.len() {
        "end of input".to_string()
    } else {
        format!("'{}'", ctx.text(span))
    };
    Error::Parse {
        file: file_name.to_string(),
        line,
        expected,
        found,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

// ── Grammar ──
//
// All grammar rules are built inside `file_parser` so that the context
// reference is captured once and shared by all combinators.

enum ResourceItem {
    MemGb(ResourceField<i64>),
    Threads(ResourceField<i64>),
    Special(ResourceField<String>),
    Volatile(AstNode),
}

fn file_parser<'tokens, 'src: 'tokens, I>(
    ctx: &'src ParseCtx<'src>,
) -> impl Parser<'tokens, I, ParsedFile, Extra<'tokens>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifiers ──
    //
    // Keywords are accepted wherever an identifier is expected.

    let ident_text = any()
        .filter(Token::is_identifier_like)
        .map_with(move |_, e| ctx.text(e.span()))
        .labelled("identifier");
    let ident = ident_text.clone().map(move |s| ctx.intern(s));
    let ident_node = ident_text
        .clone()
        .map_with(move |s, e| (ctx.intern(s), ctx.node(e.span())));

    let string = select! { Token::Str(s) => s }.labelled("string");
    let int = select! { Token::Int(n) => n }.labelled("integer");

    // ── Types: ID('.'ID)* ('[' ']')* ──

    let ty = ident_text
        .clone()
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(move |parts| ctx.intern(&parts.join(".")))
        .then(
            just(Token::LBracket)
                .then(just(Token::RBracket))
                .repeated()
                .count(),
        )
        .boxed();

    // ── Parameters ──

    let in_param = just(Token::In)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(ty.clone())
        .then(ident.clone().or_not())
        .then(string.clone().or_not())
        .then_ignore(just(Token::Comma))
        .map(move |(((node, (tname, array_dim)), id), help)| InParam {
            node,
            tname,
            array_dim,
            id: id.unwrap_or_else(|| ctx.intern(DEFAULT_ID)),
            help: non_empty(help),
        })
        .boxed();

    let out_param = just(Token::Out)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(ty.clone())
        .then(ident.clone().or_not())
        .then(string.clone().or_not())
        .then(string.clone().or_not())
        .then_ignore(just(Token::Comma))
        .map(
            move |((((node, (tname, array_dim)), id), help), out_name)| OutParam {
                node,
                tname,
                array_dim,
                id: id.unwrap_or_else(|| ctx.intern(DEFAULT_ID)),
                help: non_empty(help),
                out_name: non_empty(out_name),
            },
        )
        .boxed();

    let params = in_param
        .clone()
        .repeated()
        .collect::<Vec<_>>()
        .then(out_param.clone().repeated().collect::<Vec<_>>())
        .boxed();

    // ── src ID "path args", ──

    let src_param = just(Token::Src)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(ident.clone())
        .then(string.clone())
        .then_ignore(just(Token::Comma))
        .map(|((node, lang), cmd)| {
            let mut words = cmd.split_whitespace().map(str::to_string);
            let path = words.next().unwrap_or_default();
            SrcParam {
                node,
                lang,
                path,
                args: words.collect(),
            }
        });

    // ── Stage clauses ──

    // Legacy spelling `split using (` is accepted.
    let split = just(Token::Split)
        .map_with(move |_, e| ctx.node(e.span()))
        .then_ignore(just(Token::Using).or_not())
        .then(
            params
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(node, (in_params, out_params))| SplitParams {
            node,
            in_params,
            out_params,
        });

    let resource_item = {
        let mem_gb = just(Token::MemGb)
            .map_with(move |_, e| ctx.node(e.span()))
            .then_ignore(just(Token::Equals))
            .then(int.clone())
            .map(|(node, value)| ResourceItem::MemGb(ResourceField { node, value }));
        let threads = just(Token::Threads)
            .map_with(move |_, e| ctx.node(e.span()))
            .then_ignore(just(Token::Equals))
            .then(int.clone())
            .map(|(node, value)| ResourceItem::Threads(ResourceField { node, value }));
        let special = just(Token::Special)
            .map_with(move |_, e| ctx.node(e.span()))
            .then_ignore(just(Token::Equals))
            .then(string.clone())
            .map(|(node, value)| ResourceItem::Special(ResourceField { node, value }));
        let volatile = just(Token::Volatile)
            .map_with(move |_, e| ctx.node(e.span()))
            .then_ignore(just(Token::Equals))
            .then_ignore(just(Token::Strict))
            .map(ResourceItem::Volatile);
        choice((mem_gb, threads, special, volatile)).then_ignore(just(Token::Comma))
    };

    let resources = just(Token::Using)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            resource_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map_with(move |(node, items), e| {
            let mut res = Resources {
                node,
                mem_gb: None,
                threads: None,
                special: None,
                volatile: None,
            };
            for item in items {
                let (name, taken) = match item {
                    ResourceItem::MemGb(f) => ("mem_gb", res.mem_gb.replace(f).is_some()),
                    ResourceItem::Threads(f) => ("threads", res.threads.replace(f).is_some()),
                    ResourceItem::Special(f) => ("special", res.special.replace(f).is_some()),
                    ResourceItem::Volatile(n) => ("volatile", res.volatile.replace(n).is_some()),
                };
                if taken {
                    ctx.duplicate(
                        e.span(),
                        "a unique resource field",
                        format!("duplicate '{name}'"),
                    );
                }
            }
            res
        });

    let stage_retain = just(Token::Retain)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            ident_node
                .clone()
                .map(|(id, node)| RetainParam { node, id })
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(node, params)| RetainParams { node, params });

    let stage = just(Token::Stage)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(ident.clone())
        .then(
            params
                .clone()
                .then(src_param)
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(split.or_not())
        .then(resources.or_not())
        .then(stage_retain.or_not())
        .map(
            |(((((node, id), ((in_params, out_params), src)), split), resources), retain)| {
                Dec::Stage(Stage {
                    node,
                    id,
                    in_params,
                    out_params,
                    src,
                    split,
                    resources,
                    retain,
                })
            },
        )
        .boxed();

    // ── Expressions ──

    let ref_exp = {
        let self_ref = just(Token::SelfKw)
            .ignore_then(just(Token::Dot))
            .ignore_then(ident.clone())
            .map_with(move |id, e| RefExp {
                node: ctx.node(e.span()),
                target: RefTarget::SelfInput { id },
            });
        let call_ref = ident
            .clone()
            .then(just(Token::Dot).ignore_then(ident.clone()).or_not())
            .map_with(move |(id, output_id), e| RefExp {
                node: ctx.node(e.span()),
                target: RefTarget::Call {
                    id,
                    output_id: output_id.unwrap_or_else(|| ctx.intern(DEFAULT_ID)),
                },
            });
        self_ref.or(call_ref).labelled("reference").boxed()
    };

    let exp = recursive(|exp| {
        let literal = select! {
            Token::Int(n) => Value::Int(n),
            Token::Float(f) => Value::Float(f),
            Token::Str(s) => Value::String(s),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
        };

        let array = exp
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Value::Array);

        let map = string
            .clone()
            .then_ignore(just(Token::Colon))
            .then(exp.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(move |entries, e| {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    if map.contains_key(&key) {
                        ctx.duplicate(
                            e.span(),
                            "a unique map key",
                            format!("duplicate key \"{key}\""),
                        );
                    }
                    map.insert(key, value);
                }
                Value::Map(map)
            });

        let val = choice((literal, array, map)).map_with(move |value, e| {
            Exp::Val(ValExp {
                node: ctx.node(e.span()),
                value,
            })
        });

        val.or(ref_exp.clone().map(Exp::Ref)).labelled("expression")
    })
    .boxed();

    // ── Bindings: ID '=' (exp | sweep(exp, ...)) ──

    let sweep = just(Token::Sweep)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            exp
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(node, values)| {
            Exp::Val(ValExp {
                node,
                value: Value::Array(values),
            })
        });

    let binding = ident_node
        .clone()
        .then_ignore(just(Token::Equals))
        .then(sweep.map(|e| (e, true)).or(exp.clone().map(|e| (e, false))))
        .map(|((id, node), (exp, sweep))| BindStm {
            node,
            id,
            exp,
            sweep,
        });

    let bindings = just(Token::LParen)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            binding
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(just(Token::RParen))
        .map(|(node, list)| BindStms { node, list })
        .boxed();

    // ── Call: 'call' modifier* ID ['as' ID] bindings ['using' bindings] ──
    //
    // A bare modifier keyword only counts as one when another name follows,
    // so `call local(...)` still calls a callable named `local`.

    let modifier = choice((
        just(Token::Local),
        just(Token::Preflight),
        just(Token::Volatile),
    ))
    .then_ignore(
        any()
            .filter(|t: &Token| t.is_identifier_like() && *t != Token::As)
            .rewind(),
    );

    let call_stm = just(Token::Call)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(modifier.repeated().collect::<Vec<_>>())
        .then(ident.clone())
        .then(just(Token::As).ignore_then(ident.clone()).or_not())
        .then(bindings.clone())
        .then(just(Token::Using).ignore_then(bindings.clone()).or_not())
        .map(|(((((node, mods), dec_id), alias), bindings), mod_bindings)| {
            let mut modifiers = Modifiers {
                bindings: mod_bindings,
                ..Modifiers::default()
            };
            for m in mods {
                match m {
                    Token::Local => modifiers.local = true,
                    Token::Preflight => modifiers.preflight = true,
                    _ => modifiers.volatile = true,
                }
            }
            CallStm {
                node,
                id: alias.unwrap_or(dec_id),
                dec_id,
                modifiers,
                bindings,
            }
        })
        .boxed();

    // ── Pipeline ──

    let return_stm = just(Token::Return)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(bindings.clone())
        .map(|(node, bindings)| ReturnStm { node, bindings });

    let pipeline_retain = just(Token::Retain)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            ref_exp
                .clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(node, refs)| PipelineRetains { node, refs });

    let pipeline = just(Token::Pipeline)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(ident.clone())
        .then(
            params
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then(
            call_stm
                .clone()
                .repeated()
                .at_least(1)
                .collect::<Vec<_>>()
                .then(return_stm)
                .then(pipeline_retain.or_not())
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(
            |(((node, id), (in_params, out_params)), ((calls, ret), retain))| {
                Dec::Pipeline(Pipeline {
                    node,
                    id,
                    in_params,
                    out_params,
                    calls,
                    scope: IndexMap::new(),
                    ret,
                    retain,
                })
            },
        )
        .boxed();

    // ── File: include* dec* call? ──

    let filetype = just(Token::Filetype)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(
            ident_text
                .clone()
                .separated_by(just(Token::Dot))
                .at_least(1)
                .collect::<Vec<_>>()
                .map(move |parts| ctx.intern(&parts.join("."))),
        )
        .then_ignore(just(Token::Semicolon))
        .map(|(node, id)| Dec::UserType(UserType { node, id }));

    let include = just(Token::Include)
        .map_with(move |_, e| ctx.node(e.span()))
        .then(string.clone())
        .map(|(node, value)| Include { node, value });

    let dec = choice((filetype, stage, pipeline));

    include
        .repeated()
        .collect::<Vec<_>>()
        .then(dec.repeated().collect::<Vec<_>>())
        .then(call_stm.or_not())
        .then_ignore(end())
        .map(|((includes, decs), call)| ParsedFile {
            includes,
            decs,
            call,
            comments: Vec::new(),
        })
}

// ── Tests ──
