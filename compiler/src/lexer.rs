// Lexer for MRO source files.
//
// Tokenizes source with the `logos` crate. Comments are not grammar tokens:
// they are routed to a sideband list with their line numbers and attached to
// AST nodes after parsing (see `comments.rs`).
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans plus every comment line.
// Failure modes: the first unrecognized character or unterminated string
//   literal aborts lexing with a `LexError`.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::source::LineIndex;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub line: u32,
    pub message: String,
}

/// One `#` comment line, trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub line: u32,
    pub text: String,
}

/// Result of lexing: grammar tokens plus sideband comments.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub comments: Vec<Comment>,
}

/// MRO token types.
///
/// Keywords and symbols are matched as fixed strings. Identifiers carry no
/// value; use the span to retrieve the text from the source. String literals
/// carry their raw inner text: escape sequences are kept as written.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // ── Directives ──
    #[token("@include")]
    Include,

    // ── Keywords ──
    #[token("filetype")]
    Filetype,
    #[token("stage")]
    Stage,
    #[token("pipeline")]
    Pipeline,
    #[token("call")]
    Call,
    #[token("as")]
    As,
    #[token("in")]
    In,
    #[token("out")]
    Out,
    #[token("src")]
    Src,
    #[token("split")]
    Split,
    #[token("using")]
    Using,
    #[token("retain")]
    Retain,
    #[token("return")]
    Return,
    #[token("self")]
    SelfKw,
    #[token("sweep")]
    Sweep,
    #[token("local")]
    Local,
    #[token("preflight")]
    Preflight,
    #[token("volatile")]
    Volatile,
    #[token("strict")]
    Strict,
    #[token("mem_gb")]
    MemGb,
    #[token("threads")]
    Threads,
    #[token("special")]
    Special,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("=")]
    Equals,
    #[token(".")]
    Dot,

    // ── Literals ──
    //
    // A float needs a fraction or an exponent; everything else numeric is Int.
    /// Float literal (`1.5`, `-2.0e3`, `5e-10`).
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    /// Integer literal.
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    /// String literal. Holds the raw text between the quotes.
    #[regex(r#""([^"\\\n]|\\.)*""#, raw_string)]
    Str(String),

    // ── Identifier ──
    //
    // Placed after keywords: logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `stage` matches Stage, not Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Sideband ──
    /// `#` to end of line. Never reaches the parser.
    #[regex(r"#[^\n]*")]
    Comment,
}

impl Token {
    /// True for tokens that may stand where an identifier is expected.
    ///
    /// Keywords are reserved only in the positions that need them: a stage
    /// may take an input called `local`, a binding may target `threads`.
    pub fn is_identifier_like(&self) -> bool {
        matches!(
            self,
            Token::Ident
                | Token::Filetype
                | Token::Stage
                | Token::Pipeline
                | Token::Call
                | Token::As
                | Token::In
                | Token::Out
                | Token::Src
                | Token::Split
                | Token::Using
                | Token::Retain
                | Token::Return
                | Token::Sweep
                | Token::Local
                | Token::Preflight
                | Token::Volatile
                | Token::Strict
                | Token::MemGb
                | Token::Threads
                | Token::Special
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Include => write!(f, "@include"),
            Token::Filetype => write!(f, "filetype"),
            Token::Stage => write!(f, "stage"),
            Token::Pipeline => write!(f, "pipeline"),
            Token::Call => write!(f, "call"),
            Token::As => write!(f, "as"),
            Token::In => write!(f, "in"),
            Token::Out => write!(f, "out"),
            Token::Src => write!(f, "src"),
            Token::Split => write!(f, "split"),
            Token::Using => write!(f, "using"),
            Token::Retain => write!(f, "retain"),
            Token::Return => write!(f, "return"),
            Token::SelfKw => write!(f, "self"),
            Token::Sweep => write!(f, "sweep"),
            Token::Local => write!(f, "local"),
            Token::Preflight => write!(f, "preflight"),
            Token::Volatile => write!(f, "volatile"),
            Token::Strict => write!(f, "strict"),
            Token::MemGb => write!(f, "mem_gb"),
            Token::Threads => write!(f, "threads"),
            Token::Special => write!(f, "special"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Equals => write!(f, "="),
            Token::Dot => write!(f, "."),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "<ident>"),
            Token::Comment => write!(f, "<comment>"),
        }
    }
}

// ── Callbacks ──

/// Overflowing literals (`1e999`) are rejected rather than read as inf.
fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok().filter(|f: &f64| f.is_finite())
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn raw_string(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string() // strip quotes
}

// ── Public API ──

/// Lex an MRO source string into tokens and comments.
///
/// Stops at the first bad character. Blank lines and comment lines never
/// shift the line numbers of the tokens around them.
pub fn lex(source: &str) -> Result<LexResult, LexError> {
    let lines = LineIndex::new(source);
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut comments = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(Token::Comment) => comments.push(Comment {
                line: lines.line_of(span.start),
                text: source[span.start..span.end].trim().to_string(),
            }),
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let bad = &source[span.start..span.end];
                let message = if bad.starts_with('"') {
                    "unterminated string literal".to_string()
                } else if bad.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
                    format!("invalid numeric literal: {bad:?}")
                } else {
                    format!("unexpected character: {bad:?}")
                };
                return Err(LexError {
                    span,
                    line: lines.line_of(span.start),
                    message,
                });
            }
        }
    }

    log::trace!(
        "lexed {} tokens and {} comment lines",
        tokens.len(),
        comments.len()
    );
    Ok(LexResult { tokens, comments })
}

// ── Tests ──
