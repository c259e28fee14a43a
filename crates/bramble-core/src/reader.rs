use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScriptError;
use crate::eval::Context;
use crate::value::{List, Quote};
use crate::var::Var;

static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static FLOAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:[0-9]+\.[0-9]*|[0-9]*\.[0-9]+)$").unwrap());

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Quote,
    Bang,
    Str(String),
    Atom(String),
}

#[derive(Clone, Copy, Debug)]
struct Pos {
    line: usize,
    col: usize,
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == ';' {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn next_token(&mut self) -> Result<Option<(Token, Pos)>, ScriptError> {
        self.skip_trivia();
        let pos = self.pos();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        let token = match ch {
            '(' => {
                self.bump();
                Token::Open
            }
            ')' => {
                self.bump();
                Token::Close
            }
            '\'' => {
                self.bump();
                Token::Quote
            }
            '!' => {
                self.bump();
                Token::Bang
            }
            '"' => {
                self.bump();
                Token::Str(self.read_string(pos)?)
            }
            _ => Token::Atom(self.read_atom()),
        };
        Ok(Some((token, pos)))
    }

    fn read_string(&mut self, start: Pos) -> Result<String, ScriptError> {
        let mut out = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(ScriptError::parse(
                    "unterminated string literal",
                    start.line,
                    start.col,
                ));
            };
            match ch {
                '"' => return Ok(out),
                '\\' => {
                    let Some(escape) = self.bump() else {
                        return Err(ScriptError::parse(
                            "unterminated string escape",
                            start.line,
                            start.col,
                        ));
                    };
                    match escape {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn read_atom(&mut self) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '\'' | '"' | ';') {
                break;
            }
            out.push(ch);
            self.bump();
        }
        out
    }
}

/// Recursive-descent reader over a token stream. Produces Var trees one
/// top-level expression at a time; `!` sub-expressions are evaluated
/// through the supplied Context while reading.
pub struct Reader {
    lexer: Lexer,
}

impl Reader {
    pub fn new(source: &str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    /// Next top-level expression, or None at end of input.
    pub fn read_next(&mut self, ctx: &mut Context) -> Result<Option<Var>, ScriptError> {
        match self.lexer.next_token()? {
            None => Ok(None),
            Some((token, pos)) => self.read_form(ctx, token, pos).map(Some),
        }
    }

    fn read_form(
        &mut self,
        ctx: &mut Context,
        token: Token,
        pos: Pos,
    ) -> Result<Var, ScriptError> {
        match token {
            Token::Open => {
                let mut items = Vec::new();
                loop {
                    match self.lexer.next_token()? {
                        None => {
                            return Err(ScriptError::parse(
                                "unclosed list",
                                pos.line,
                                pos.col,
                            ));
                        }
                        Some((Token::Close, _)) => break,
                        Some((token, pos)) => items.push(self.read_form(ctx, token, pos)?),
                    }
                }
                Ok(ctx.var(List(items)))
            }
            Token::Close => Err(ScriptError::parse("unexpected ')'", pos.line, pos.col)),
            Token::Quote => {
                let inner = self.read_required(ctx, "expected expression after '")?;
                Ok(ctx.var(Quote(inner)))
            }
            Token::Bang => {
                // Meta-evaluation escape: the expression runs now, at read
                // time, and its result becomes the literal.
                let inner = self.read_required(ctx, "expected expression after !")?;
                ctx.execute(&inner)
            }
            Token::Str(s) => Ok(ctx.var(s)),
            Token::Atom(atom) => Ok(classify_atom(ctx, &atom)),
        }
    }

    fn read_required(&mut self, ctx: &mut Context, message: &str) -> Result<Var, ScriptError> {
        let pos = self.lexer.pos();
        match self.lexer.next_token()? {
            None => Err(ScriptError::parse(message, pos.line, pos.col)),
            Some((token, pos)) => self.read_form(ctx, token, pos),
        }
    }
}

/// Bare-token classification, in order: boolean, integer, float, symbol.
fn classify_atom(ctx: &mut Context, atom: &str) -> Var {
    if atom == "true" {
        return ctx.var(true);
    }
    if atom == "false" {
        return ctx.var(false);
    }
    if INT_RE.is_match(atom) {
        if let Ok(n) = atom.parse::<i64>() {
            return ctx.var(n);
        }
    }
    if FLOAT_RE.is_match(atom) {
        if let Ok(f) = atom.parse::<f64>() {
            return ctx.var(f);
        }
    }
    let sym = ctx.intern(atom);
    ctx.var(sym)
}
