//! Script parser: expressions by precedence climbing, directives into an
//! explicit statement tree.
//!
//! A macro buffer's line list parses into a `Program` whose control flow is
//! structural: `If` arms, `Loop` nodes with their bodies, `Break`/`Next`/
//! `Return` leaves. Matching of openers and closers is verified here, once;
//! executions after the first reuse the cached tree.

use crate::lexer::{Kw, Op, StrPart, Tok, lex};
use core_status::{EdError, EdResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Seg {
    Lit(String),
    Interp(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ReMatch,
    ReNotMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// An assignable place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Var(String),
    ArgRef(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Vec<Seg>),
    Var(String),
    ArgRef(u32),
    Array(Vec<Expr>),
    /// Command, function, or macro call; `name args...` or `name(...)`.
    Call { name: String, args: Vec<Expr> },
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Short-circuit `&&` / `and`.
    And(Box<Expr>, Box<Expr>),
    /// Short-circuit `||` / `or`.
    Or(Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `target op= value`; `op` of `None` is plain assignment.
    Assign {
        target: Target,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    /// `++x`, `x--`, ...
    IncDec {
        target: Target,
        incr: bool,
        prefix: bool,
    },
    /// `force expr`: user-visible failure converts to nil.
    Force(Box<Expr>),
    /// Comma sequence; value of the last element.
    Seq(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// `!while cond`
    While,
    /// `!until cond`
    Until,
    /// `!loop` (unconditional)
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `!force stmt`
    Force(Box<Stmt>),
    If {
        arms: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    Loop {
        kind: LoopKind,
        cond: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// `!break [n]`
    Break(u32),
    /// `!next`
    Next,
    /// `!return [expr]`
    Return(Option<Expr>),
    /// `!macro name[,min[,max]]` ... `!endmacro`: raw body lines, stored
    /// into a macro buffer when executed.
    MacroDef {
        name: String,
        min_args: u16,
        max_args: Option<u16>,
        lines: Vec<String>,
    },
}

pub type Program = Vec<Stmt>;

// --- line-level parsing ------------------------------------------------------

struct Lines<'a> {
    lines: &'a [String],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let l = self.lines.get(self.pos)?;
        self.pos += 1;
        Some(l)
    }
}

/// Directive name at the start of a line, if any.
fn directive(line: &str) -> Option<(&str, &str)> {
    let t = line.trim_start();
    let rest = t.strip_prefix('!')?;
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    Some((&rest[..end], rest[end..].trim()))
}

/// Parse a macro buffer's lines into a program, verifying every opener has
/// its closer.
pub fn parse_program(lines: &[String]) -> EdResult<Program> {
    let mut src = Lines { lines, pos: 0 };
    let (body, term) = parse_block(&mut src, &[])?;
    debug_assert!(term.is_none());
    Ok(body)
}

/// Parse statements until one of `until` directives (returned) or the end.
fn parse_block<'a>(
    src: &mut Lines<'a>,
    until: &[&str],
) -> EdResult<(Vec<Stmt>, Option<(&'a str, &'a str)>)> {
    let mut out = Vec::new();
    while let Some(line) = src.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((name, rest)) = directive(line) {
            if until.contains(&name) {
                return Ok((out, Some((name, rest))));
            }
            out.push(parse_directive(src, name, rest)?);
        } else {
            out.push(Stmt::Expr(parse_expr_line(trimmed)?));
        }
    }
    if until.is_empty() {
        Ok((out, None))
    } else {
        Err(EdError::script(format!(
            "!{} expected before end of script",
            until.join(" or !")
        )))
    }
}

fn parse_directive(src: &mut Lines<'_>, name: &str, rest: &str) -> EdResult<Stmt> {
    match name {
        "if" => {
            let mut arms = Vec::new();
            let mut cond = parse_expr_line(rest)?;
            let mut else_body = None;
            loop {
                let (body, term) = parse_block(src, &["elsif", "else", "endif"])?;
                let (term_name, term_rest) = term.expect("parse_block returns the closer");
                arms.push((cond, body));
                match term_name {
                    "elsif" => cond = parse_expr_line(term_rest)?,
                    "else" => {
                        let (body, term) = parse_block(src, &["endif"])?;
                        debug_assert_eq!(term.map(|t| t.0), Some("endif"));
                        else_body = Some(body);
                        break;
                    }
                    _ => break,
                }
            }
            Ok(Stmt::If { arms, else_body })
        }
        "while" | "until" | "loop" => {
            let kind = match name {
                "while" => LoopKind::While,
                "until" => LoopKind::Until,
                _ => LoopKind::Plain,
            };
            let cond = if kind == LoopKind::Plain {
                if !rest.is_empty() {
                    return Err(EdError::script("!loop takes no argument"));
                }
                None
            } else {
                Some(parse_expr_line(rest)?)
            };
            let (body, term) = parse_block(src, &["endloop"])?;
            debug_assert_eq!(term.map(|t| t.0), Some("endloop"));
            Ok(Stmt::Loop { kind, cond, body })
        }
        "break" => {
            let n = if rest.is_empty() {
                1
            } else {
                rest.parse::<u32>()
                    .map_err(|_| EdError::script("Bad !break level"))?
            };
            if n < 1 {
                return Err(EdError::script("!break level must be 1 or greater"));
            }
            Ok(Stmt::Break(n))
        }
        "next" => Ok(Stmt::Next),
        "return" => {
            let value = if rest.is_empty() {
                None
            } else {
                Some(parse_expr_line(rest)?)
            };
            Ok(Stmt::Return(value))
        }
        "force" => {
            let inner = if let Some((name, rest)) = directive(rest) {
                parse_directive(src, name, rest)?
            } else {
                Stmt::Expr(parse_expr_line(rest)?)
            };
            Ok(Stmt::Force(Box::new(inner)))
        }
        "macro" => {
            let mut parts = rest.splitn(2, ',');
            let mname = parts.next().unwrap_or("").trim();
            if mname.is_empty() {
                return Err(EdError::script("!macro requires a name"));
            }
            let (mut min_args, mut max_args) = (0u16, None);
            if let Some(counts) = parts.next() {
                let mut it = counts.split(',').map(str::trim);
                if let Some(mn) = it.next() {
                    min_args = mn
                        .parse()
                        .map_err(|_| EdError::script("Bad !macro argument count"))?;
                    max_args = Some(min_args);
                }
                if let Some(mx) = it.next() {
                    max_args = if mx.is_empty() || mx == "*" {
                        None
                    } else {
                        Some(
                            mx.parse()
                                .map_err(|_| EdError::script("Bad !macro argument count"))?,
                        )
                    };
                }
            }
            // Collect raw lines (nested !macro is not allowed).
            let mut lines = Vec::new();
            loop {
                let line = src
                    .next()
                    .ok_or_else(|| EdError::script("!endmacro expected before end of script"))?;
                match directive(line) {
                    Some(("endmacro", _)) => break,
                    Some(("macro", _)) => {
                        return Err(EdError::script("!macro cannot nest"));
                    }
                    _ => lines.push(line.to_string()),
                }
            }
            Ok(Stmt::MacroDef {
                name: mname.to_string(),
                min_args,
                max_args,
                lines,
            })
        }
        "elsif" | "else" | "endif" | "endloop" | "endmacro" => Err(EdError::script(format!(
            "!{} without matching opener",
            name
        ))),
        other => Err(EdError::script(format!("Unknown directive !{}", other))),
    }
}

// --- expression parsing ------------------------------------------------------

/// Parse a full line as one (comma) expression.
pub fn parse_expr_line(text: &str) -> EdResult<Expr> {
    let toks = lex(text)?;
    if toks.is_empty() {
        return Err(EdError::script("Expression expected"));
    }
    let mut p = Parser { toks, pos: 0 };
    let e = p.comma()?;
    if p.pos != p.toks.len() {
        return Err(EdError::script(format!(
            "Trailing tokens in expression \"{}\"",
            text
        )));
    }
    Ok(e)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.peek() == Some(&Tok::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, what: &str) -> EdResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(EdError::script(format!("{} expected", what)))
        }
    }

    fn comma(&mut self) -> EdResult<Expr> {
        let first = self.assign()?;
        if self.peek() != Some(&Tok::Op(Op::Comma)) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            items.push(self.assign()?);
        }
        Ok(Expr::Seq(items))
    }

    fn assign(&mut self) -> EdResult<Expr> {
        let lhs = self.conditional()?;
        let op = match self.peek() {
            Some(Tok::Op(Op::Assign)) => None,
            Some(Tok::Op(Op::AddAssign)) => Some(BinOp::Add),
            Some(Tok::Op(Op::SubAssign)) => Some(BinOp::Sub),
            Some(Tok::Op(Op::MulAssign)) => Some(BinOp::Mul),
            Some(Tok::Op(Op::DivAssign)) => Some(BinOp::Div),
            Some(Tok::Op(Op::ModAssign)) => Some(BinOp::Rem),
            Some(Tok::Op(Op::ShlAssign)) => Some(BinOp::Shl),
            Some(Tok::Op(Op::ShrAssign)) => Some(BinOp::Shr),
            Some(Tok::Op(Op::AndAssign)) => Some(BinOp::BitAnd),
            Some(Tok::Op(Op::OrAssign)) => Some(BinOp::BitOr),
            Some(Tok::Op(Op::XorAssign)) => Some(BinOp::BitXor),
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let target = match lhs {
            Expr::Var(name) => Target::Var(name),
            Expr::ArgRef(n) => Target::ArgRef(n),
            _ => return Err(EdError::script("Assignment target must be a variable")),
        };
        // Right-associative.
        let value = self.assign()?;
        Ok(Expr::Assign {
            target,
            op,
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> EdResult<Expr> {
        let cond = self.logical_or()?;
        if !self.eat_op(Op::Question) {
            return Ok(cond);
        }
        let then = self.assign()?;
        self.expect_op(Op::Colon, "':'")?;
        let other = self.assign()?;
        Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(other)))
    }

    fn logical_or(&mut self) -> EdResult<Expr> {
        let mut lhs = self.logical_and()?;
        loop {
            let hit = matches!(self.peek(), Some(Tok::Op(Op::OrOr)) | Some(Tok::Kw(Kw::Or)));
            if !hit {
                return Ok(lhs);
            }
            self.pos += 1;
            let rhs = self.logical_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
    }

    fn logical_and(&mut self) -> EdResult<Expr> {
        let mut lhs = self.bit_or()?;
        loop {
            let hit = matches!(
                self.peek(),
                Some(Tok::Op(Op::AndAnd)) | Some(Tok::Kw(Kw::And))
            );
            if !hit {
                return Ok(lhs);
            }
            self.pos += 1;
            let rhs = self.bit_or()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
    }

    fn bit_or(&mut self) -> EdResult<Expr> {
        let mut lhs = self.bit_xor()?;
        while self.eat_op(Op::BitOr) {
            let rhs = self.bit_xor()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_xor(&mut self) -> EdResult<Expr> {
        let mut lhs = self.bit_and()?;
        while self.eat_op(Op::BitXor) {
            let rhs = self.bit_and()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> EdResult<Expr> {
        let mut lhs = self.equality()?;
        while self.eat_op(Op::BitAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> EdResult<Expr> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(Op::EqEq)) => BinOp::Eq,
                Some(Tok::Op(Op::NotEq)) => BinOp::Ne,
                Some(Tok::Op(Op::ReMatch)) => BinOp::ReMatch,
                Some(Tok::Op(Op::ReNotMatch)) => BinOp::ReNotMatch,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relational(&mut self) -> EdResult<Expr> {
        let mut lhs = self.shift()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(Op::Lt)) => BinOp::Lt,
                Some(Tok::Op(Op::Le)) => BinOp::Le,
                Some(Tok::Op(Op::Gt)) => BinOp::Gt,
                Some(Tok::Op(Op::Ge)) => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.shift()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn shift(&mut self) -> EdResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(Op::Shl)) => BinOp::Shl,
                Some(Tok::Op(Op::Shr)) => BinOp::Shr,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> EdResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(Op::Plus)) => BinOp::Add,
                Some(Tok::Op(Op::Minus)) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> EdResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Op(Op::Star)) => BinOp::Mul,
                Some(Tok::Op(Op::Slash)) => BinOp::Div,
                Some(Tok::Op(Op::Percent)) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> EdResult<Expr> {
        match self.peek() {
            Some(Tok::Op(Op::Minus)) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary()?)))
            }
            Some(Tok::Op(Op::Not)) | Some(Tok::Kw(Kw::Not)) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::Not, Box::new(self.unary()?)))
            }
            Some(Tok::Op(Op::Tilde)) => {
                self.pos += 1;
                Ok(Expr::Unary(UnOp::BitNot, Box::new(self.unary()?)))
            }
            Some(Tok::Kw(Kw::Force)) => {
                self.pos += 1;
                Ok(Expr::Force(Box::new(self.unary()?)))
            }
            Some(Tok::Op(Op::Incr)) | Some(Tok::Op(Op::Decr)) => {
                let incr = self.peek() == Some(&Tok::Op(Op::Incr));
                self.pos += 1;
                let target = self.target()?;
                Ok(Expr::IncDec {
                    target,
                    incr,
                    prefix: true,
                })
            }
            _ => self.postfix(),
        }
    }

    fn target(&mut self) -> EdResult<Target> {
        match self.peek().cloned() {
            Some(Tok::Var(name)) => {
                self.pos += 1;
                Ok(Target::Var(name))
            }
            Some(Tok::ArgRef(n)) => {
                self.pos += 1;
                Ok(Target::ArgRef(n))
            }
            _ => Err(EdError::script("Variable expected after ++/--")),
        }
    }

    fn postfix(&mut self) -> EdResult<Expr> {
        let e = self.primary()?;
        match (self.peek(), &e) {
            (Some(Tok::Op(Op::Incr)), Expr::Var(_)) | (Some(Tok::Op(Op::Incr)), Expr::ArgRef(_)) => {
                self.pos += 1;
                Ok(Expr::IncDec {
                    target: expr_target(e),
                    incr: true,
                    prefix: false,
                })
            }
            (Some(Tok::Op(Op::Decr)), Expr::Var(_)) | (Some(Tok::Op(Op::Decr)), Expr::ArgRef(_)) => {
                self.pos += 1;
                Ok(Expr::IncDec {
                    target: expr_target(e),
                    incr: false,
                    prefix: false,
                })
            }
            _ => Ok(e),
        }
    }

    fn primary(&mut self) -> EdResult<Expr> {
        let tok = self
            .peek()
            .cloned()
            .ok_or_else(|| EdError::script("Expression expected"))?;
        self.pos += 1;
        match tok {
            Tok::Num(n) => Ok(Expr::Int(n)),
            Tok::Char(c) => Ok(Expr::Int(c as i64)),
            Tok::Kw(Kw::True) => Ok(Expr::Bool(true)),
            Tok::Kw(Kw::False) => Ok(Expr::Bool(false)),
            Tok::Kw(Kw::Nil) => Ok(Expr::Nil),
            Tok::Var(name) => Ok(Expr::Var(name)),
            Tok::ArgRef(n) => Ok(Expr::ArgRef(n)),
            Tok::StrPlain(s) => Ok(Expr::Str(vec![Seg::Lit(s)])),
            Tok::Str(parts) => {
                let mut segs = Vec::with_capacity(parts.len());
                for p in parts {
                    match p {
                        StrPart::Lit(s) => segs.push(Seg::Lit(s)),
                        StrPart::Interp(src) => segs.push(Seg::Interp(parse_expr_line(&src)?)),
                    }
                }
                Ok(Expr::Str(segs))
            }
            Tok::Op(Op::LParen) => {
                let e = self.comma()?;
                self.expect_op(Op::RParen, "')'")?;
                Ok(e)
            }
            Tok::Op(Op::LBracket) => {
                let mut items = Vec::new();
                if !self.eat_op(Op::RBracket) {
                    loop {
                        items.push(self.assign()?);
                        if self.eat_op(Op::RBracket) {
                            break;
                        }
                        self.expect_op(Op::Comma, "','")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Tok::Ident(name) => {
                if self.eat_op(Op::LParen) {
                    // Function-call form with a parenthesized argument list.
                    let mut args = Vec::new();
                    if !self.eat_op(Op::RParen) {
                        loop {
                            args.push(self.assign()?);
                            if self.eat_op(Op::RParen) {
                                break;
                            }
                            self.expect_op(Op::Comma, "','")?;
                        }
                    }
                    return Ok(Expr::Call { name, args });
                }
                if self.starts_expression() {
                    // Parenless command call: arguments to end of expression.
                    let mut args = vec![self.assign()?];
                    while self.eat_op(Op::Comma) {
                        args.push(self.assign()?);
                    }
                    return Ok(Expr::Call { name, args });
                }
                Ok(Expr::Call {
                    name,
                    args: Vec::new(),
                })
            }
            other => Err(EdError::script(format!(
                "Unexpected token {:?} in expression",
                other
            ))),
        }
    }

    /// Does the next token begin an expression (so a bare identifier reads
    /// as a parenless command call)?
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Num(_))
                | Some(Tok::Char(_))
                | Some(Tok::Str(_))
                | Some(Tok::StrPlain(_))
                | Some(Tok::Var(_))
                | Some(Tok::ArgRef(_))
                | Some(Tok::Ident(_))
                | Some(Tok::Kw(Kw::True))
                | Some(Tok::Kw(Kw::False))
                | Some(Tok::Kw(Kw::Nil))
                | Some(Tok::Kw(Kw::Not))
                | Some(Tok::Kw(Kw::Force))
                | Some(Tok::Op(Op::Minus))
                | Some(Tok::Op(Op::Not))
                | Some(Tok::Op(Op::LBracket))
        )
    }
}

fn expr_target(e: Expr) -> Target {
    match e {
        Expr::Var(name) => Target::Var(name),
        Expr::ArgRef(n) => Target::ArgRef(n),
        _ => unreachable!("callers match variables only"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(src: &str) -> Vec<String> {
        src.lines().map(str::to_string).collect()
    }

    #[test]
    fn precedence_shapes() {
        let e = parse_expr_line("1 + 2 * 3").unwrap();
        match e {
            Expr::Binary(BinOp::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse_expr_line("$a = $b = 1").unwrap();
        match e {
            Expr::Assign { target, value, .. } => {
                assert_eq!(target, Target::Var("a".into()));
                assert!(matches!(*value, Expr::Assign { .. }));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn compound_assignment() {
        let e = parse_expr_line("$n += 2").unwrap();
        assert!(matches!(
            e,
            Expr::Assign {
                op: Some(BinOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn ternary_and_logicals() {
        let e = parse_expr_line("$a > 1 ? 'big' : 'small'").unwrap();
        assert!(matches!(e, Expr::Cond(_, _, _)));
        let e = parse_expr_line("1 == 1 && 2 == 2 || false").unwrap();
        assert!(matches!(e, Expr::Or(_, _)));
    }

    #[test]
    fn parenless_call_with_args() {
        let e = parse_expr_line("insertText 'abc', 2").unwrap();
        match e {
            Expr::Call { name, args } => {
                assert_eq!(name, "insertText");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn function_call_with_parens() {
        let e = parse_expr_line("max(1, 2)").unwrap();
        assert!(matches!(e, Expr::Call { ref name, ref args } if name == "max" && args.len() == 2));
    }

    #[test]
    fn niladic_call() {
        let e = parse_expr_line("beginLine").unwrap();
        assert!(matches!(e, Expr::Call { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn array_literal() {
        let e = parse_expr_line("[1, 'two', nil]").unwrap();
        assert!(matches!(e, Expr::Array(ref v) if v.len() == 3));
        assert!(matches!(parse_expr_line("[]").unwrap(), Expr::Array(ref v) if v.is_empty()));
    }

    #[test]
    fn interpolation_parses_inner_expression() {
        let e = parse_expr_line("\"n=#{$n + 1}\"").unwrap();
        match e {
            Expr::Str(segs) => {
                assert!(matches!(&segs[1], Seg::Interp(Expr::Binary(BinOp::Add, _, _))));
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn if_elsif_else_structure() {
        let prog = parse_program(&lines(
            "!if $a == 1\n1\n!elsif $a == 2\n2\n!else\n3\n!endif",
        ))
        .unwrap();
        match &prog[0] {
            Stmt::If { arms, else_body } => {
                assert_eq!(arms.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn loop_with_break_levels() {
        let prog = parse_program(&lines(
            "!loop\n!loop\n!break 2\n!endloop\n!endloop\n42",
        ))
        .unwrap();
        assert_eq!(prog.len(), 2);
        match &prog[0] {
            Stmt::Loop { kind, body, .. } => {
                assert_eq!(*kind, LoopKind::Plain);
                match &body[0] {
                    Stmt::Loop { body, .. } => assert_eq!(body[0], Stmt::Break(2)),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unmatched_directives_error() {
        assert!(parse_program(&lines("!if 1\n2")).is_err());
        assert!(parse_program(&lines("!endloop")).is_err());
        assert!(parse_program(&lines("!loop\n1")).is_err());
        assert!(parse_program(&lines("!break 0")).is_err());
    }

    #[test]
    fn force_wraps_statement() {
        let prog = parse_program(&lines("!force deleteBuf 'x'")).unwrap();
        assert!(matches!(&prog[0], Stmt::Force(_)));
    }

    #[test]
    fn macro_definition_collects_lines() {
        let prog = parse_program(&lines(
            "!macro greet,1\ninsertText $1\n!endmacro",
        ))
        .unwrap();
        match &prog[0] {
            Stmt::MacroDef {
                name,
                min_args,
                max_args,
                lines,
            } => {
                assert_eq!(name, "greet");
                assert_eq!(*min_args, 1);
                assert_eq!(*max_args, Some(1));
                assert_eq!(lines.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn while_until_conditions() {
        let prog = parse_program(&lines("!while $i < 3\n$i++\n!endloop")).unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::Loop {
                kind: LoopKind::While,
                cond: Some(_),
                ..
            }
        ));
        let prog = parse_program(&lines("!until $i == 3\n$i++\n!endloop")).unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::Loop {
                kind: LoopKind::Until,
                ..
            }
        ));
    }
}
