//! Script lexer.
//!
//! Tokens: identifiers (optionally ending in `?` for the predicate form),
//! decimal and `0x` numeric literals, character literals (`?c`, `?\e`),
//! single- and double-quoted strings, operators (longest match), `$name`
//! global variables, `$N` positional arguments, keywords, and comments (`#`
//! to end of line, nestable `/# ... #/` in line). Inside double-quoted
//! strings `#{expr}` marks an interpolation; the lexer captures the raw
//! expression text through balanced braces and nested quotes.

use core_status::{EdError, EdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Comma,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    Question,
    Colon,
    OrOr,
    AndAnd,
    BitOr,
    BitXor,
    BitAnd,
    EqEq,
    NotEq,
    ReMatch,
    ReNotMatch,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    Tilde,
    Incr,
    Decr,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// Keywords, resolved after identifier scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    Force,
}

/// A piece of a double-quoted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrPart {
    Lit(String),
    /// Raw source of a `#{...}` interpolation.
    Interp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Num(i64),
    Char(u8),
    /// Double-quoted, with interpolations.
    Str(Vec<StrPart>),
    /// Single-quoted, verbatim.
    StrPlain(String),
    Op(Op),
    /// `$name`
    Var(String),
    /// `$N`
    ArgRef(u32),
    Kw(Kw),
}

const KEYWORDS: &[(&str, Kw)] = &[
    ("and", Kw::And),
    ("false", Kw::False),
    ("force", Kw::Force),
    ("nil", Kw::Nil),
    ("not", Kw::Not),
    ("or", Kw::Or),
    ("true", Kw::True),
];

/// Lex one source line into tokens. Comments are stripped.
pub fn lex(line: &str) -> EdResult<Vec<Tok>> {
    let b: Vec<char> = line.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        if c == ' ' || c == '\t' {
            i += 1;
            continue;
        }
        if c == '#' && b.get(i + 1) != Some(&'{') {
            break; // comment to end of line
        }
        if c == '/' && b.get(i + 1) == Some(&'#') {
            // In-line comment, nestable.
            let mut depth = 1;
            i += 2;
            while i < b.len() && depth > 0 {
                if b[i] == '/' && b.get(i + 1) == Some(&'#') {
                    depth += 1;
                    i += 2;
                } else if b[i] == '#' && b.get(i + 1) == Some(&'/') {
                    depth -= 1;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            if depth > 0 {
                return Err(EdError::script("Unterminated /# comment"));
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == '_') {
                i += 1;
            }
            let mut name: String = b[start..i].iter().collect();
            if b.get(i) == Some(&'?') {
                name.push('?');
                i += 1;
            }
            match KEYWORDS.iter().find(|(k, _)| *k == name) {
                Some((_, kw)) => toks.push(Tok::Kw(*kw)),
                None => toks.push(Tok::Ident(name)),
            }
            continue;
        }
        if c.is_ascii_digit() {
            let (n, next) = lex_number(&b, i)?;
            toks.push(Tok::Num(n));
            i = next;
            continue;
        }
        match c {
            '$' => {
                i += 1;
                let start = i;
                if b.get(i).is_some_and(|c| c.is_ascii_digit()) {
                    while i < b.len() && b[i].is_ascii_digit() {
                        i += 1;
                    }
                    let num: String = b[start..i].iter().collect();
                    let n: u32 = num
                        .parse()
                        .map_err(|_| EdError::script("Bad argument reference"))?;
                    toks.push(Tok::ArgRef(n));
                } else {
                    while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == '_') {
                        i += 1;
                    }
                    if i == start {
                        return Err(EdError::script("'$' without variable name"));
                    }
                    toks.push(Tok::Var(b[start..i].iter().collect()));
                }
            }
            '?' if b
                .get(i + 1)
                .is_some_and(|c| !c.is_whitespace() && *c != ':') =>
            {
                // Character literal, unless this '?' reads as the ternary
                // operator (then it is followed by whitespace).
                i += 1;
                let ch = b[i];
                if ch == '\\' {
                    let (esc, next) = lex_escape(&b, i + 1)?;
                    toks.push(Tok::Char(esc));
                    i = next;
                } else {
                    if !ch.is_ascii() {
                        return Err(EdError::script("Non-ASCII character literal"));
                    }
                    toks.push(Tok::Char(ch as u8));
                    i += 1;
                }
            }
            '\'' => {
                i += 1;
                let start = i;
                while i < b.len() && b[i] != '\'' {
                    i += 1;
                }
                if i >= b.len() {
                    return Err(EdError::script("Unterminated string"));
                }
                toks.push(Tok::StrPlain(b[start..i].iter().collect()));
                i += 1;
            }
            '"' => {
                let (parts, next) = lex_dquote(&b, i + 1)?;
                toks.push(Tok::Str(parts));
                i = next;
            }
            _ => {
                let (op, next) = lex_op(&b, i)?;
                toks.push(Tok::Op(op));
                i = next;
            }
        }
    }
    Ok(toks)
}

fn lex_number(b: &[char], mut i: usize) -> EdResult<(i64, usize)> {
    if b[i] == '0' && matches!(b.get(i + 1), Some('x') | Some('X')) {
        i += 2;
        let start = i;
        while i < b.len() && b[i].is_ascii_hexdigit() {
            i += 1;
        }
        if i == start {
            return Err(EdError::script("Bad hexadecimal literal"));
        }
        let text: String = b[start..i].iter().collect();
        let n = i64::from_str_radix(&text, 16)
            .map_err(|_| EdError::script("Hexadecimal literal out of range"))?;
        return Ok((n, i));
    }
    let start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let text: String = b[start..i].iter().collect();
    let n = text
        .parse()
        .map_err(|_| EdError::script("Numeric literal out of range"))?;
    Ok((n, i))
}

fn lex_escape(b: &[char], i: usize) -> EdResult<(u8, usize)> {
    let c = *b.get(i).ok_or_else(|| EdError::script("Bad escape"))?;
    let v = match c {
        'n' => b'\n',
        't' => b'\t',
        'r' => b'\r',
        'e' => 0x1B,
        '0' => 0,
        '\\' => b'\\',
        '\'' => b'\'',
        '"' => b'"',
        other if other.is_ascii() => other as u8,
        _ => return Err(EdError::script("Bad escape")),
    };
    Ok((v, i + 1))
}

/// Scan a double-quoted string body, splitting out `#{...}` interpolations.
fn lex_dquote(b: &[char], mut i: usize) -> EdResult<(Vec<StrPart>, usize)> {
    let mut parts = Vec::new();
    let mut lit = String::new();
    loop {
        let c = *b
            .get(i)
            .ok_or_else(|| EdError::script("Unterminated string"))?;
        match c {
            '"' => {
                if !lit.is_empty() {
                    parts.push(StrPart::Lit(lit));
                }
                return Ok((parts, i + 1));
            }
            '\\' => {
                let (esc, next) = lex_escape(b, i + 1)?;
                lit.push(esc as char);
                i = next;
            }
            '#' if b.get(i + 1) == Some(&'{') => {
                if !lit.is_empty() {
                    parts.push(StrPart::Lit(std::mem::take(&mut lit)));
                }
                // Scan through balanced braces and nested quotes.
                i += 2;
                let start = i;
                let mut depth = 1;
                while i < b.len() && depth > 0 {
                    match b[i] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        '\'' => {
                            i += 1;
                            while i < b.len() && b[i] != '\'' {
                                i += 1;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                if depth > 0 {
                    return Err(EdError::script("Unterminated #{ interpolation"));
                }
                parts.push(StrPart::Interp(b[start..i - 1].iter().collect()));
            }
            other => {
                lit.push(other);
                i += 1;
            }
        }
    }
}

/// Longest-match operator scan.
fn lex_op(b: &[char], i: usize) -> EdResult<(Op, usize)> {
    let two: String = b[i..(i + 2).min(b.len())].iter().collect();
    let three: String = b[i..(i + 3).min(b.len())].iter().collect();
    let (op, len) = match three.as_str() {
        "<<=" => (Op::ShlAssign, 3),
        ">>=" => (Op::ShrAssign, 3),
        _ => match two.as_str() {
            "+=" => (Op::AddAssign, 2),
            "-=" => (Op::SubAssign, 2),
            "*=" => (Op::MulAssign, 2),
            "/=" => (Op::DivAssign, 2),
            "%=" => (Op::ModAssign, 2),
            "&=" => (Op::AndAssign, 2),
            "|=" => (Op::OrAssign, 2),
            "^=" => (Op::XorAssign, 2),
            "||" => (Op::OrOr, 2),
            "&&" => (Op::AndAnd, 2),
            "==" => (Op::EqEq, 2),
            "!=" => (Op::NotEq, 2),
            "=~" => (Op::ReMatch, 2),
            "!~" => (Op::ReNotMatch, 2),
            "<=" => (Op::Le, 2),
            ">=" => (Op::Ge, 2),
            "<<" => (Op::Shl, 2),
            ">>" => (Op::Shr, 2),
            "++" => (Op::Incr, 2),
            "--" => (Op::Decr, 2),
            _ => match b[i] {
                ',' => (Op::Comma, 1),
                '=' => (Op::Assign, 1),
                '?' => (Op::Question, 1),
                ':' => (Op::Colon, 1),
                '|' => (Op::BitOr, 1),
                '^' => (Op::BitXor, 1),
                '&' => (Op::BitAnd, 1),
                '<' => (Op::Lt, 1),
                '>' => (Op::Gt, 1),
                '+' => (Op::Plus, 1),
                '-' => (Op::Minus, 1),
                '*' => (Op::Star, 1),
                '/' => (Op::Slash, 1),
                '%' => (Op::Percent, 1),
                '!' => (Op::Not, 1),
                '~' => (Op::Tilde, 1),
                '(' => (Op::LParen, 1),
                ')' => (Op::RParen, 1),
                '[' => (Op::LBracket, 1),
                ']' => (Op::RBracket, 1),
                other => {
                    return Err(EdError::script(format!(
                        "Unknown character '{}' in expression",
                        other
                    )));
                }
            },
        },
    };
    Ok((op, i + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn idents_and_keywords() {
        let t = lex("foo and defined? nil").unwrap();
        assert_eq!(
            t,
            vec![
                Tok::Ident("foo".into()),
                Tok::Kw(Kw::And),
                Tok::Ident("defined?".into()),
                Tok::Kw(Kw::Nil),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("42 0x2A").unwrap(), vec![Tok::Num(42), Tok::Num(42)]);
        assert!(lex("0x").is_err());
    }

    #[test]
    fn char_literals() {
        assert_eq!(lex("?a").unwrap(), vec![Tok::Char(b'a')]);
        assert_eq!(lex("?\\e").unwrap(), vec![Tok::Char(0x1B)]);
        assert_eq!(lex("?\\n").unwrap(), vec![Tok::Char(b'\n')]);
    }

    #[test]
    fn ternary_question_still_lexes() {
        let t = lex("x ? 1 : 2").unwrap();
        assert_eq!(
            t,
            vec![
                Tok::Ident("x".into()),
                Tok::Op(Op::Question),
                Tok::Num(1),
                Tok::Op(Op::Colon),
                Tok::Num(2),
            ]
        );
    }

    #[test]
    fn strings_plain_and_interpolated() {
        assert_eq!(
            lex("'abc'").unwrap(),
            vec![Tok::StrPlain("abc".into())]
        );
        let t = lex("\"a#{$x + 1}b\"").unwrap();
        assert_eq!(
            t,
            vec![Tok::Str(vec![
                StrPart::Lit("a".into()),
                StrPart::Interp("$x + 1".into()),
                StrPart::Lit("b".into()),
            ])]
        );
    }

    #[test]
    fn interpolation_scans_nested_braces_and_quotes() {
        let t = lex("\"#{f('}', 2)}\"").unwrap();
        assert_eq!(
            t,
            vec![Tok::Str(vec![StrPart::Interp("f('}', 2)".into())])]
        );
        assert!(lex("\"#{oops\"").is_err());
    }

    #[test]
    fn vars_and_arg_refs() {
        let t = lex("$foo $1 $12").unwrap();
        assert_eq!(
            t,
            vec![
                Tok::Var("foo".into()),
                Tok::ArgRef(1),
                Tok::ArgRef(12),
            ]
        );
        assert!(lex("$ x").is_err());
    }

    #[test]
    fn comments_stripped() {
        assert_eq!(lex("1 # rest ignored").unwrap(), vec![Tok::Num(1)]);
        assert_eq!(
            lex("1 /# mid /# nested #/ comment #/ 2").unwrap(),
            vec![Tok::Num(1), Tok::Num(2)]
        );
        assert!(lex("1 /# open").is_err());
    }

    #[test]
    fn operators_longest_match() {
        let t = lex("a <<= b << c <= d < e").unwrap();
        assert_eq!(
            t,
            vec![
                Tok::Ident("a".into()),
                Tok::Op(Op::ShlAssign),
                Tok::Ident("b".into()),
                Tok::Op(Op::Shl),
                Tok::Ident("c".into()),
                Tok::Op(Op::Le),
                Tok::Ident("d".into()),
                Tok::Op(Op::Lt),
                Tok::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn regex_match_operators() {
        let t = lex("$s =~ 'p' !~ x").unwrap();
        assert!(t.contains(&Tok::Op(Op::ReMatch)));
        assert!(t.contains(&Tok::Op(Op::ReNotMatch)));
    }
}
