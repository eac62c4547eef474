//! Lexer for template text using logos

use logos::{Lexer, Logos};

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token<'s> {
    /// `$$`, a literal dollar sign
    #[token("$$")]
    DollarEscape,

    /// `${...}` with balanced braces; holds the text between them
    #[token("${", braced_variable)]
    Braced(&'s str),

    /// `$name`; holds the name
    #[regex(r"\$[A-Za-z0-9_]+", |lex| &lex.slice()[1..])]
    Bare(&'s str),

    /// A `$` not starting a variable
    #[token("$")]
    Dollar,

    /// `\#`, a literal hash
    #[token("\\#")]
    EscapedHash,

    #[token("\\")]
    Backslash,

    /// `#` to end of line, newline included
    #[regex(r"#[^\n]*\n?", logos::skip)]
    Comment,

    #[regex(r"[^$#\\]+")]
    Text(&'s str),
}

/// Consume up to the brace closing `${`. Without one the variable runs to end of input.
fn braced_variable<'s>(lex: &mut Lexer<'s, Token<'s>>) -> &'s str {
    let rest = lex.remainder();
    let mut depth = 1usize;
    for (i, b) in rest.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    lex.bump(i + 1);
                    return &rest[..i];
                }
            }
            _ => {}
        }
    }
    lex.bump(rest.len());
    rest
}

/// Tokenize into `(token, byte span)` pairs. Bytes the lexer rejects come back as `Err`.
pub fn lex(source: &str) -> impl Iterator<Item = (Result<Token<'_>, ()>, std::ops::Range<usize>)> {
    Token::lexer(source).spanned()
}
