use logos::Logos;
use num_bigint::BigInt;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Keywords
    #[token("define")]
    Define,
    #[token("as")]
    As,
    #[token("end")]
    End,
    #[token("puts")]
    Puts,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("lambda")]
    Lambda,
    #[token("not")]
    Not,
    #[token("mod")]
    Mod,
    #[token("and")]
    And,
    #[token("or")]
    Or,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=")]
    Eq,
    #[token("~=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("|")]
    Pipe,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<BigInt>().ok())]
    Integer(BigInt),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    Text(String),

    #[regex(r"[A-Za-z][A-Za-z0-9?]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Token::Define => "define",
            Token::As => "as",
            Token::End => "end",
            Token::Puts => "puts",
            Token::If => "if",
            Token::Then => "then",
            Token::Else => "else",
            Token::Lambda => "lambda",
            Token::Not => "not",
            Token::Mod => "mod",
            Token::And => "and",
            Token::Or => "or",
            Token::True => "true",
            Token::False => "false",
            Token::Nil => "nil",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Eq => "=",
            Token::NotEq => "~=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Pipe => "|",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Dot => ".",
            Token::Integer(n) => return write!(f, "{n}"),
            Token::Text(s) => return write!(f, "\"{s}\""),
            Token::Ident(name) => return write!(f, "{name}"),
        };
        write!(f, "'{s}'")
    }
}

/// Lex source code into a stream of tokens with positions.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                let snippet = &source[span.clone()];
                return Err(LexError {
                    position: span.start,
                    snippet: snippet.to_string(),
                    suggestion: suggest_fix(snippet),
                });
            }
        }
    }

    tracing::trace!(count = tokens.len(), "lexed");
    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    match bad_token {
        "~" => "Inequality is written '~='".to_string(),
        "!" | "!=" => "Use 'not' for negation and '~=' for inequality".to_string(),
        "&" | "&&" => "Use the 'and' keyword".to_string(),
        "||" => "Use the 'or' keyword; '|' applies a function".to_string(),
        "_" => "Identifiers start with a letter and may contain letters, digits and '?'".to_string(),
        s if s.starts_with('"') => "Unterminated string literal; close it with '\"'".to_string(),
        s if s.starts_with("/*") => "Unterminated block comment; close it with '*/'".to_string(),
        s => format!("Unexpected character(s): '{}'", s),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

impl LexError {
    pub fn code(&self) -> &'static str {
        "MAL-L001"
    }
}
