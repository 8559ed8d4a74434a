use std::fmt;

use crate::errors::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Whitespace,
    Str(String),
    Integer(i64),
    Real(f64),
    Name(String),
    /// A name immediately followed by `(`; the parenthesis is part of the token.
    Function(String),
    Dollar,
    At,
    Dot,
    DotDot,
    DotDotStar,
    Star,
    StarStar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
    Plus,
    Minus,
    Slash,
    Percent,
    Bang,
    Eq,
    Ne,
    EEq,
    NEe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    Caret,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Whitespace => f.write_str("whitespace"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Integer(i) => write!(f, "integer {i}"),
            TokenKind::Real(r) => write!(f, "number {r}"),
            TokenKind::Name(n) => write!(f, "name `{n}`"),
            TokenKind::Function(n) => write!(f, "function `{n}(`"),
            other => write!(f, "`{}`", other.symbol()),
        }
    }
}

impl TokenKind {
    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Dollar => "$",
            TokenKind::At => "@",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::DotDotStar => "..*",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::EEq => "===",
            TokenKind::NEe => "!==",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::BitAnd => "&",
            TokenKind::BitOr => "|",
            TokenKind::Caret => "^",
            _ => "",
        }
    }
}

/// A classified slice of the source, with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub offset: usize,
    pub text: &'s str,
}

/// Splits an expression into tokens. Whitespace runs are kept as
/// [`TokenKind::Whitespace`] so the parser can tell `a.b` from `a .b`.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    let mut lexer = Lexer { s: source, i: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

pub(crate) fn is_name_start(c: char) -> bool {
    c == '_' || c == '\\' || c.is_alphabetic()
}

pub(crate) fn is_name_char(c: char) -> bool {
    c == '_' || c == '-' || c == '\\' || c.is_alphanumeric()
}

struct Lexer<'s> {
    s: &'s str,
    i: usize,
}

impl<'s> Lexer<'s> {
    fn next_token(&mut self) -> Result<Option<Token<'s>>, SyntaxError> {
        let start = self.i;
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };
        let kind = if c.is_whitespace() {
            self.skip_ws();
            TokenKind::Whitespace
        } else if c == '"' || c == '\'' {
            TokenKind::Str(self.quoted_string()?)
        } else if c.is_ascii_digit() {
            self.number()
        } else if is_name_start(c) {
            let name = self.name()?;
            if self.consume_char('(') {
                TokenKind::Function(name)
            } else {
                TokenKind::Name(name)
            }
        } else {
            self.operator()?
        };
        Ok(Some(Token {
            kind,
            offset: start,
            text: &self.s[start..self.i],
        }))
    }

    fn operator(&mut self) -> Result<TokenKind, SyntaxError> {
        // Longest match first.
        let table = [
            ("===", TokenKind::EEq),
            ("!==", TokenKind::NEe),
            ("..*", TokenKind::DotDotStar),
            ("==", TokenKind::Eq),
            ("!=", TokenKind::Ne),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("&&", TokenKind::And),
            ("||", TokenKind::Or),
            ("**", TokenKind::StarStar),
            ("..", TokenKind::DotDot),
            ("=", TokenKind::Eq),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
            ("&", TokenKind::BitAnd),
            ("|", TokenKind::BitOr),
            ("^", TokenKind::Caret),
            ("!", TokenKind::Bang),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("?", TokenKind::Question),
            (":", TokenKind::Colon),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            ("$", TokenKind::Dollar),
            ("@", TokenKind::At),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            ("[", TokenKind::LBracket),
            ("]", TokenKind::RBracket),
        ];
        for (text, kind) in table {
            if self.peek_str(text) {
                self.i += text.len();
                return Ok(kind);
            }
        }
        let c = self.peek_char().unwrap_or_default();
        Err(SyntaxError::new(
            format!("unexpected character {c:?}"),
            self.s,
            self.i,
        ))
    }

    fn name(&mut self) -> Result<String, SyntaxError> {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if !is_name_char(c) {
                break;
            }
            self.i += c.len_utf8();
            if c == '\\' {
                match self.peek_char() {
                    Some(escaped) => {
                        self.i += escaped.len_utf8();
                        out.push(escaped);
                    }
                    None => {
                        return Err(SyntaxError::new("dangling escape in name", self.s, self.i - 1))
                    }
                }
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }

    fn number(&mut self) -> TokenKind {
        let start = self.i;
        self.digits();
        let mut real = false;
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            real = true;
            self.i += 1;
            self.digits();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_nth(1), Some('+' | '-')));
            if self.peek_nth(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                real = true;
                self.i += 1 + sign;
                self.digits();
            }
        }
        let text = &self.s[start..self.i];
        if !real {
            if let Ok(i) = text.parse::<i64>() {
                return TokenKind::Integer(i);
            }
        }
        // Integers too large for i64 degrade to reals.
        TokenKind::Real(text.parse().unwrap_or(f64::INFINITY))
    }

    fn digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.i += 1;
        }
    }

    fn quoted_string(&mut self) -> Result<String, SyntaxError> {
        let start = self.i;
        let quote = self.peek_char().unwrap_or('"');
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(nc) = self.peek_char() else {
                break;
            };
            self.i += nc.len_utf8();
            match nc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'u' => out.push(self.unicode_escape()?),
                other => out.push(other),
            }
        }
        Err(SyntaxError::new("unterminated string", self.s, start))
    }

    fn unicode_escape(&mut self) -> Result<char, SyntaxError> {
        let start = self.i;
        let hex = self.s.get(start..start + 4).unwrap_or_default();
        let c = u32::from_str_radix(hex, 16)
            .ok()
            .filter(|_| hex.len() == 4)
            .and_then(char::from_u32)
            .ok_or_else(|| SyntaxError::new("invalid \\u escape", self.s, start))?;
        self.i += 4;
        Ok(c)
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.s[self.i..].chars().nth(n)
    }

    fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Whitespace)
            .collect()
    }

    #[test]
    fn path_wildcards_are_distinct() {
        assert_eq!(
            kinds("$.a.*..b..*[*]"),
            vec![
                TokenKind::Dollar,
                TokenKind::Dot,
                TokenKind::Name("a".into()),
                TokenKind::Dot,
                TokenKind::Star,
                TokenKind::DotDot,
                TokenKind::Name("b".into()),
                TokenKind::DotDotStar,
                TokenKind::LBracket,
                TokenKind::Star,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn numbers_split_into_integer_and_real() {
        assert_eq!(
            kinds("12 1.5 2e3 7"),
            vec![
                TokenKind::Integer(12),
                TokenKind::Real(1.5),
                TokenKind::Real(2000.0),
                TokenKind::Integer(7),
            ]
        );
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            kinds("a === b !== c == d != e <= f"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::EEq,
                TokenKind::Name("b".into()),
                TokenKind::NEe,
                TokenKind::Name("c".into()),
                TokenKind::Eq,
                TokenKind::Name("d".into()),
                TokenKind::Ne,
                TokenKind::Name("e".into()),
                TokenKind::Le,
                TokenKind::Name("f".into()),
            ]
        );
    }

    #[test]
    fn function_token_swallows_paren() {
        let tokens = tokenize("count($.a)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Function("count".into()));
        assert_eq!(tokens[0].text, "count(");
        assert_eq!(tokens[1].offset, 6);
    }

    #[test]
    fn hyphenated_names_and_escapes() {
        assert_eq!(
            kinds(r#"first-name 'it\'s\n' a\.b"#),
            vec![
                TokenKind::Name("first-name".into()),
                TokenKind::Str("it's\n".into()),
                TokenKind::Name("a.b".into()),
            ]
        );
    }

    #[test]
    fn whitespace_is_a_token() {
        let tokens = tokenize("a  .b").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Whitespace);
        assert_eq!(tokens[1].text, "  ");
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let err = tokenize("$.a == 'abc").unwrap_err();
        assert_eq!(err.offset, 7);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn unknown_character_is_rejected() {
        let err = tokenize("$.a # 1").unwrap_err();
        assert_eq!(err.offset, 4);
    }
}
