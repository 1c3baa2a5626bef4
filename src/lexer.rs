//! Tokenizer shared by the statement parser and the expression evaluator.
//!
//! `parser.rs` drives this to build the statement model; `expression.rs`
//! drives it a second time over the raw text captured for Query/Control/
//! Subscribe expressions, since those are retained verbatim and only
//! evaluated lazily against a `Context`.

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Single-character punctuation: `( ) , = : . -` are handled as part of
    /// idents/numbers where possible; the remaining structural characters
    /// land here.
    Symbol(char),
    /// Multi-character operators: `== != >= <= && || > <`.
    Op(&'static str),
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the first character of this token in the source text.
    pub start: usize,
    /// Byte offset one past the last character of this token.
    pub end: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    /// Kind of the most recently emitted token, used to disambiguate a
    /// leading `-` between a negative-number literal and a binary minus.
    last: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            last: None,
        }
    }

    /// True where a `-` can only mean "start of a negative literal": at the
    /// very start of input, right after an operator, or right after an
    /// opening/separator symbol (`( , = :`). Anywhere else (after an ident,
    /// number, string, `)`, etc.) a `-` is a binary minus.
    fn at_operand_position(&self) -> bool {
        match &self.last {
            None => true,
            Some(TokenKind::Op(_)) => true,
            Some(TokenKind::Symbol(c)) => matches!(c, '(' | ',' | '=' | ':'),
            _ => false,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_insignificant(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenize the full input, terminating with a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let tok = self.next_token_raw()?;
        self.last = Some(tok.kind.clone());
        Ok(tok)
    }

    fn next_token_raw(&mut self) -> Result<Token, LexError> {
        self.skip_insignificant();
        let (line, column, start) = (self.line, self.column, self.pos);

        let Some(c) = self.peek_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
                column,
                start,
                end: start,
            });
        };

        if c == '"' {
            return self.lex_string(line, column, start);
        }
        if c.is_ascii_digit()
            || (c == '-' && self.peek_is_digit_after_minus() && self.at_operand_position())
        {
            return self.lex_number(line, column, start);
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(line, column, start);
        }

        // Multi-char operators.
        for op in ["==", "!=", ">=", "<=", "&&", "||"] {
            if self.src[self.pos..].starts_with(op) {
                for _ in 0..op.chars().count() {
                    self.advance();
                }
                return Ok(Token {
                    kind: TokenKind::Op(op),
                    line,
                    column,
                    start,
                    end: self.pos,
                });
            }
        }

        // Single-char operators/symbols.
        self.advance();
        let kind = match c {
            '>' => TokenKind::Op(">"),
            '<' => TokenKind::Op("<"),
            '+' => TokenKind::Op("+"),
            '-' => TokenKind::Op("-"),
            '*' => TokenKind::Op("*"),
            '/' => TokenKind::Op("/"),
            other => TokenKind::Symbol(other),
        };
        Ok(Token {
            kind,
            line,
            column,
            start,
            end: self.pos,
        })
    }

    fn peek_is_digit_after_minus(&self) -> bool {
        let mut chars = self.src[self.pos..].chars();
        if chars.next() != Some('-') {
            return false;
        }
        matches!(chars.next(), Some(c) if c.is_ascii_digit())
    }

    fn lex_string(&mut self, line: usize, column: usize, start: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        line,
                        column,
                        message: "unterminated string literal".to_string(),
                    })
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        return Err(LexError {
                            line,
                            column,
                            message: "unterminated escape sequence".to_string(),
                        })
                    }
                },
                Some(c) => value.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            line,
            column,
            start,
            end: self.pos,
        })
    }

    fn lex_number(&mut self, line: usize, column: usize, start: usize) -> Result<Token, LexError> {
        if self.peek_char() == Some('-') {
            self.advance();
        }
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek_char() == Some('.') {
            let mut rest = self.src[self.pos + 1..].chars();
            if matches!(rest.next(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                self.advance(); // '.'
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let save = self.pos;
            let save_line = self.line;
            let save_col = self.column;
            self.advance();
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.advance();
            }
            if matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
                self.line = save_line;
                self.column = save_col;
            }
        }
        let text = &self.src[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| LexError {
                line,
                column,
                message: format!("invalid float literal '{text}'"),
            })?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| LexError {
                line,
                column,
                message: format!("invalid integer literal '{text}'"),
            })?)
        };
        Ok(Token {
            kind,
            line,
            column,
            start,
            end: self.pos,
        })
    }

    fn lex_ident(&mut self, line: usize, column: usize, start: usize) -> Result<Token, LexError> {
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
        {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        let kind = match text {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(text.to_string()),
        };
        Ok(Token {
            kind,
            line,
            column,
            start,
            end: self.pos,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_multi_char_operators_before_single_char() {
        assert_eq!(
            kinds("a==b"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Op("=="),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("a>=b&&c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Op(">="),
                TokenKind::Ident("b".to_string()),
                TokenKind::Op("&&"),
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_numbers_lex_as_a_single_token() {
        assert_eq!(
            kinds("-42"),
            vec![TokenKind::Int(-42), TokenKind::Eof]
        );
        assert_eq!(kinds("-3.5"), vec![TokenKind::Float(-3.5), TokenKind::Eof]);
    }

    #[test]
    fn hyphen_between_alphanumerics_stays_in_the_ident() {
        // Hyphens are part of the dotted-path grammar (see
        // `ident_may_contain_dots_and_hyphens_for_dotted_paths`), so a bare
        // `a-b` is one ident, not `a`, `-`, `b`.
        assert_eq!(
            kinds("a-b"),
            vec![TokenKind::Ident("a-b".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn minus_after_a_value_is_a_binary_operator() {
        // A `-` right after a number (not at an operand position) is
        // subtraction, so adjacent literals never collide into two ints.
        assert_eq!(
            kinds("50-10"),
            vec![
                TokenKind::Int(50),
                TokenKind::Op("-"),
                TokenKind::Int(10),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("(50-10)"),
            vec![
                TokenKind::Symbol('('),
                TokenKind::Int(50),
                TokenKind::Op("-"),
                TokenKind::Int(10),
                TokenKind::Symbol(')'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn minus_after_an_operator_or_open_paren_is_still_a_negative_literal() {
        assert_eq!(
            kinds("x==-1"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Op("=="),
                TokenKind::Int(-1),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("(-1)"),
            vec![
                TokenKind::Symbol('('),
                TokenKind::Int(-1),
                TokenKind::Symbol(')'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn floats_with_exponents() {
        assert_eq!(kinds("1e3"), vec![TokenKind::Float(1000.0), TokenKind::Eof]);
        assert_eq!(
            kinds("1.5e-2"),
            vec![TokenKind::Float(0.015), TokenKind::Eof]
        );
    }

    #[test]
    fn bare_e_without_digits_is_not_consumed_as_exponent() {
        // "1e" with nothing after the 'e' should leave the ident "e" untouched.
        assert_eq!(
            kinds("1e x"),
            vec![
                TokenKind::Int(1),
                TokenKind::Ident("e".to_string()),
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\n""#),
            vec![TokenKind::Str("a\"b\\c\n".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }

    #[test]
    fn keywords_true_false_null() {
        assert_eq!(
            kinds("true false null"),
            vec![
                TokenKind::Bool(true),
                TokenKind::Bool(false),
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hash_comment_runs_to_end_of_line() {
        assert_eq!(
            kinds("a # a comment with == in it\nb"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn ident_may_contain_dots_and_hyphens_for_dotted_paths() {
        assert_eq!(
            kinds("agent-1.status"),
            vec![TokenKind::Ident("agent-1.status".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn line_and_column_tracking_across_newlines() {
        let tokens = Lexer::new("a\nb").tokenize().unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 1);
    }
}
