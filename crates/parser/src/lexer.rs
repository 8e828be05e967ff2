// Copyright (c) 2025 pipesql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Lexer
//!
//! Converts pipesql source text into a token stream.
//!
//! The lexer never fails: unrecognized characters become
//! [`TokenKind::Error`] tokens and scanning continues, so the parser can
//! report the problem with a span and still recover. Whitespace and `#`
//! comments are dropped; newlines are significant and produced as
//! [`TokenKind::NewLine`] tokens because they separate pipeline steps and
//! statements. The stream always ends with an explicit
//! [`TokenKind::Eof`] token.

use crate::token::{Token, TokenKind};
use pipesql_diagnostics::Span;

/// Tokenize `source` into a complete token stream
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    /// Byte offset where the current line starts
    line_start: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            self.next_token();
        }
        let span = self.span_from(self.pos);
        self.tokens.push(Token::new(TokenKind::Eof, "", span));
        self.tokens
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(
            start,
            self.pos,
            self.line,
            start - self.line_start + 1,
        )
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let text = &self.source[start..self.pos];
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, text, span));
    }

    fn next_token(&mut self) {
        let start = self.pos;
        let c = self.peek();

        match c {
            b' ' | b'\t' | b'\r' => {
                self.pos += 1;
            }
            b'\n' => {
                self.pos += 1;
                self.push(TokenKind::NewLine, start);
                self.line += 1;
                self.line_start = self.pos;
            }
            b'#' => {
                while self.pos < self.bytes.len() && self.peek() != b'\n' {
                    self.pos += 1;
                }
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(),
            b'0'..=b'9' => self.lex_number(),
            b'\'' | b'"' => self.lex_string(c),
            b'@' => self.lex_date(),
            _ => self.lex_operator(),
        }
    }

    fn lex_ident(&mut self) {
        let start = self.pos;
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.pos += 1;
        }
        let kind = match &self.source[start..self.pos] {
            "let" => TokenKind::KwLet,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            _ => TokenKind::Ident,
        };
        self.push(kind, start);
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        while self.peek().is_ascii_digit() || self.peek() == b'_' {
            self.pos += 1;
        }
        // `1..10` must stay integer + range operator, `1.5` is a float
        let mut kind = TokenKind::Integer;
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            self.pos += 1;
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.pos += 1;
            }
            kind = TokenKind::Float;
        }
        if matches!(self.peek(), b'e' | b'E') && (self.peek_at(1).is_ascii_digit()
            || (matches!(self.peek_at(1), b'+' | b'-') && self.peek_at(2).is_ascii_digit()))
        {
            self.pos += 1;
            if matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
            kind = TokenKind::Float;
        }
        self.push(kind, start);
    }

    fn lex_string(&mut self, quote: u8) {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;
        while self.pos < self.bytes.len() && self.peek() != quote && self.peek() != b'\n' {
            // Backslash escapes the next character
            if self.peek() == b'\\' && self.pos + 1 < self.bytes.len() {
                self.pos += 1;
            }
            self.pos += 1;
        }
        if self.peek() == quote {
            let content = self.source[content_start..self.pos].to_string();
            self.pos += 1;
            let span = self.span_from(start);
            self.tokens
                .push(Token::new(TokenKind::String, unescape(&content), span));
        } else {
            // Unterminated string: tag the rest of the line as an error token
            self.push(TokenKind::Error, start);
        }
    }

    fn lex_date(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;
        while matches!(self.peek(), b'0'..=b'9' | b'-' | b':' | b'.' | b'T') {
            self.pos += 1;
        }
        if self.pos == content_start {
            self.push(TokenKind::Error, start);
            return;
        }
        let text = self.source[content_start..self.pos].to_string();
        let span = self.span_from(start);
        self.tokens.push(Token::new(TokenKind::Date, text, span));
    }

    fn lex_operator(&mut self) {
        let start = self.pos;
        let c = self.peek();
        let c2 = self.peek_at(1);
        let (kind, len) = match (c, c2) {
            (b'=', b'=') => (TokenKind::Eq, 2),
            (b'!', b'=') => (TokenKind::NotEq, 2),
            (b'<', b'=') => (TokenKind::LtEq, 2),
            (b'>', b'=') => (TokenKind::GtEq, 2),
            (b'+', b'+') => (TokenKind::Concat, 2),
            (b'&', b'&') => (TokenKind::And, 2),
            (b'|', b'|') => (TokenKind::Or, 2),
            (b'-', b'>') => (TokenKind::Arrow, 2),
            (b'.', b'.') => (TokenKind::DotDot, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b':', _) => (TokenKind::Colon, 1),
            _ => (TokenKind::Error, utf8_len(c)),
        };
        self.pos += len;
        self.push(kind, start);
    }
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_pipeline() {
        let tokens = tokenize(r#"from employees | filter department == "eng""#);
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["from", "employees", "|", "filter", "department", "==", "eng", ""]
        );
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let tokens = tokenize("from t\nfilter x");
        let filter = tokens.iter().find(|t| t.text == "filter").unwrap();
        assert_eq!(filter.span.line, 2);
        assert_eq!(filter.span.column, 1);
        let x = tokens.iter().find(|t| t.text == "x").unwrap();
        assert_eq!(x.span.line, 2);
        assert_eq!(x.span.column, 8);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("1 2.5 1_000 3e4"),
            vec![
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_range_does_not_eat_integer_dot() {
        assert_eq!(
            kinds("1..10"),
            vec![
                TokenKind::Integer,
                TokenKind::DotDot,
                TokenKind::Integer,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\nb""#);
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].text, "a\nb");
    }

    #[test]
    fn test_date_literal() {
        let tokens = tokenize("@2023-01-01");
        assert_eq!(tokens[0].kind, TokenKind::Date);
        assert_eq!(tokens[0].text, "2023-01-01");
    }

    #[test]
    fn test_comment_dropped() {
        assert_eq!(
            kinds("from t # trailing comment\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::NewLine,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unknown_character_becomes_error_token() {
        let tokens = tokenize("from t ; select x");
        let err = tokens.iter().find(|t| t.kind == TokenKind::Error).unwrap();
        assert_eq!(err.text, ";");
        // Lexing continues past the error
        assert!(tokens.iter().any(|t| t.text == "select"));
    }

    #[test]
    fn test_unterminated_string_is_error_token() {
        let tokens = tokenize("filter x == \"oops\nfrom t");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
        assert!(tokens.iter().any(|t| t.text == "from"));
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            kinds("a and b or c"),
            vec![
                TokenKind::Ident,
                TokenKind::And,
                TokenKind::Ident,
                TokenKind::Or,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_arrow_and_pipe() {
        assert_eq!(
            kinds("a -> a | b"),
            vec![
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Pipe,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }
}
