//! Core Folio lexer: classifies the next token at a cursor.
//!
//! Features:
//! - Six lexical contexts, selected per call by the parser
//! - No state beyond the cursor: `next` never looks at earlier tokens
//! - Guaranteed progress: every token except `Eof` consumes at least one character
//! - `@~` / trailing `~` trim markers reported as token flags
//! - `@` preceded by an ASCII letter or digit stays literal (e-mail addresses)

use folio_types::Position;

use crate::token::{LexContext, Token, TokenKind};

/// Character-level scanner over a source slice.
struct Scan<'src> {
    source: &'src str,
    pos: Position,
}

impl<'src> Scan<'src> {
    fn at(source: &'src str, pos: Position) -> Self {
        Self { source, pos }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos = self.pos.advance(ch);
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }

    /// Advance past `text`, which must be the next input.
    fn skip(&mut self, text: &str) {
        self.pos = self.pos.advance_str(text);
    }

    fn skip_to_end(&mut self) {
        let rest = self.rest();
        self.skip(rest);
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// How a double-quoted string body ended.
enum StringEnd {
    /// At `${`.
    Interpolation,
    /// At the closing `"`.
    Close,
    /// At end of input.
    Eof,
}

/// The Folio lexer.
///
/// Holds only the source; the cursor is passed to every [`Lexer::next`] call
/// and the returned token's `end` is the next cursor.
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'src> {
    source: &'src str,
}

impl<'src> Lexer<'src> {
    /// Create a lexer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Classify the next token at `cursor` in `context`.
    pub fn next(&self, context: LexContext, cursor: Position) -> Token {
        match context {
            LexContext::TopLevel => self.scan_top_level(cursor),
            LexContext::Expression => self.scan_expression(cursor),
            LexContext::Inline => self.scan_inline(cursor),
            LexContext::StringInterpolation => self.scan_interpolation(cursor),
            LexContext::Regex => self.scan_regex(cursor),
            LexContext::Raw => self.scan_raw(cursor),
        }
    }

    /// Lex the whole input in a single context, up to and including `Eof`.
    pub fn tokenize(&self, context: LexContext) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut cursor = Position::START;
        loop {
            let token = self.next(context, cursor);
            cursor = token.end;
            tokens.push(token);
            if token.is_eof() {
                break;
            }
        }
        tokens
    }

    // ─────────────────────────────────────────────────────────────
    // Top-level text
    // ─────────────────────────────────────────────────────────────

    fn scan_top_level(&self, cursor: Position) -> Token {
        let mut s = Scan::at(self.source, cursor);
        loop {
            match s.peek() {
                None => {
                    return Token::new(TokenKind::Eof, cursor, s.pos, s.pos, LexContext::TopLevel)
                }
                Some('@') => {
                    let at = s.pos;
                    if s.peek_at(1) == Some('@') {
                        s.skip("@@");
                        return Token::new(TokenKind::Escape, cursor, at, s.pos, LexContext::TopLevel);
                    }
                    let literal = self.source[..at.offset]
                        .chars()
                        .next_back()
                        .is_some_and(|c| c.is_ascii_alphanumeric());
                    if literal {
                        s.bump();
                        continue;
                    }
                    return self.scan_directive(cursor, at);
                }
                Some(_) => {
                    s.bump();
                }
            }
        }
    }

    /// Scan the directive starting at the `@` at `at`.
    fn scan_directive(&self, cursor: Position, at: Position) -> Token {
        let mut s = Scan::at(self.source, at);
        s.bump();
        let trim_left = s.eat('~');
        let after_marker = s.pos;

        let (kind, trim_right) = match s.peek() {
            Some('*') => {
                s.bump();
                match s.rest().find("*@") {
                    Some(idx) => {
                        let body = &s.rest()[..idx + 2];
                        s.skip(body);
                        (TokenKind::Comment, s.eat('~'))
                    }
                    None => {
                        s.skip_to_end();
                        (TokenKind::Unterminated, false)
                    }
                }
            }
            Some('{') => {
                s.bump();
                (TokenKind::OpenEmit, false)
            }
            Some(ch) if is_ident_start(ch) => {
                let word_start = s.pos.offset;
                s.eat_while(is_ident_char);
                let word = &self.source[word_start..s.pos.offset];
                match TokenKind::directive(word) {
                    Some(kind) if kind.takes_header() || kind == TokenKind::FnDirective => {
                        (kind, false)
                    }
                    Some(kind) => (kind, s.eat('~')),
                    None => {
                        s = Scan::at(self.source, after_marker);
                        (TokenKind::At, false)
                    }
                }
            }
            _ => (TokenKind::Unexpected, false),
        };

        let mut token = Token::new(kind, cursor, at, s.pos, LexContext::TopLevel);
        token.trim_left = trim_left;
        token.trim_right = trim_right;
        token
    }

    // ─────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────

    fn scan_expression(&self, cursor: Position) -> Token {
        let mut s = Scan::at(self.source, cursor);
        s.eat_while(char::is_whitespace);
        let value_start = s.pos;
        let Some(ch) = s.bump() else {
            return Token::new(TokenKind::Eof, cursor, s.pos, s.pos, LexContext::Expression);
        };

        let mut trim_right = false;
        let kind = match ch {
            '0'..='9' => self.scan_number(&mut s, ch),
            '.' if s.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(&mut s, ch),
            '\'' => self.scan_single_quoted(&mut s),
            '"' => match self.scan_string_body(&mut s) {
                StringEnd::Interpolation => TokenKind::TemplateHead,
                StringEnd::Close => TokenKind::Str,
                StringEnd::Eof => TokenKind::Unterminated,
            },
            '#' => {
                s.eat_while(|c| c.is_ascii_digit() || matches!(c, '-' | 'T' | ':'));
                if s.eat('#') {
                    TokenKind::Date
                } else {
                    TokenKind::Unterminated
                }
            }
            c if is_ident_start(c) => {
                s.eat_while(is_ident_char);
                let word = &self.source[value_start.offset..s.pos.offset];
                TokenKind::keyword(word).unwrap_or(TokenKind::Ident)
            }

            // ── Punctuation ──
            '(' => TokenKind::LParen,
            ')' => {
                trim_right = s.eat('~');
                TokenKind::RParen
            }
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => {
                trim_right = s.eat('~');
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '?' => {
                if s.peek() == Some('.') && !s.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    s.bump();
                    TokenKind::QuestionDot
                } else if s.eat('?') {
                    if s.eat('=') {
                        TokenKind::QuestionQuestionEq
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else {
                    TokenKind::Question
                }
            }

            // ── Operators ──
            '=' => {
                if s.eat('>') {
                    TokenKind::Arrow
                } else if s.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '+' => {
                if s.eat('+') {
                    TokenKind::PlusPlus
                } else if s.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if s.eat('-') {
                    TokenKind::MinusMinus
                } else if s.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if s.eat('*') {
                    TokenKind::StarStar
                } else if s.eat('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if s.eat('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if s.eat('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '!' => {
                if s.eat('=') {
                    TokenKind::BangEq
                } else {
                    TokenKind::Bang
                }
            }
            '~' => TokenKind::Tilde,
            '<' => {
                if s.eat('<') {
                    TokenKind::Shl
                } else if s.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if s.eat('>') {
                    if s.eat('>') {
                        TokenKind::UShr
                    } else {
                        TokenKind::Shr
                    }
                } else if s.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if s.eat('&') {
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if s.eat('|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => TokenKind::Caret,
            _ => TokenKind::Unexpected,
        };

        let mut token = Token::new(kind, cursor, value_start, s.pos, LexContext::Expression);
        token.trim_right = trim_right;
        token
    }

    /// Scan the rest of a number whose first character was `first`.
    fn scan_number(&self, s: &mut Scan<'_>, first: char) -> TokenKind {
        if first == '0' && matches!(s.peek(), Some('x' | 'X')) {
            s.bump();
            s.eat_while(|c| c.is_ascii_hexdigit());
            return TokenKind::Number;
        }
        s.eat_while(|c| c.is_ascii_digit());
        if first != '.' && s.peek() == Some('.') && s.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            s.bump();
            s.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(s.peek(), Some('e' | 'E')) {
            let signed = matches!(s.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if s.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                s.bump();
                if signed {
                    s.bump();
                }
                s.eat_while(|c| c.is_ascii_digit());
            }
        }
        TokenKind::Number
    }

    fn scan_single_quoted(&self, s: &mut Scan<'_>) -> TokenKind {
        loop {
            match s.bump() {
                None => return TokenKind::Unterminated,
                Some('\\') => {
                    s.bump();
                }
                Some('\'') => return TokenKind::Str,
                Some(_) => {}
            }
        }
    }

    /// Scan double-quoted string text up to and including `${` or `"`.
    fn scan_string_body(&self, s: &mut Scan<'_>) -> StringEnd {
        loop {
            match s.bump() {
                None => return StringEnd::Eof,
                Some('\\') => {
                    s.bump();
                }
                Some('"') => return StringEnd::Close,
                Some('$') if s.peek() == Some('{') => {
                    s.bump();
                    return StringEnd::Interpolation;
                }
                Some(_) => {}
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Inline emissions
    // ─────────────────────────────────────────────────────────────

    fn scan_inline(&self, cursor: Position) -> Token {
        let mut s = Scan::at(self.source, cursor);
        let kind = match s.bump() {
            None => TokenKind::Eof,
            Some(c) if is_ident_start(c) => {
                s.eat_while(is_ident_char);
                TokenKind::Ident
            }
            Some('.') if s.peek().is_some_and(is_ident_start) => TokenKind::Dot,
            Some('(') => TokenKind::LParen,
            Some('[') => TokenKind::LBracket,
            Some(_) => TokenKind::Unexpected,
        };
        Token::new(kind, cursor, cursor, s.pos, LexContext::Inline)
    }

    // ─────────────────────────────────────────────────────────────
    // String interpolation
    // ─────────────────────────────────────────────────────────────

    fn scan_interpolation(&self, cursor: Position) -> Token {
        let mut s = Scan::at(self.source, cursor);
        s.eat_while(char::is_whitespace);
        let value_start = s.pos;
        let kind = match s.bump() {
            None => TokenKind::Eof,
            Some('}') => match self.scan_string_body(&mut s) {
                StringEnd::Interpolation => TokenKind::TemplateMiddle,
                StringEnd::Close => TokenKind::TemplateTail,
                StringEnd::Eof => TokenKind::Unterminated,
            },
            Some(_) => TokenKind::Unexpected,
        };
        Token::new(kind, cursor, value_start, s.pos, LexContext::StringInterpolation)
    }

    // ─────────────────────────────────────────────────────────────
    // Regex literals
    // ─────────────────────────────────────────────────────────────

    fn scan_regex(&self, cursor: Position) -> Token {
        let mut s = Scan::at(self.source, cursor);
        let kind = match s.bump() {
            None => TokenKind::Eof,
            Some('/') => {
                let mut in_class = false;
                loop {
                    match s.peek() {
                        None | Some('\n') => break TokenKind::Unterminated,
                        Some('\\') => {
                            s.bump();
                            if s.peek() != Some('\n') {
                                s.bump();
                            }
                        }
                        Some('[') => {
                            in_class = true;
                            s.bump();
                        }
                        Some(']') => {
                            in_class = false;
                            s.bump();
                        }
                        Some('/') if !in_class => {
                            s.bump();
                            s.eat_while(|c| c.is_ascii_alphabetic());
                            break TokenKind::Regex;
                        }
                        Some(_) => {
                            s.bump();
                        }
                    }
                }
            }
            Some(_) => TokenKind::Unexpected,
        };
        Token::new(kind, cursor, cursor, s.pos, LexContext::Regex)
    }

    // ─────────────────────────────────────────────────────────────
    // Raw sections
    // ─────────────────────────────────────────────────────────────

    /// Scan verbatim text up to the `@end` that closes a `@raw` section.
    fn scan_raw(&self, cursor: Position) -> Token {
        let rest = &self.source[cursor.offset..];
        let mut search = 0;
        while let Some(idx) = rest[search..].find('@') {
            let at = search + idx;
            let after_at = &rest[at + 1..];
            let trim_left = after_at.starts_with('~');
            let word = if trim_left { &after_at[1..] } else { after_at };
            let closes = word.starts_with("end")
                && !word[3..].chars().next().is_some_and(is_ident_char);
            if closes {
                let value_start = cursor.advance_str(&rest[..at]);
                let mut s = Scan::at(self.source, value_start);
                s.skip(if trim_left { "@~end" } else { "@end" });
                let trim_right = s.eat('~');
                let mut token = Token::new(TokenKind::End, cursor, value_start, s.pos, LexContext::Raw);
                token.trim_left = trim_left;
                token.trim_right = trim_right;
                return token;
            }
            search = at + 1;
        }
        let end = cursor.advance_str(rest);
        Token::new(TokenKind::Eof, cursor, end, end, LexContext::Raw)
    }
}
