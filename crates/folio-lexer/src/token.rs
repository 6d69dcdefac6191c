//! Token types for the Folio lexer.
//!
//! A [`Token`] is an immutable description of one lexed unit. It does not own
//! any text: the three views [`Token::prev_text`], [`Token::value`] and
//! [`Token::all_text`] slice the source the token was lexed from.

use folio_types::{Position, Range};
use std::fmt;

/// Directive names recognised after `@` in top-level text.
pub const DIRECTIVES: &[(&str, TokenKind)] = &[
    ("if", TokenKind::If),
    ("elif", TokenKind::Elif),
    ("else", TokenKind::Else),
    ("end", TokenKind::End),
    ("for", TokenKind::For),
    ("while", TokenKind::While),
    ("switch", TokenKind::Switch),
    ("case", TokenKind::Case),
    ("default", TokenKind::Default),
    ("block", TokenKind::Block),
    ("super", TokenKind::Super),
    ("extend", TokenKind::Extend),
    ("raw", TokenKind::Raw),
    ("filter", TokenKind::Filter),
    ("let", TokenKind::Let),
    ("fn", TokenKind::FnDirective),
    ("lang", TokenKind::Lang),
    ("repeat", TokenKind::Repeat),
    ("postinit", TokenKind::Postinit),
];

/// Reserved words of the expression grammar.
pub const EXPRESSION_KEYWORDS: &[(&str, TokenKind)] = &[
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("null", TokenKind::Null),
    ("in", TokenKind::In),
    ("new", TokenKind::New),
    ("yield", TokenKind::Yield),
    ("fn", TokenKind::Fn),
];

// ─────────────────────────────────────────────────────────────────────
// LexContext
// ─────────────────────────────────────────────────────────────────────

/// The lexical context a token is classified in.
///
/// The same input position lexes differently depending on the context the
/// parser requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexContext {
    /// Literal text up to the next directive.
    TopLevel,
    /// The full expression grammar.
    Expression,
    /// `@name.chain` emissions: no whitespace, only identifiers and accessors.
    Inline,
    /// The `}` closing a `${…}` and the string text after it.
    StringInterpolation,
    /// A `/pattern/flags` literal.
    Regex,
    /// Verbatim text up to the next `@end`.
    Raw,
}

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the Folio lexer.
///
/// `start ≤ value_start ≤ end`. Text in `[start, value_start)` precedes the
/// token: skipped whitespace in expressions, literal text at top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub value_start: Position,
    pub end: Position,
    pub context: LexContext,
    /// `@~`: strip whitespace before this directive.
    pub trim_left: bool,
    /// A trailing `~`: strip whitespace after this directive.
    pub trim_right: bool,
}

impl Token {
    /// Create a token without trim flags.
    pub fn new(
        kind: TokenKind,
        start: Position,
        value_start: Position,
        end: Position,
        context: LexContext,
    ) -> Self {
        Self {
            kind,
            start,
            value_start,
            end,
            context,
            trim_left: false,
            trim_right: false,
        }
    }

    /// Text between the cursor and the token's value.
    pub fn prev_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start.offset..self.value_start.offset]
    }

    /// The token's own text.
    pub fn value<'a>(&self, source: &'a str) -> &'a str {
        &source[self.value_start.offset..self.end.offset]
    }

    /// Everything the token consumed.
    pub fn all_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start.offset..self.end.offset]
    }

    /// Source range of the value.
    pub fn range(&self) -> Range {
        Range::new(self.value_start, self.end)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

/// Every token kind in the Folio language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ── Special ──────────────────────────────────────────────

    /// End of input. Terminal: lexing again returns another `Eof`.
    Eof,
    /// Input no rule of the active context matches.
    Unexpected,
    /// A string, date, regex, comment or raw section that runs off the end.
    Unterminated,

    // ── Top-level text ───────────────────────────────────────

    /// `@@`, a literal `@`.
    Escape,
    /// `@* … *@`
    Comment,
    /// `@{`
    OpenEmit,
    /// `@` starting an inline `@name.chain` emission.
    At,

    // ── Directives ───────────────────────────────────────────

    If,
    Elif,
    Else,
    End,
    For,
    While,
    Switch,
    Case,
    Default,
    Block,
    Super,
    Extend,
    Raw,
    Filter,
    Let,
    /// `@fn`
    FnDirective,
    Lang,
    Repeat,
    Postinit,

    // ── Literals ─────────────────────────────────────────────

    Number,
    /// A string without interpolation: `'a'` or `"a"`.
    Str,
    /// `"text${`
    TemplateHead,
    /// `}text${`
    TemplateMiddle,
    /// `}text"`
    TemplateTail,
    /// `#2024-01-15#`
    Date,
    /// `/pattern/flags`
    Regex,
    Ident,

    // ── Keywords ─────────────────────────────────────────────

    True,
    False,
    Null,
    In,
    New,
    Yield,
    Fn,

    // ── Punctuation ──────────────────────────────────────────

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    QuestionDot,
    Question,
    Arrow,

    // ── Operators ────────────────────────────────────────────

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    Shl,
    Shr,
    UShr,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    BangEq,
    Amp,
    Caret,
    Pipe,
    AmpAmp,
    PipePipe,
    QuestionQuestion,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    QuestionQuestionEq,
}

impl TokenKind {
    /// Look up a directive name.
    pub fn directive(word: &str) -> Option<TokenKind> {
        DIRECTIVES
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, kind)| *kind)
    }

    /// Look up an expression keyword.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        EXPRESSION_KEYWORDS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, kind)| *kind)
    }

    /// Returns `true` for `@` directives.
    pub fn is_directive(self) -> bool {
        DIRECTIVES.iter().any(|(_, kind)| *kind == self)
    }

    /// Returns `true` for tokens spelled as a word: identifiers and keywords.
    ///
    /// Any word is accepted as a property name after `.`.
    pub fn is_word(self) -> bool {
        self == TokenKind::Ident || EXPRESSION_KEYWORDS.iter().any(|(_, kind)| *kind == self)
    }

    /// Directives followed by a parenthesized header.
    pub fn takes_header(self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Elif
                | TokenKind::For
                | TokenKind::While
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Block
                | TokenKind::Extend
                | TokenKind::Filter
                | TokenKind::Let
                | TokenKind::Lang
                | TokenKind::Repeat
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((name, _)) = DIRECTIVES.iter().find(|(_, kind)| kind == self) {
            return write!(f, "@{name}");
        }
        if let Some((name, _)) = EXPRESSION_KEYWORDS.iter().find(|(_, kind)| kind == self) {
            return write!(f, "{name}");
        }
        let s = match self {
            TokenKind::Eof => "end of input",
            TokenKind::Unexpected => "unexpected input",
            TokenKind::Unterminated => "unterminated literal",
            TokenKind::Escape => "@@",
            TokenKind::Comment => "comment",
            TokenKind::OpenEmit => "@{",
            TokenKind::At => "@",
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::TemplateHead | TokenKind::TemplateMiddle | TokenKind::TemplateTail => {
                "string"
            }
            TokenKind::Date => "date",
            TokenKind::Regex => "regex",
            TokenKind::Ident => "identifier",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::QuestionDot => "?.",
            TokenKind::Question => "?",
            TokenKind::Arrow => "=>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::UShr => ">>>",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Amp => "&",
            TokenKind::Caret => "^",
            TokenKind::Pipe => "|",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::QuestionQuestion => "??",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::QuestionQuestionEq => "??=",
            // Directives and keywords were handled above.
            _ => "token",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_lookup() {
        assert_eq!(TokenKind::directive("if"), Some(TokenKind::If));
        assert_eq!(TokenKind::directive("fn"), Some(TokenKind::FnDirective));
        assert_eq!(TokenKind::directive("title"), None);
    }

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("null"), Some(TokenKind::Null));
        assert_eq!(TokenKind::keyword("fn"), Some(TokenKind::Fn));
        assert_eq!(TokenKind::keyword("If"), None);
    }

    #[test]
    fn test_is_word() {
        assert!(TokenKind::Ident.is_word());
        assert!(TokenKind::In.is_word());
        assert!(!TokenKind::Dot.is_word());
    }

    #[test]
    fn test_display() {
        assert_eq!(TokenKind::End.to_string(), "@end");
        assert_eq!(TokenKind::Yield.to_string(), "yield");
        assert_eq!(TokenKind::QuestionQuestionEq.to_string(), "??=");
        assert_eq!(TokenKind::Eof.to_string(), "end of input");
    }

    #[test]
    fn test_token_views() {
        let src = "ab@if";
        let tok = Token::new(
            TokenKind::If,
            Position::START,
            Position::new(1, 3, 2),
            Position::new(1, 6, 5),
            LexContext::TopLevel,
        );
        assert_eq!(tok.prev_text(src), "ab");
        assert_eq!(tok.value(src), "@if");
        assert_eq!(tok.all_text(src), "ab@if");
    }
}
