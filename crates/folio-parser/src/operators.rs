//! Operator tables for the Pratt expression parser.
//!
//! Binding powers (highest binds tightest):
//! 200. `.` `?.` `()` `[]`, and the callee of `new`
//! 180. postfix `++` `--`
//! 170. prefix `-` `+` `!` `~` `++` `--`
//! 160. `**` (right-associative)
//! 150. `*` `/` `%`
//! 140. `+` `-`
//! 130. `<<` `>>` `>>>`
//! 120. `<` `>` `<=` `>=` `in`
//! 110. `==` `!=`
//! 100. `&`, 90. `^`, 80. `|`
//!  70. `&&`, 60. `||`, 50. `??`
//!  40. `?:` (right-associative)
//!  30. `=` and compound assignment (right-associative)
//!  20. `yield`

use std::collections::HashMap;
use std::sync::OnceLock;

use folio_lexer::{LexContext, Token, TokenKind};
use folio_types::ast::Expr;

use crate::parse_expr as rules;
use crate::parser::Parser;

/// Prefix parse function: receives the consumed token and the entry's rbp.
pub type NudFn = fn(&mut Parser<'_>, Token, u8) -> Expr;

/// Infix/postfix parse function: receives the left operand, the consumed
/// operator token and the entry's rbp.
pub type LedFn = fn(&mut Parser<'_>, Expr, Token, u8) -> Expr;

/// A prefix table entry.
#[derive(Clone, Copy)]
pub struct Nud {
    pub parse: NudFn,
    pub rbp: u8,
}

/// An infix/postfix table entry.
#[derive(Clone, Copy)]
pub struct Led {
    pub parse: LedFn,
    pub lbp: u8,
    pub rbp: u8,
}

/// Nud and Led entries per `(LexContext, TokenKind)`.
///
/// Built once and never mutated while parsing.
#[derive(Default)]
pub struct OperatorTable {
    nuds: HashMap<(LexContext, TokenKind), Nud>,
    leds: HashMap<(LexContext, TokenKind), Led>,
}

impl OperatorTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_nud(&mut self, context: LexContext, kind: TokenKind, parse: NudFn, rbp: u8) {
        self.nuds.insert((context, kind), Nud { parse, rbp });
    }

    pub fn add_led(
        &mut self,
        context: LexContext,
        kind: TokenKind,
        parse: LedFn,
        lbp: u8,
        rbp: u8,
    ) {
        self.leds.insert((context, kind), Led { parse, lbp, rbp });
    }

    pub fn nud(&self, context: LexContext, kind: TokenKind) -> Option<Nud> {
        self.nuds.get(&(context, kind)).copied()
    }

    pub fn led(&self, context: LexContext, kind: TokenKind) -> Option<Led> {
        self.leds.get(&(context, kind)).copied()
    }

    /// The standard Folio grammar.
    pub fn standard() -> Self {
        use LexContext::{Expression, Inline};
        use TokenKind as K;

        let mut t = Self::empty();

        // ── Inline: identifier plus accessor chain ──
        t.add_nud(Inline, K::Ident, rules::identifier, 0);
        t.add_led(Inline, K::Dot, rules::member, 200, 200);
        t.add_led(Inline, K::LParen, rules::call, 200, 0);
        t.add_led(Inline, K::LBracket, rules::index, 200, 0);

        // ── Expression: operands ──
        t.add_nud(Expression, K::Number, rules::number, 0);
        t.add_nud(Expression, K::Str, rules::string, 0);
        t.add_nud(Expression, K::TemplateHead, rules::template, 0);
        t.add_nud(Expression, K::Date, rules::date, 0);
        t.add_nud(Expression, K::Slash, rules::regex, 0);
        t.add_nud(Expression, K::SlashEq, rules::regex, 0);
        t.add_nud(Expression, K::Unterminated, rules::unterminated, 0);
        for kind in [K::True, K::False, K::Null] {
            t.add_nud(Expression, kind, rules::literal, 0);
        }
        t.add_nud(Expression, K::Ident, rules::identifier, 0);
        t.add_nud(Expression, K::LParen, rules::group, 0);
        t.add_nud(Expression, K::LBracket, rules::array, 0);
        t.add_nud(Expression, K::LBrace, rules::object, 0);
        t.add_nud(Expression, K::Fn, rules::lambda, 0);
        t.add_nud(Expression, K::New, rules::new_expr, 200);
        t.add_nud(Expression, K::Yield, rules::yield_expr, 20);

        // ── Expression: prefix operators ──
        for kind in [K::Minus, K::Plus, K::Bang, K::Tilde] {
            t.add_nud(Expression, kind, rules::prefix_unary, 170);
        }
        for kind in [K::PlusPlus, K::MinusMinus] {
            t.add_nud(Expression, kind, rules::prefix_update, 170);
        }

        // ── Expression: accessors and postfix ──
        t.add_led(Expression, K::Dot, rules::member, 200, 200);
        t.add_led(Expression, K::QuestionDot, rules::member, 200, 200);
        t.add_led(Expression, K::LParen, rules::call, 200, 0);
        t.add_led(Expression, K::LBracket, rules::index, 200, 0);
        for kind in [K::PlusPlus, K::MinusMinus] {
            t.add_led(Expression, kind, rules::postfix_update, 180, 180);
        }

        // ── Expression: binary operators ──
        t.add_led(Expression, K::StarStar, rules::binary, 160, 159);
        let left_assoc: [(&[TokenKind], u8); 11] = [
            (&[K::Star, K::Slash, K::Percent], 150),
            (&[K::Plus, K::Minus], 140),
            (&[K::Shl, K::Shr, K::UShr], 130),
            (&[K::Less, K::Greater, K::LessEq, K::GreaterEq, K::In], 120),
            (&[K::EqEq, K::BangEq], 110),
            (&[K::Amp], 100),
            (&[K::Caret], 90),
            (&[K::Pipe], 80),
            (&[K::AmpAmp], 70),
            (&[K::PipePipe], 60),
            (&[K::QuestionQuestion], 50),
        ];
        for (kinds, bp) in left_assoc {
            for kind in kinds {
                t.add_led(Expression, *kind, rules::binary, bp, bp);
            }
        }

        // ── Expression: conditional and assignment ──
        t.add_led(Expression, K::Question, rules::conditional, 40, 39);
        for kind in [
            K::Eq,
            K::PlusEq,
            K::MinusEq,
            K::StarEq,
            K::SlashEq,
            K::PercentEq,
            K::QuestionQuestionEq,
        ] {
            t.add_led(Expression, kind, rules::assign, 30, 29);
        }

        t
    }

    /// The process-wide standard table.
    pub fn shared() -> &'static OperatorTable {
        static TABLE: OnceLock<OperatorTable> = OnceLock::new();
        TABLE.get_or_init(OperatorTable::standard)
    }
}
