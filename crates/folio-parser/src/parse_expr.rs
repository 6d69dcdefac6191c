//! Pratt expression parsing: the driver loop and every Nud/Led rule.
//!
//! Rules never fail outright. A broken operand is reported and replaced by a
//! placeholder so parsing can continue; a template with errors is never
//! compiled, so placeholders never run.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use folio_lexer::{LexContext, Token, TokenKind};
use folio_types::ast::*;
use folio_types::{ErrorCode, Range};

use crate::parser::{Parser, MAX_EXPRESSION_DEPTH};

/// Regex flags accepted after the closing `/`.
const REGEX_FLAGS: &str = "gimsuy";

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse an expression whose operators bind tighter than `min_bp`.
    ///
    /// Returns `None`, with the cursor unmoved, when the next token has no
    /// Nud in the active context.
    pub(crate) fn expression(&mut self, min_bp: u8) -> Option<Expr> {
        let start = self.cursor;
        let token = self.lex(self.context);
        let Some(nud) = self.table.nud(self.context, token.kind) else {
            self.restore(start);
            return None;
        };

        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPRESSION_DEPTH {
            self.error_at(
                ErrorCode::NESTING_LIMIT_EXCEEDED,
                format!("expressions nest deeper than {MAX_EXPRESSION_DEPTH} levels"),
                token.range(),
            );
            self.expr_depth -= 1;
            return Some(Self::placeholder(token.range()));
        }

        let mut left = (nud.parse)(self, token, nud.rbp);
        loop {
            if self.too_many_errors() {
                break;
            }
            let before = self.cursor;
            let token = self.lex(self.context);
            match self.table.led(self.context, token.kind) {
                Some(led) if led.lbp > min_bp => {
                    left = (led.parse)(self, left, token, led.rbp);
                }
                _ => {
                    self.restore(before);
                    break;
                }
            }
        }

        self.expr_depth -= 1;
        Some(left)
    }

    /// Parse comma-separated expressions up to the token closing `opener`.
    fn expression_list(&mut self, close: TokenKind, opener: &Token) -> Vec<Expr> {
        self.with_context(LexContext::Expression, |p| {
            let mut items = Vec::new();
            loop {
                if p.peek(LexContext::Expression).kind == close {
                    p.lex(LexContext::Expression);
                    break;
                }
                match p.expression(0) {
                    Some(expr) => items.push(expr),
                    None => {
                        let token = p.peek(LexContext::Expression);
                        p.error_at(
                            ErrorCode::EXPECTED_EXPRESSION,
                            format!("expected expression, found {}", p.describe(&token)),
                            token.range(),
                        );
                        break;
                    }
                }
                let sep = p.lex(LexContext::Expression);
                if sep.kind == TokenKind::Comma {
                    continue;
                }
                if sep.kind != close {
                    p.restore(sep.start);
                    p.expect_closing(close, opener);
                }
                break;
            }
            items
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Literal helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Decode backslash escapes in string literal text.
pub(crate) fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let rest = chars.as_str();
                let decoded = rest
                    .strip_prefix('{')
                    .and_then(|r| r.find('}').map(|end| &r[..end]))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok().map(|c| (hex.len(), c)))
                    .and_then(|(len, c)| char::from_u32(c).map(|c| (len, c)));
                match decoded {
                    Some((len, c)) => {
                        out.push(c);
                        chars = rest[len + 2..].chars();
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_number(text: &str) -> Option<f64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok().map(|n| n as f64),
        None => text.parse().ok(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

fn merged(left: &Expr, right: &Expr) -> Range {
    left.range.merge(right.range)
}

// ══════════════════════════════════════════════════════════════════════════════
// Nud rules
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn literal(_p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let kind = match token.kind {
        TokenKind::True => ExprKind::Bool(true),
        TokenKind::False => ExprKind::Bool(false),
        _ => ExprKind::Null,
    };
    Expr::new(kind, token.range())
}

pub(crate) fn number(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let text = p.text(&token);
    match parse_number(text) {
        Some(n) => Expr::new(ExprKind::Number(n), token.range()),
        None => {
            p.error_at(
                ErrorCode::INVALID_LITERAL,
                format!("invalid number literal `{text}`"),
                token.range(),
            );
            Parser::placeholder(token.range())
        }
    }
}

pub(crate) fn string(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let text = p.text(&token);
    let body = &text[1..text.len() - 1];
    Expr::new(ExprKind::Str(unescape(body)), token.range())
}

/// `"head${expr}middle${expr}tail"`
pub(crate) fn template(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let start = token.value_start;
    let head = p.text(&token);
    let mut parts = vec![TemplatePart::Literal(unescape(&head[1..head.len() - 2]))];
    loop {
        let expr = p.with_context(LexContext::Expression, |p| p.require_expression(0));
        parts.push(TemplatePart::Expr(expr));

        let next = p.lex(LexContext::StringInterpolation);
        let text = p.text(&next);
        match next.kind {
            TokenKind::TemplateMiddle => {
                parts.push(TemplatePart::Literal(unescape(&text[1..text.len() - 2])));
            }
            TokenKind::TemplateTail => {
                parts.push(TemplatePart::Literal(unescape(&text[1..text.len() - 1])));
                break;
            }
            TokenKind::Unterminated => {
                p.error_at(
                    ErrorCode::UNTERMINATED_LITERAL,
                    "unterminated string literal",
                    Range::new(start, next.end),
                );
                break;
            }
            _ => {
                p.restore(next.start);
                p.error_with_suggestion(
                    ErrorCode::UNCLOSED_DELIMITER,
                    format!("expected `}}` to close `${{`, found {}", p.describe(&next)),
                    next.range(),
                    "close the interpolation with `}`",
                );
                break;
            }
        }
    }
    parts.retain(|part| !matches!(part, TemplatePart::Literal(text) if text.is_empty()));
    Expr::new(ExprKind::Template(parts), p.range_from(start))
}

/// `#2024-01-15#` / `#2024-01-15T10:30:00#`
pub(crate) fn date(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let text = p.text(&token);
    let inner = &text[1..text.len() - 1];
    match parse_date(inner) {
        Some(dt) => Expr::new(
            ExprKind::Date(DateLiteral {
                year: dt.year(),
                month: dt.month(),
                day: dt.day(),
                hour: dt.hour(),
                minute: dt.minute(),
                second: dt.second(),
            }),
            token.range(),
        ),
        None => {
            p.error_with_suggestion(
                ErrorCode::INVALID_LITERAL,
                format!("invalid date literal `{text}`"),
                token.range(),
                "use #YYYY-MM-DD# or #YYYY-MM-DDTHH:MM:SS#",
            );
            Parser::placeholder(token.range())
        }
    }
}

/// A `/` in operand position starts a regex literal: re-lex from the slash.
pub(crate) fn regex(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    p.restore(token.value_start);
    let lit = p.lex(LexContext::Regex);
    if lit.kind != TokenKind::Regex {
        p.error_at(
            ErrorCode::UNTERMINATED_LITERAL,
            "unterminated regex literal",
            lit.range(),
        );
        return Parser::placeholder(lit.range());
    }

    let text = p.text(&lit);
    let close = text.rfind('/').unwrap_or(0);
    let pattern = &text[1..close];
    let flags = &text[close + 1..];

    let mut seen = String::new();
    for flag in flags.chars() {
        if !REGEX_FLAGS.contains(flag) || seen.contains(flag) {
            p.error_at(
                ErrorCode::INVALID_LITERAL,
                format!("invalid regex flag `{flag}`"),
                lit.range(),
            );
            return Parser::placeholder(lit.range());
        }
        seen.push(flag);
    }
    if let Err(err) = regex::Regex::new(pattern) {
        p.error_at(
            ErrorCode::INVALID_LITERAL,
            format!("invalid regex literal: {err}"),
            lit.range(),
        );
        return Parser::placeholder(lit.range());
    }

    Expr::new(
        ExprKind::Regex {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
        },
        lit.range(),
    )
}

pub(crate) fn unterminated(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let text = p.text(&token);
    let what = match text.chars().next() {
        Some('#') => "date",
        _ => "string",
    };
    p.error_at(
        ErrorCode::UNTERMINATED_LITERAL,
        format!("unterminated {what} literal"),
        token.range(),
    );
    Parser::placeholder(token.range())
}

pub(crate) fn identifier(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let name = p.text(&token).to_string();
    Expr::new(ExprKind::Ident(name), token.range())
}

/// `( expr )`
pub(crate) fn group(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let mut inner = p.with_context(LexContext::Expression, |p| p.require_expression(0));
    p.expect_closing(TokenKind::RParen, &token);
    inner.range = p.range_from(token.value_start);
    inner
}

/// `[a, b, …]`
pub(crate) fn array(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let items = p.expression_list(TokenKind::RBracket, &token);
    Expr::new(ExprKind::Array(items), p.range_from(token.value_start))
}

/// `{key: value, shorthand, "quoted": value}`
pub(crate) fn object(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let mut entries = Vec::new();
    loop {
        let key = p.lex(LexContext::Expression);
        let name = match key.kind {
            TokenKind::RBrace => break,
            TokenKind::Str => unescape(&p.text(&key)[1..p.text(&key).len() - 1]),
            TokenKind::Number => p.text(&key).to_string(),
            kind if kind.is_word() => p.text(&key).to_string(),
            _ => {
                p.restore(key.start);
                p.expect_closing(TokenKind::RBrace, &token);
                break;
            }
        };

        let value = if p.peek(LexContext::Expression).kind == TokenKind::Colon {
            p.lex(LexContext::Expression);
            p.with_context(LexContext::Expression, |p| p.require_expression(0))
        } else if key.kind == TokenKind::Ident {
            Expr::new(ExprKind::Ident(name.clone()), key.range())
        } else {
            p.expect(TokenKind::Colon);
            Parser::placeholder(key.range())
        };
        entries.push((name, value));

        let sep = p.lex(LexContext::Expression);
        match sep.kind {
            TokenKind::Comma => continue,
            TokenKind::RBrace => break,
            _ => {
                p.restore(sep.start);
                p.expect_closing(TokenKind::RBrace, &token);
                break;
            }
        }
    }
    Expr::new(ExprKind::Object(entries), p.range_from(token.value_start))
}

/// `fn(a, b) => body`
pub(crate) fn lambda(p: &mut Parser<'_>, token: Token, _rbp: u8) -> Expr {
    let mut params = Vec::new();
    if let Some(open) = p.expect(TokenKind::LParen) {
        loop {
            let next = p.lex(LexContext::Expression);
            match next.kind {
                TokenKind::RParen => break,
                TokenKind::Ident => params.push(p.text(&next).to_string()),
                _ => {
                    p.restore(next.start);
                    p.expect_closing(TokenKind::RParen, &open);
                    break;
                }
            }
            let sep = p.lex(LexContext::Expression);
            match sep.kind {
                TokenKind::Comma => {}
                TokenKind::RParen => break,
                _ => {
                    p.restore(sep.start);
                    p.expect_closing(TokenKind::RParen, &open);
                    break;
                }
            }
        }
    }
    p.expect(TokenKind::Arrow);
    let body = p.with_context(LexContext::Expression, |p| p.require_expression(0));
    Expr::new(
        ExprKind::Lambda {
            params,
            body: Box::new(body),
        },
        p.range_from(token.value_start),
    )
}

/// `new Callee.Path(args)`
pub(crate) fn new_expr(p: &mut Parser<'_>, token: Token, rbp: u8) -> Expr {
    let mut callee = p.require_expression(rbp);
    while p.peek(LexContext::Expression).kind == TokenKind::Dot {
        p.lex(LexContext::Expression);
        let name = p.lex(LexContext::Expression);
        if !name.kind.is_word() {
            p.restore(name.start);
            p.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected property name after `.`, found {}", p.describe(&name)),
                name.range(),
            );
            break;
        }
        let range = p.range_from(callee.range.start);
        callee = Expr::new(
            ExprKind::Member {
                object: Box::new(callee),
                property: p.text(&name).to_string(),
                optional: false,
            },
            range,
        );
    }
    let args = if p.peek(LexContext::Expression).kind == TokenKind::LParen {
        let open = p.lex(LexContext::Expression);
        p.expression_list(TokenKind::RParen, &open)
    } else {
        Vec::new()
    };
    Expr::new(
        ExprKind::New {
            callee: Box::new(callee),
            args,
        },
        p.range_from(token.value_start),
    )
}

/// `yield [expr]`
pub(crate) fn yield_expr(p: &mut Parser<'_>, token: Token, rbp: u8) -> Expr {
    let value = p.expression(rbp).map(Box::new);
    Expr::new(ExprKind::Yield(value), p.range_from(token.value_start))
}

pub(crate) fn prefix_unary(p: &mut Parser<'_>, token: Token, rbp: u8) -> Expr {
    let op = match token.kind {
        TokenKind::Minus => UnaryOp::Neg,
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Bang => UnaryOp::Not,
        _ => UnaryOp::BitNot,
    };
    let operand = p.require_expression(rbp);
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        p.range_from(token.value_start),
    )
}

pub(crate) fn prefix_update(p: &mut Parser<'_>, token: Token, rbp: u8) -> Expr {
    let op = update_op(token.kind);
    let target = p.require_expression(rbp);
    check_assignable(p, &target, &format!("`{op}`"));
    Expr::new(
        ExprKind::Update {
            op,
            prefix: true,
            target: Box::new(target),
        },
        p.range_from(token.value_start),
    )
}

fn update_op(kind: TokenKind) -> UpdateOp {
    if kind == TokenKind::PlusPlus {
        UpdateOp::Increment
    } else {
        UpdateOp::Decrement
    }
}

fn check_assignable(p: &mut Parser<'_>, target: &Expr, operator: &str) {
    if !target.is_assignable() {
        p.error_at(
            ErrorCode::INVALID_ASSIGNMENT_TARGET,
            format!("invalid target for {operator}"),
            target.range,
        );
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Led rules
// ══════════════════════════════════════════════════════════════════════════════

/// `left.name` / `left?.name`: the name is a property, never a binding.
pub(crate) fn member(p: &mut Parser<'_>, left: Expr, token: Token, _rbp: u8) -> Expr {
    let name = p.lex(p.context);
    if !name.kind.is_word() {
        p.restore(name.start);
        p.error_at(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("expected property name after `.`, found {}", p.describe(&name)),
            name.range(),
        );
        return left;
    }
    let range = p.range_from(left.range.start);
    Expr::new(
        ExprKind::Member {
            object: Box::new(left),
            property: p.text(&name).to_string(),
            optional: token.kind == TokenKind::QuestionDot,
        },
        range,
    )
}

/// `left(args)`
pub(crate) fn call(p: &mut Parser<'_>, left: Expr, token: Token, _rbp: u8) -> Expr {
    let args = p.expression_list(TokenKind::RParen, &token);
    let range = p.range_from(left.range.start);
    Expr::new(
        ExprKind::Call {
            callee: Box::new(left),
            args,
        },
        range,
    )
}

/// `left[index]`
pub(crate) fn index(p: &mut Parser<'_>, left: Expr, token: Token, _rbp: u8) -> Expr {
    let index = p.with_context(LexContext::Expression, |p| {
        let index = p.require_expression(0);
        p.expect_closing(TokenKind::RBracket, &token);
        index
    });
    let range = p.range_from(left.range.start);
    Expr::new(
        ExprKind::Index {
            object: Box::new(left),
            index: Box::new(index),
        },
        range,
    )
}

pub(crate) fn postfix_update(p: &mut Parser<'_>, left: Expr, token: Token, _rbp: u8) -> Expr {
    let op = update_op(token.kind);
    check_assignable(p, &left, &format!("`{op}`"));
    let range = p.range_from(left.range.start);
    Expr::new(
        ExprKind::Update {
            op,
            prefix: false,
            target: Box::new(left),
        },
        range,
    )
}

pub(crate) fn binary(p: &mut Parser<'_>, left: Expr, token: Token, rbp: u8) -> Expr {
    let right = p.require_expression(rbp);
    let range = merged(&left, &right);
    let (left, right) = (Box::new(left), Box::new(right));
    let logical = match token.kind {
        TokenKind::AmpAmp => Some(LogicalOp::And),
        TokenKind::PipePipe => Some(LogicalOp::Or),
        TokenKind::QuestionQuestion => Some(LogicalOp::Coalesce),
        _ => None,
    };
    if let Some(op) = logical {
        return Expr::new(ExprKind::Logical { op, left, right }, range);
    }
    let op = match token.kind {
        TokenKind::StarStar => BinOp::Pow,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Rem,
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Shl => BinOp::Shl,
        TokenKind::Shr => BinOp::Shr,
        TokenKind::UShr => BinOp::UShr,
        TokenKind::Less => BinOp::Less,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::LessEq => BinOp::LessEq,
        TokenKind::GreaterEq => BinOp::GreaterEq,
        TokenKind::In => BinOp::In,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::BangEq => BinOp::NotEq,
        TokenKind::Amp => BinOp::BitAnd,
        TokenKind::Caret => BinOp::BitXor,
        _ => BinOp::BitOr,
    };
    Expr::new(ExprKind::Binary { op, left, right }, range)
}

/// `test ? then : otherwise`
pub(crate) fn conditional(p: &mut Parser<'_>, test: Expr, _token: Token, rbp: u8) -> Expr {
    let then = p.require_expression(0);
    p.expect(TokenKind::Colon);
    let otherwise = p.require_expression(rbp);
    let range = merged(&test, &otherwise);
    Expr::new(
        ExprKind::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        range,
    )
}

pub(crate) fn assign(p: &mut Parser<'_>, target: Expr, token: Token, rbp: u8) -> Expr {
    let op = match token.kind {
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        TokenKind::PercentEq => AssignOp::Rem,
        TokenKind::QuestionQuestionEq => AssignOp::Coalesce,
        _ => AssignOp::Assign,
    };
    check_assignable(p, &target, &format!("`{op}`"));
    let value = p.require_expression(rbp);
    let range = merged(&target, &value);
    Expr::new(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        range,
    )
}
