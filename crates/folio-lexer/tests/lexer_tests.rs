//! Lexer tests: every context, trim markers, literals, and the progress and
//! token-identity properties the parser relies on.

use folio_lexer::{LexContext, Lexer, Token, TokenKind};
use folio_types::Position;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

const ALL_CONTEXTS: [LexContext; 6] = [
    LexContext::TopLevel,
    LexContext::Expression,
    LexContext::Inline,
    LexContext::StringInterpolation,
    LexContext::Regex,
    LexContext::Raw,
];

const MESSY: &str = "a @if(x) @{ 'b' }~ @@ @* c *@ d@e.f @~end~ @ \"s${1}t\" #2024-01-15# /x[/]/g ~ ` é\n@";

/// Lex in one context and return the token kinds, excluding the final Eof.
fn kinds(source: &str, context: LexContext) -> Vec<TokenKind> {
    Lexer::new(source)
        .tokenize(context)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

/// Lex a single token at the start of `source`.
fn first(source: &str, context: LexContext) -> Token {
    Lexer::new(source).next(context, Position::START)
}

// ─────────────────────────────────────────────────────────────────────
// Progress & token identity
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_progress_in_every_context() {
    for context in ALL_CONTEXTS {
        let tokens = Lexer::new(MESSY).tokenize(context);
        let mut cursor = 0;
        for token in &tokens[..tokens.len() - 1] {
            assert!(!token.is_eof(), "{context:?}: Eof before the end");
            assert_eq!(token.start.offset, cursor, "{context:?}: cursor moved backward");
            assert!(token.end.offset > cursor, "{context:?}: no progress at {cursor}");
            cursor = token.end.offset;
        }
        let last = tokens.last().unwrap();
        assert!(last.is_eof(), "{context:?}: missing Eof");
        assert_eq!(last.end.offset, MESSY.len());
    }
}

#[test]
fn test_eof_is_terminal() {
    let lexer = Lexer::new("abc");
    let eof = lexer.next(LexContext::TopLevel, Position::START);
    assert!(eof.is_eof());
    let again = lexer.next(LexContext::TopLevel, eof.end);
    assert!(again.is_eof());
    assert_eq!(again.start, again.end);
}

#[test]
fn test_token_identity() {
    for context in ALL_CONTEXTS {
        for token in Lexer::new(MESSY).tokenize(context) {
            assert!(token.start <= token.value_start && token.value_start <= token.end);
            let rebuilt = format!("{}{}", token.prev_text(MESSY), token.value(MESSY));
            assert_eq!(rebuilt, token.all_text(MESSY));
        }
    }
}

#[test]
fn test_positions_track_lines() {
    let lexer = Lexer::new("one\ntwo @end");
    let tok = lexer.next(LexContext::TopLevel, Position::START);
    assert_eq!(tok.kind, TokenKind::End);
    assert_eq!(tok.value_start, Position::new(2, 5, 8));
    assert_eq!(tok.end, Position::new(2, 9, 12));
}

// ─────────────────────────────────────────────────────────────────────
// Top-level text
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_top_level_directives() {
    assert_eq!(
        kinds("@if(x) a @elif(y) b @else c @end", LexContext::TopLevel),
        vec![TokenKind::If, TokenKind::Elif, TokenKind::Else, TokenKind::End]
    );
}

#[test]
fn test_every_directive_name() {
    for (name, kind) in folio_lexer::DIRECTIVES {
        let src = format!("@{name}");
        assert_eq!(first(&src, LexContext::TopLevel).kind, *kind, "@{name}");
    }
}

#[test]
fn test_escape_is_literal_at() {
    let src = "a@@b";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::Escape);
    assert_eq!(tok.prev_text(src), "a");
    assert_eq!(tok.value(src), "@@");
}

#[test]
fn test_email_addresses_stay_literal() {
    let src = "write to team@example.com or ops2@example.com";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::Eof);
    assert_eq!(tok.prev_text(src), src);
}

#[test]
fn test_inline_start() {
    let src = "Hi @page.title!";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::At);
    assert_eq!(tok.value(src), "@");
    assert_eq!(tok.end.offset, 4);
}

#[test]
fn test_open_emit() {
    let src = "x @{ 1 }";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::OpenEmit);
    assert_eq!(tok.value(src), "@{");
}

#[test]
fn test_comment() {
    let src = "a @* note @if *@b";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::Comment);
    assert_eq!(tok.value(src), "@* note @if *@");
}

#[test]
fn test_unterminated_comment() {
    assert_eq!(
        kinds("@* never closed", LexContext::TopLevel),
        vec![TokenKind::Unterminated]
    );
}

#[test]
fn test_stray_at_is_unexpected() {
    assert_eq!(kinds("a @ b", LexContext::TopLevel), vec![TokenKind::Unexpected]);
}

// ─────────────────────────────────────────────────────────────────────
// Trim markers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_trim_left_marker() {
    let tok = first("  @~if(x)", LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::If);
    assert!(tok.trim_left);
    assert!(!tok.trim_right);
}

#[test]
fn test_trim_right_after_bare_directive() {
    let src = "@end~\n";
    let tok = first(src, LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::End);
    assert!(tok.trim_right);
    assert_eq!(tok.value(src), "@end~");
}

#[test]
fn test_trim_right_after_header() {
    let src = "x)~\n";
    let tokens = Lexer::new(src).tokenize(LexContext::Expression);
    assert_eq!(tokens[1].kind, TokenKind::RParen);
    assert!(tokens[1].trim_right);
}

#[test]
fn test_trim_right_after_emission() {
    let src = " }~";
    let tok = first(src, LexContext::Expression);
    assert_eq!(tok.kind, TokenKind::RBrace);
    assert!(tok.trim_right);
}

#[test]
fn test_trim_right_after_comment() {
    let tok = first("@* c *@~", LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::Comment);
    assert!(tok.trim_right);
}

#[test]
fn test_header_directive_leaves_tilde() {
    let tok = first("@if~", LexContext::TopLevel);
    assert_eq!(tok.kind, TokenKind::If);
    assert!(!tok.trim_right);
    assert_eq!(tok.end.offset, 3);
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_context_changes_classification() {
    assert_eq!(kinds("a + b", LexContext::TopLevel), Vec::<TokenKind>::new());
    assert_eq!(
        kinds("a + b", LexContext::Expression),
        vec![TokenKind::Ident, TokenKind::Plus, TokenKind::Ident]
    );
}

#[test]
fn test_keywords() {
    assert_eq!(
        kinds("true false null in new yield fn nullish", LexContext::Expression),
        vec![
            TokenKind::True,
            TokenKind::False,
            TokenKind::Null,
            TokenKind::In,
            TokenKind::New,
            TokenKind::Yield,
            TokenKind::Fn,
            TokenKind::Ident,
        ]
    );
}

#[test]
fn test_numbers() {
    let src = "42 3.14 .5 1e3 2.5E-2 0xff";
    let tokens = Lexer::new(src).tokenize(LexContext::Expression);
    let values: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Number)
        .map(|t| t.value(src))
        .collect();
    assert_eq!(values, vec!["42", "3.14", ".5", "1e3", "2.5E-2", "0xff"]);
}

#[test]
fn test_member_after_number() {
    assert_eq!(
        kinds("1.x", LexContext::Expression),
        vec![TokenKind::Number, TokenKind::Dot, TokenKind::Ident]
    );
}

#[test]
fn test_strings() {
    let src = r#"'it\'s' "plain""#;
    let tokens = Lexer::new(src).tokenize(LexContext::Expression);
    assert_eq!(tokens[0].kind, TokenKind::Str);
    assert_eq!(tokens[0].value(src), r"'it\'s'");
    assert_eq!(tokens[1].kind, TokenKind::Str);
    assert_eq!(tokens[1].value(src), r#""plain""#);
}

#[test]
fn test_unterminated_string() {
    assert_eq!(
        kinds("'abc", LexContext::Expression),
        vec![TokenKind::Unterminated]
    );
}

#[test]
fn test_interpolated_string_contexts() {
    let src = r#""a${x}b${ y }c""#;
    let lexer = Lexer::new(src);

    let head = lexer.next(LexContext::Expression, Position::START);
    assert_eq!(head.kind, TokenKind::TemplateHead);
    assert_eq!(head.value(src), "\"a${");

    let x = lexer.next(LexContext::Expression, head.end);
    assert_eq!(x.kind, TokenKind::Ident);

    let middle = lexer.next(LexContext::StringInterpolation, x.end);
    assert_eq!(middle.kind, TokenKind::TemplateMiddle);
    assert_eq!(middle.value(src), "}b${");

    let y = lexer.next(LexContext::Expression, middle.end);
    assert_eq!(y.value(src), "y");

    let tail = lexer.next(LexContext::StringInterpolation, y.end);
    assert_eq!(tail.kind, TokenKind::TemplateTail);
    assert_eq!(tail.value(src), "}c\"");
    assert_eq!(tail.end.offset, src.len());
}

#[test]
fn test_date_literal() {
    let src = "#2024-01-15T10:30:00#";
    let tok = first(src, LexContext::Expression);
    assert_eq!(tok.kind, TokenKind::Date);
    assert_eq!(tok.value(src), src);
}

#[test]
fn test_unterminated_date() {
    assert_eq!(
        kinds("#2024-01-15", LexContext::Expression),
        vec![TokenKind::Unterminated]
    );
}

#[test]
fn test_all_operators() {
    assert_eq!(
        kinds(
            ". ?. ( ) [ ] { } , : ? => ++ -- ! ~ + - ** * / % << >> >>> < > <= >= == != & ^ | && || ?? = += -= *= /= %= ??=",
            LexContext::Expression
        ),
        vec![
            TokenKind::Dot,
            TokenKind::QuestionDot,
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::LBracket,
            TokenKind::RBracket,
            TokenKind::LBrace,
            TokenKind::RBrace,
            TokenKind::Comma,
            TokenKind::Colon,
            TokenKind::Question,
            TokenKind::Arrow,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
            TokenKind::Bang,
            TokenKind::Tilde,
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::StarStar,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::Shl,
            TokenKind::Shr,
            TokenKind::UShr,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::Amp,
            TokenKind::Caret,
            TokenKind::Pipe,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::QuestionQuestion,
            TokenKind::Eq,
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::PercentEq,
            TokenKind::QuestionQuestionEq,
        ]
    );
}

#[test]
fn test_unexpected_character() {
    let src = "a ` b";
    let tokens = Lexer::new(src).tokenize(LexContext::Expression);
    assert_eq!(tokens[1].kind, TokenKind::Unexpected);
    assert_eq!(tokens[1].value(src), "`");
}

// ─────────────────────────────────────────────────────────────────────
// Inline, regex and raw contexts
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_inline_chain() {
    let src = "page.title[0](x). more";
    let tokens = Lexer::new(src).tokenize(LexContext::Inline);
    let got: Vec<TokenKind> = tokens.iter().take(5).map(|t| t.kind).collect();
    assert_eq!(
        got,
        vec![
            TokenKind::Ident,
            TokenKind::Dot,
            TokenKind::Ident,
            TokenKind::LBracket,
            TokenKind::Unexpected,
        ]
    );
}

#[test]
fn test_inline_does_not_skip_whitespace() {
    let tok = first(" x", LexContext::Inline);
    assert_eq!(tok.kind, TokenKind::Unexpected);
}

#[test]
fn test_inline_trailing_dot_is_not_member() {
    let src = ". rest";
    assert_eq!(first(src, LexContext::Inline).kind, TokenKind::Unexpected);
}

#[test]
fn test_regex_literal() {
    let src = r"/a\/b[/]c/gi rest";
    let tok = first(src, LexContext::Regex);
    assert_eq!(tok.kind, TokenKind::Regex);
    assert_eq!(tok.value(src), r"/a\/b[/]c/gi");
}

#[test]
fn test_regex_stops_at_newline() {
    let tok = first("/abc\n/", LexContext::Regex);
    assert_eq!(tok.kind, TokenKind::Unterminated);
    assert_eq!(tok.end.offset, 4);
}

#[test]
fn test_raw_section() {
    let src = "<@if(x)> @endless @~end~ tail";
    let tok = first(src, LexContext::Raw);
    assert_eq!(tok.kind, TokenKind::End);
    assert_eq!(tok.prev_text(src), "<@if(x)> @endless ");
    assert!(tok.trim_left);
    assert!(tok.trim_right);
}

#[test]
fn test_raw_without_end() {
    let src = "never closed";
    let tok = first(src, LexContext::Raw);
    assert!(tok.is_eof());
    assert_eq!(tok.prev_text(src), src);
}

// ─────────────────────────────────────────────────────────────────────
// 100-iteration determinism test
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_lexer_determinism_100_iterations() {
    let baseline: Vec<Vec<Token>> = ALL_CONTEXTS
        .iter()
        .map(|c| Lexer::new(MESSY).tokenize(*c))
        .collect();
    for _ in 0..100 {
        for (i, context) in ALL_CONTEXTS.iter().enumerate() {
            assert_eq!(Lexer::new(MESSY).tokenize(*context), baseline[i]);
        }
    }
}
