//! Integration tests for the Folio evaluator.
//!
//! Tests key evaluator features:
//! - expression semantics (operators, access, builtins, methods)
//! - directives (conditionals, loops, switch, let, fn, filter, lang)
//! - emission flattening and runtime whitespace merging
//! - error isolation at emission sites and page-level failures
//! - gas metering and call depth

use std::rc::Rc;

use folio_eval::{
    render_all, EvalError, Generation, Limits, NullHost, Page, PageStatus, Template,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Compile template source (panics on compile errors).
fn template(path: &str, source: &str) -> Rc<Template> {
    let program = folio_parser::compile(path, source).expect("template should compile");
    Rc::new(Template::new(path, Rc::new(program), Vec::new()))
}

fn pages_with(source: &str, generation: Generation, limits: Limits) -> Vec<Rc<Page>> {
    render_all(
        &template("page.tpl", source),
        &Rc::new(generation),
        &NullHost,
        limits,
    )
    .expect("template should instantiate")
}

fn page(source: &str) -> Rc<Page> {
    pages_with(source, Generation::default(), Limits::default())
        .into_iter()
        .next()
        .expect("one page")
}

/// Render a single-page template and return its output.
fn render(source: &str) -> String {
    let page = page(source);
    assert_eq!(page.status(), PageStatus::Rendered, "page failed: {:?}", page.error());
    page.output()
}

fn render_limited(source: &str, limits: Limits) -> Rc<Page> {
    pages_with(source, Generation::default(), limits)
        .into_iter()
        .next()
        .expect("one page")
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(render("@{ 1 + 2 * 3 }"), "7");
    assert_eq!(render("@{ (1 + 2) * 3 }"), "9");
    assert_eq!(render("@{ 2 ** 10 }"), "1024");
    assert_eq!(render("@{ 7 % 3 }"), "1");
    assert_eq!(render("@{ 1 / 4 }"), "0.25");
}

#[test]
fn test_plus_concatenates_text() {
    assert_eq!(render("@{ 'a' + 1 }"), "a1");
    assert_eq!(render("@{ 1 + true }"), "2");
}

#[test]
fn test_equality_is_strict() {
    assert_eq!(render("@{ 1 == '1' }"), "false");
    assert_eq!(render("@{ 'x' == 'x' }"), "true");
    assert_eq!(render("@{ null != 0 }"), "true");
}

#[test]
fn test_logical_operators_return_operands() {
    assert_eq!(render("@{ 0 || 'x' }"), "x");
    assert_eq!(render("@{ 'a' && 'b' }"), "b");
    assert_eq!(render("@{ null ?? 'd' }"), "d");
    assert_eq!(render("@{ 0 ?? 'd' }"), "0");
}

#[test]
fn test_conditional() {
    assert_eq!(render("@{ 1 > 2 ? 'a' : 2 > 1 ? 'b' : 'c' }"), "b");
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(render("@{ 5 & 3 }|@{ 5 | 3 }|@{ 5 ^ 3 }|@{ ~0 }"), "1|7|6|-1");
    assert_eq!(render("@{ 1 << 4 }"), "16");
}

#[test]
fn test_interpolated_string() {
    assert_eq!(render("@{ \"n=${1 + 1}!\" }"), "n=2!");
}

#[test]
fn test_member_access_and_length() {
    assert_eq!(render("@let(m = {a: {b: 3}})@m.a.b"), "3");
    assert_eq!(render("@{ 'héllo'.length }"), "5");
    assert_eq!(render("@{ [1, 2, 3].length }"), "3");
}

#[test]
fn test_optional_member_on_null() {
    assert_eq!(render("[@{ nothing?.x }]"), "[]");
}

#[test]
fn test_unknown_identifier_is_null() {
    assert_eq!(render("A@{ nothing }B"), "AB");
}

#[test]
fn test_index_access() {
    assert_eq!(render("@let(xs = ['a', 'b'])@xs[1]@{ xs[5] }"), "b");
    assert_eq!(render("@let(m = {k: 'v'})@{ m['k'] }"), "v");
}

#[test]
fn test_in_operator() {
    assert_eq!(render("@{ 'a' in {a: 1} }"), "true");
    assert_eq!(render("@{ 2 in [1, 2] }"), "false");
}

#[test]
fn test_assignment_and_update() {
    assert_eq!(render("@let(i = 0)@{ i++ }@{ i += 5 }@i"), "6");
    assert_eq!(render("@{ x ??= 'set' }@{ x ??= 'again' }@x"), "set");
}

#[test]
fn test_assignment_into_map() {
    assert_eq!(render("@let(m = {})@{ m.a = 1 }@{ m['b'] = 2 }@{ json(m) }"), "{\"a\":1,\"b\":2}");
}

#[test]
fn test_lambdas() {
    assert_eq!(render("@let(twice = fn(x) => x * 2)@{ twice(21) }"), "42");
    assert_eq!(render("@{ [3, 1, 2].sort(fn(a, b) => b - a).join('') }"), "321");
}

#[test]
fn test_dates() {
    assert_eq!(render("@let(d = #2024-03-01T10:30#)@d.month/@d.day"), "3/1");
    assert_eq!(render("@{ format_date(#2024-03-01#, '%d.%m.%Y') }"), "01.03.2024");
    assert_eq!(render("@{ Date(2024, 1, 15).iso }"), "2024-01-15T00:00:00");
}

#[test]
fn test_regex() {
    assert_eq!(render("@{ /b+/.test('abbc') }"), "true");
    assert_eq!(render("@{ 'a-b-c'.replace(/-/g, '+') }"), "a+b+c");
    assert_eq!(render("@{ 'a-b-c'.replace('-', '+') }"), "a+b-c");
}

#[test]
fn test_text_builtins() {
    assert_eq!(render("@{ upper('abc') }-@{ 'ABC'.lower() }-@{ trim('  x  ') }"), "ABC-abc-x");
    assert_eq!(render("@{ 'a,b'.split(',').length }"), "2");
    assert_eq!(render("@{ escape('<b>') }"), "&lt;b&gt;");
}

#[test]
fn test_collection_builtins() {
    assert_eq!(render("@{ [1, 2, 3].join('-') }"), "1-2-3");
    assert_eq!(render("@{ range(3).join() }"), "0,1,2");
    assert_eq!(render("@{ range(1, 7, 2).join() }"), "1,3,5");
    assert_eq!(render("@{ keys({b: 1, a: 2}).join() }"), "b,a");
    assert_eq!(render("@{ values({b: 1, a: 2}).join() }"), "1,2");
    assert_eq!(render("@{ first([4, 5]) }@{ last([4, 5]) }"), "45");
    assert_eq!(render("@{ sort(['b', 'c', 'a']).join('') }"), "abc");
    assert_eq!(render("@{ reverse([1, 2]).join('') }"), "21");
    assert_eq!(render("@{ len({a: 1}) }"), "1");
}

#[test]
fn test_yield_collects_into_page() {
    assert_eq!(render("@{ yield 'a' }@{ yield 'b' }@page.yields.length"), "2");
}

// ══════════════════════════════════════════════════════════════════════════════
// Directives
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_if_chain() {
    let source = "@if(n > 1)\nmany\n@elif(n == 1)\none\n@else\nnone\n@end\n";
    assert_eq!(render(&format!("@let(n = 2)\n{source}")), "many\n");
    assert_eq!(render(&format!("@let(n = 1)\n{source}")), "one\n");
    assert_eq!(render(&format!("@let(n = 0)\n{source}")), "none\n");
}

#[test]
fn test_for_over_sequence() {
    assert_eq!(
        render("<ul>\n@for(x in ['a', 'b'])\n  <li>@x</li>\n@end\n</ul>\n"),
        "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n"
    );
}

#[test]
fn test_for_over_map_with_key() {
    assert_eq!(render("@for(k, v in {a: 1, b: 2})@k=@v;@end"), "a=1;b=2;");
}

#[test]
fn test_for_over_text() {
    assert_eq!(render("@for(c in 'ab')[@c]@end"), "[a][b]");
}

#[test]
fn test_for_else_on_empty() {
    assert_eq!(render("@for(x in [])\nA\n@else\nnone\n@end\n"), "none\n");
    assert_eq!(render("@for(x in nothing)\nA\n@else\nnone\n@end\n"), "none\n");
}

#[test]
fn test_loop_variables_do_not_leak() {
    assert_eq!(render("@for(x in [1])@end[@x]"), "[]");
}

#[test]
fn test_while_loop() {
    assert_eq!(render("@let(i = 0)@while(i < 3)@i@{ i++ }@end"), "012");
}

#[test]
fn test_switch_uses_strict_equality() {
    assert_eq!(render("@switch(2)@case(1)one@case(2, 3)two@default other@end"), "two");
    assert_eq!(render("@switch('1')@case(1)num@default str@end"), " str");
}

#[test]
fn test_fn_definition_and_call() {
    assert_eq!(render("@fn greet(name)\nHi @name!\n@end\n@greet('Ann')"), "Hi Ann!\n");
}

#[test]
fn test_filter_directive() {
    assert_eq!(render("@filter(upper)\nhello\n@end\n"), "HELLO\n");
}

#[test]
fn test_lang_directive_matches_generation() {
    let source = "@lang(en)\nHello\n@end\n@lang(fr)\nBonjour\n@end\n";
    let generation = Generation {
        lang: Some("fr".into()),
        ..Generation::named("french")
    };
    let pages = pages_with(source, generation, Limits::default());
    assert_eq!(pages[0].output(), "Bonjour\n");

    let pages = pages_with(source, Generation::named("en"), Limits::default());
    assert_eq!(pages[0].output(), "Hello\n");
}

#[test]
fn test_generation_vars_are_bound() {
    let mut generation = Generation::named("en");
    generation.vars.insert("site".into(), serde_json::json!({"name": "Folio"}));
    let pages = pages_with("@site.name/@generation", generation, Limits::default());
    assert_eq!(pages[0].output(), "Folio/en");
}

// ══════════════════════════════════════════════════════════════════════════════
// Emission
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_sequence_emission_flattens() {
    assert_eq!(render("@{ [1, null, 'a', [2, 3]] }"), "1a23");
}

#[test]
fn test_callable_emission_is_invoked() {
    assert_eq!(render("@fn hi()\nHi\n@end\n@hi"), "Hi\n");
    assert_eq!(render("@{ fn() => 'x' }"), "x");
}

#[test]
fn test_page_emission_renders_output() {
    assert_eq!(render("A@{ page }B"), "AB");
}

#[test]
fn test_adjacent_emissions_are_untouched() {
    assert_eq!(render("@let(a = 1, b = 2)@a@b"), "12");
    assert_eq!(render("A\n  @{ 'v' }\nB"), "A\n  v\nB");
}

// ══════════════════════════════════════════════════════════════════════════════
// Runtime whitespace merging
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_emission_takes_its_line() {
    assert_eq!(render("X\n  @{ null }\nY"), "X\nY");
}

#[test]
fn test_empty_text_and_empty_sequence_merge() {
    assert_eq!(render("X\n  @{ '' }\nY"), "X\nY");
    assert_eq!(render("X\n  @{ [] }\nY"), "X\nY");
}

#[test]
fn test_assignment_emission_takes_its_line() {
    assert_eq!(render("A\n@{ n = 1 }\nB:@n"), "A\nB:1");
}

#[test]
fn test_empty_emission_sharing_a_line() {
    assert_eq!(render("a @{ null } b"), "a  b");
}

#[test]
fn test_runtime_merge_stays_in_scope() {
    assert_eq!(render("X\n  @if(true)@{ null }\nY\n@end"), "X\n  \nY\n");
}

#[test]
fn test_empty_emission_at_end_of_output() {
    assert_eq!(render("A\n  @{ null }"), "A\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_emission_error_is_isolated() {
    let out = render("a @{ null.x } b");
    assert!(out.starts_with("a [render error at 1:"), "{out}");
    assert!(out.ends_with("cannot read `x` of null] b"), "{out}");
}

#[test]
fn test_not_callable_is_isolated() {
    let out = render("@{ (1)() }|ok");
    assert!(out.contains("number is not callable]"), "{out}");
    assert!(out.ends_with("|ok"));
}

#[test]
fn test_host_errors_are_isolated() {
    let out = render("@{ get_page('about') }");
    assert!(out.contains("no page `about`"), "{out}");
}

#[test]
fn test_directive_error_fails_the_page() {
    let page = page("before\n@if(null.x)\nA\n@end\n");
    assert_eq!(page.status(), PageStatus::Failed);
    let error = page.error().expect("error is recorded");
    assert!(matches!(error.root(), EvalError::NullAccess { .. }));
    assert!(error.to_string().starts_with("2:"), "{error}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Limits
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_gas_exhaustion_fails_the_page() {
    let limits = Limits {
        gas_limit: 1_000,
        ..Limits::default()
    };
    let page = render_limited("@while(true)\n@end\n", limits);
    assert_eq!(page.status(), PageStatus::Failed);
    assert!(matches!(page.error().map(|e| e.root().clone()), Some(EvalError::GasExhausted)));
}

#[test]
fn test_gas_exhaustion_in_emission_is_not_isolated() {
    let limits = Limits {
        gas_limit: 1_000,
        ..Limits::default()
    };
    let page = render_limited("@{ range(100000) }", limits);
    assert_eq!(page.status(), PageStatus::Failed);
}

#[test]
fn test_runaway_recursion_is_a_render_error() {
    let limits = Limits {
        max_call_depth: 16,
        ..Limits::default()
    };
    let page = render_limited("@fn f()\n@f()\n@end\n@f()", limits);
    assert_eq!(page.status(), PageStatus::Rendered);
    assert!(page.output().contains("call depth limit of 16 exceeded"));
}

#[test]
fn test_self_containing_sequence_is_a_render_error() {
    let page = page("@{ a = [] }@{ a[0] = a }[@{ a }]");
    assert_eq!(page.status(), PageStatus::Rendered);
    let output = page.output();
    assert!(output.starts_with("[[render error at 1:"), "{output}");
    assert!(output.contains("values nested deeper than 256 levels"), "{output}");
}

#[test]
fn test_self_containing_sequence_in_json_is_a_render_error() {
    let page = page("@{ a = [1] }@{ a[1] = a }@{ json(a) }");
    assert_eq!(page.status(), PageStatus::Rendered);
    assert!(page.output().contains("values nested deeper than"));
}

#[test]
fn test_text_doubling_exhausts_gas() {
    let limits = Limits {
        gas_limit: 10_000,
        ..Limits::default()
    };
    let page = render_limited(
        "@{ s = 'x' }@for(i in range(0, 40))@{ s = s + s }@end@{ len(s) }",
        limits,
    );
    assert_eq!(page.status(), PageStatus::Failed);
    assert!(matches!(page.error().map(|e| e.root().clone()), Some(EvalError::GasExhausted)));
}

#[test]
fn test_join_charges_for_its_result() {
    let limits = Limits {
        gas_limit: 1_000,
        ..Limits::default()
    };
    let page = render_limited(
        "@{ s = 'xxxxxxxxxxxxxxxx' }@for(i in range(0, 40))@{ s = [s, s].join('') }@end",
        limits,
    );
    assert_eq!(page.status(), PageStatus::Failed);
    assert!(matches!(page.error().map(|e| e.root().clone()), Some(EvalError::GasExhausted)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_render_determinism_100_iterations() {
    let source = "@let(items = {b: 2, a: 1})\n@for(k, v in items)\n  @k: @{ v * 10 }\n@end\n@{ keys(items).sort() }\n";
    let baseline = render(source);
    for _ in 0..100 {
        assert_eq!(render(source), baseline);
    }
}
