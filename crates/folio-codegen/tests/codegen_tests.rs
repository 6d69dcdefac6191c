//! Integration tests for the routine emitter.
//!
//! Tests validate:
//! - The exact listing of a minimal template
//! - Control flow, blocks, hooks and definitions
//! - Source map lines point back at template statements
//! - Deterministic output (same input → same listing)

use folio_codegen::{emit_routine, emit_routine_with_source_map, FuncKind};
use folio_types::ast::Program;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Compile template source into a Program (panics on errors).
fn compile(source: &str) -> Program {
    folio_parser::compile("page.tpl", source).expect("template should compile")
}

fn listing(source: &str) -> String {
    emit_routine(&compile(source))
}

fn assert_contains(listing: &str, fragment: &str) {
    assert!(
        listing.contains(fragment),
        "listing does not contain:\n{fragment}\n--- listing ---\n{listing}"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Structure
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_minimal_listing() {
    assert_eq!(
        listing("Hello @name!\n"),
        "// compiled from page.tpl\n\
         \n\
         function init(scope, out) {\n\
         \x20 out.text(\"Hello \");\n\
         \x20 out.emit(scope.name);\n\
         \x20 out.text(\"!\\n\");\n\
         \x20 return out.finish();\n\
         }\n"
    );
}

#[test]
fn test_empty_template_still_returns_output() {
    assert_contains(&listing(""), "function init(scope, out) {\n  return out.finish();\n}\n");
}

#[test]
fn test_if_chain() {
    assert_contains(
        &listing("@if(a)\nA\n@elif(b)\nB\n@else\nC\n@end\n"),
        "  if (truthy(scope.a)) {\n    out.text(\"A\\n\");\n  } else if (truthy(scope.b)) {\n    out.text(\"B\\n\");\n  } else {\n    out.text(\"C\\n\");\n  }\n",
    );
}

#[test]
fn test_for_with_else() {
    assert_contains(
        &listing("@for(k, v in m)\n@v\n@else\nnone\n@end\n"),
        "  if (!each(scope.m, \"k\", \"v\", function (scope) {\n    out.emit(scope.v);\n    out.text(\"\\n\");\n  })) {\n    out.text(\"none\\n\");\n  }\n",
    );
}

#[test]
fn test_for_without_else() {
    assert_contains(
        &listing("@for(x in xs)\n@x\n@end\n"),
        "  each(scope.xs, null, \"x\", function (scope) {\n",
    );
}

#[test]
fn test_while_and_switch() {
    let out = listing("@while(i < 3)\n@{ i++ }\n@end\n@switch(x)\n@case(1, 2)\nlow\n@default\nhigh\n@end\n");
    assert_contains(&out, "  while (truthy((scope.i < 3))) {\n    out.emit((scope.i++));\n");
    assert_contains(
        &out,
        "  switch (scope.x) {\n    case 1:\n    case 2:\n      out.text(\"low\\n\");\n      break;\n    default:\n      out.text(\"high\\n\");\n  }\n",
    );
}

#[test]
fn test_blocks_render_as_functions() {
    let out = listing("@block(title)\nSite\n@end\n");
    assert_contains(&out, "  out.block(\"title\");\n");
    assert_contains(
        &out,
        "blocks[\"title\"] = function (scope, out) {\n  out.text(\"Site\\n\");\n  return out.finish();\n};\n",
    );
}

#[test]
fn test_super() {
    assert_contains(&listing("@block(a)\n@super\n@end\n"), "  out.super();\n");
}

#[test]
fn test_hooks() {
    let out = listing("@extend('base.tpl')\n@repeat(items)\n@postinit\n@content\n@end\n");
    assert_contains(&out, "const extend = [\"base.tpl\"];\n");
    assert_contains(&out, "function repeat(scope) {\n  return scope.items;\n}\n");
    assert_contains(&out, "function postinit(scope, out) {\n  out.emit(scope.content);\n");
}

#[test]
fn test_no_hooks_without_directives() {
    let out = listing("plain");
    assert!(!out.contains("postinit"));
    assert!(!out.contains("repeat"));
    assert!(!out.contains("extend"));
}

#[test]
fn test_definitions() {
    let out = listing(
        "@let(a = 1, b = a * 2)\n@fn greet(name)\nHi @name\n@end\n@lang(en)\nHello\n@end\n@filter(upper)\nx\n@end\n",
    );
    assert_contains(&out, "  scope.let(\"a\", 1);\n  scope.let(\"b\", (scope.a * 2));\n");
    assert_contains(
        &out,
        "  scope.let(\"greet\", template([\"name\"], function (scope, out) {\n    out.text(\"Hi \");\n",
    );
    assert_contains(&out, "  }));\n");
    assert_contains(&out, "  if (lang([\"en\"])) {\n    out.text(\"Hello\\n\");\n  }\n");
    assert_contains(
        &out,
        "  out.filter(scope.upper, function (scope, out) {\n    out.text(\"x\\n\");\n    return out.finish();\n  });\n",
    );
}

#[test]
fn test_date_literal_becomes_constructor_call() {
    assert_contains(
        &listing("@{ #2024-03-01# }"),
        "  out.emit(Date(2024, 3, 1, 0, 0, 0));\n",
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Source map
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_source_map_points_at_statements() {
    let (out, map) = emit_routine_with_source_map(&compile("Hello @name!\n"));
    let lines: Vec<&str> = out.lines().collect();

    let entry = map.find_by_line(5).expect("emission line is mapped");
    assert_eq!(lines[4], "  out.emit(scope.name);");
    assert_eq!(entry.func_name, "init");
    assert_eq!(entry.kind, FuncKind::Init);
    assert_eq!((entry.range.start.line, entry.range.start.column), (1, 7));

    assert!(map.find_by_line(3).is_none(), "function header is not mapped");
}

#[test]
fn test_source_map_block_entries() {
    let (out, map) = emit_routine_with_source_map(&compile("A\n@block(t)\nB\n@end\n"));
    let lines: Vec<&str> = out.lines().collect();
    let block_entries: Vec<_> = map
        .entries
        .iter()
        .filter(|e| e.kind == FuncKind::Block)
        .collect();
    assert_eq!(block_entries.len(), 2);
    for entry in block_entries {
        assert_eq!(entry.func_name, "t");
        assert!(lines[entry.line as usize - 1].contains("\"t\"") || lines[entry.line as usize - 1].contains("B\\n"));
    }
}

#[test]
fn test_every_mapped_line_exists() {
    let source = "@if(a)\n@for(x in xs)\n@x\n@end\n@end\n@block(b)\n@super\n@end\n";
    let (out, map) = emit_routine_with_source_map(&compile(source));
    let count = out.lines().count() as u32;
    assert!(!map.entries.is_empty());
    for entry in &map.entries {
        assert!(entry.line >= 1 && entry.line <= count, "line {} out of range", entry.line);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_listing_determinism_100_iterations() {
    let program = compile("@extend('base')\n@block(body)\n@for(p in pages)\n<a>@p.title</a>\n@end\n@end\n");
    let baseline = emit_routine(&program);
    for _ in 0..100 {
        assert_eq!(emit_routine(&program), baseline);
    }
}
