//! Build driver tests: resolution, inheritance, page caching, cross-page
//! references, URL claims, asset jobs and build passes.

use std::rc::Rc;

use folio_compiler::cache::fingerprint;
use folio_compiler::{
    BuildReport, MemoryResolver, MemorySink, Site, SiteConfig, SiteError,
};
use folio_eval::{PageStatus, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn resolver(files: &[(&str, &str)]) -> MemoryResolver {
    let resolver = MemoryResolver::new();
    for (name, source) in files {
        resolver.insert(name, *source);
    }
    resolver
}

fn site(files: &[(&str, &str)]) -> Site {
    Site::new(resolver(files), SiteConfig::default())
}

fn build(site: &Site) -> (BuildReport, MemorySink) {
    let mut sink = MemorySink::new();
    let report = site.build(&mut sink).expect("build should run");
    (report, sink)
}

fn bilingual() -> SiteConfig {
    SiteConfig::from_json(
        r#"{
            "generations": [
                { "name": "en", "lang": "en", "vars": { "greeting": "Hello" } },
                { "name": "fr", "lang": "fr", "prefix": "fr", "vars": { "greeting": "Bonjour" } }
            ]
        }"#,
    )
    .expect("valid config")
}

// ══════════════════════════════════════════════════════════════════════════════
// Build passes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_build_writes_every_page_template() {
    let site = site(&[
        ("index.tpl", "Home"),
        ("blog/post.tpl", "Post"),
        ("_partial.tpl", "never built"),
        ("blog/_init.tpl", "@let(section = 'blog')\n"),
        ("style.css", "body {}"),
    ]);
    let (report, sink) = build(&site);

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink.get("index.html"), Some("Home"));
    assert_eq!(sink.get("blog/post.html"), Some("Post"));

    let home = report.page("index.html").expect("index reported");
    assert_eq!(home.url, "/index.html");
    assert_eq!(home.template, "index.tpl");
    assert_eq!(home.generation, "default");
    assert_eq!(home.digest, fingerprint("Home"));
}

#[test]
fn test_build_every_generation() {
    let files = resolver(&[
        ("index.tpl", "@greeting"),
        ("about.tpl", "@lang(en)About@end@lang(fr)À propos@end"),
    ]);
    let site = Site::new(files, bilingual());
    let (report, sink) = build(&site);

    assert!(report.is_success());
    assert_eq!(sink.get("index.html"), Some("Hello"));
    assert_eq!(sink.get("fr/index.html"), Some("Bonjour"));
    assert_eq!(sink.get("about.html"), Some("About"));
    assert_eq!(sink.get("fr/about.html"), Some("À propos"));
}

#[test]
fn test_report_serializes() {
    let site = site(&[("index.tpl", "Home")]);
    let (report, _) = build(&site);
    let json = report.to_json();
    assert_eq!(json["pass"], 1);
    assert_eq!(json["pages"][0]["path"], "index.html");
    assert!(json["pages"][0].get("key").is_none());
}

#[test]
fn test_begin_pass_counts_and_clears_pages() {
    let site = site(&[("a.tpl", "A")]);
    assert_eq!(site.pass(), 0);
    site.begin_pass();
    let first = site.page("a", None, None).expect("page");
    site.begin_pass();
    let second = site.page("a", None, None).expect("page");
    assert_eq!(site.pass(), 2);
    assert!(!Rc::ptr_eq(&first, &second));
}

#[test]
fn test_programs_survive_passes() {
    let files = resolver(&[("index.tpl", "one")]);
    let site = Site::new(files.clone(), SiteConfig::default());

    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("one"));
    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("one"));
    assert_eq!(site.cache_stats().compiled, 1);
    assert!(site.cache_stats().hits >= 1);

    files.insert("index.tpl", "two");
    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("two"));
    assert_eq!(site.cache_stats().compiled, 2);

    files.insert("index.tpl", "two");
    build(&site);
    assert_eq!(site.cache_stats().compiled, 2);
    assert_eq!(site.cache_stats().reused, 1);
}

#[test]
fn test_build_is_deterministic() {
    let files: &[(&str, &str)] = &[
        ("_init.tpl", "@postinit\n<html>@content</html>\n@end\n"),
        ("index.tpl", "@for(p in get_pages('blog/*.tpl'))@p.title;@end"),
        ("blog/a.tpl", "@let(title = 'A')\nAlpha"),
        ("blog/b.tpl", "@let(title = 'B')\nBeta"),
        ("tags.tpl", "@repeat({rust: 3, web: 1})\n@let(slug = key)\n@key=@value"),
    ];
    let (first_report, first_sink) = build(&site(files));
    for _ in 0..100 {
        let (report, sink) = build(&site(files));
        assert_eq!(sink.files(), first_sink.files());
        assert_eq!(report.pages, first_report.pages);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Inheritance
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_initializer_chain_from_root_down() {
    let site = site(&[
        ("_init.tpl", "@let(site = 'S')\n@postinit\n[@content]\n@end\n"),
        ("blog/_init.tpl", "@let(section = site + '/blog')\n@postinit\n(@content)\n@end\n"),
        ("blog/post.tpl", "@section"),
        ("index.tpl", "Home"),
    ]);
    let (report, sink) = build(&site);
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(sink.get("blog/post.html"), Some("[(S/blog)\n]\n"));
    assert_eq!(sink.get("index.html"), Some("[Home]\n"));
}

#[test]
fn test_extend_adds_an_ancestor() {
    let site = site(&[
        ("layouts/_base.tpl", "@postinit\n<body>@content</body>\n@end\n"),
        ("page.tpl", "@extend(\"layouts/_base\")\nHi"),
    ]);
    let template = site.template("page.tpl").expect("template resolves");
    assert_eq!(template.ancestors.len(), 1);

    let (_, sink) = build(&site);
    assert_eq!(sink.get("page.html"), Some("<body>Hi</body>\n"));
}

#[test]
fn test_extend_targets_come_after_initializers() {
    let site = site(&[
        ("_init.tpl", "@let(trail = 'init')\n"),
        ("_layout.tpl", "@{ trail = trail + '>layout' }\n"),
        ("page.tpl", "@extend(\"_layout\")\n@trail"),
    ]);
    let (_, sink) = build(&site);
    assert_eq!(sink.get("page.html"), Some("init>layout"));
}

#[test]
fn test_extend_cycle_is_an_error() {
    let site = site(&[
        ("_a.tpl", "@extend(\"_b\")\n"),
        ("_b.tpl", "@extend(\"_a\")\n"),
        ("page.tpl", "@extend(\"_a\")\nx"),
    ]);
    assert!(matches!(
        site.template("page.tpl"),
        Err(SiteError::ExtendCycle(name)) if name == "_a.tpl"
    ));

    let (report, sink) = build(&site);
    assert!(sink.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("extends itself"));
}

#[test]
fn test_missing_extend_target() {
    let site = site(&[("page.tpl", "@extend(\"nowhere\")\nx")]);
    assert!(matches!(
        site.template("page.tpl"),
        Err(SiteError::NotFound(name)) if name == "nowhere"
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Page references
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cache_coherence_within_a_pass() {
    let site = site(&[
        ("a.tpl", "A"),
        ("index.tpl", "@{ get_page('a') == get_page('a.tpl') }"),
    ]);
    site.begin_pass();
    let first = site.page("a", None, None).expect("page");
    let second = site.page("/a.tpl", None, None).expect("page");
    assert!(Rc::ptr_eq(&first, &second));

    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("true"));
}

#[test]
fn test_get_page_reads_bindings_and_identity() {
    let site = site(&[
        ("about.tpl", "@let(title = 'About us')\nbody"),
        ("index.tpl", "@{ get_page('about').title } at @{ get_page('about').url }"),
    ]);
    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("About us at /about.html"));
}

#[test]
fn test_get_page_prefers_the_requesting_directory() {
    let site = site(&[
        ("list.tpl", "root"),
        ("blog/list.tpl", "blog"),
        ("blog/post.tpl", "@{ get_page('list').content }|@{ get_page('/list').content }"),
        ("blog/other.tpl", "@{ get_page('index').content }"),
        ("index.tpl", "home"),
    ]);
    let (_, sink) = build(&site);
    assert_eq!(sink.get("blog/post.html"), Some("blog|root"));
    assert_eq!(sink.get("blog/other.html"), Some("home"));
}

#[test]
fn test_get_page_selects_a_repeated_page_by_key() {
    let site = site(&[
        ("posts.tpl", "@repeat(['x', 'y', 'z'])\n@value"),
        ("index.tpl", "@{ get_page('posts', {key: 1}).content }"),
    ]);
    let (report, sink) = build(&site);
    assert!(report.is_success());
    assert_eq!(sink.get("index.html"), Some("y"));
    assert_eq!(sink.get("posts-0.html"), Some("x"));
    assert_eq!(sink.get("posts-2.html"), Some("z"));
    assert_eq!(report.page("posts-1.html").and_then(|p| p.key.clone()).as_deref(), Some("1"));

    site.begin_pass();
    let page = site
        .page("posts", None, Some(&Value::text("2")))
        .expect("key as text matches");
    assert_eq!(page.output(), "z");
}

#[test]
fn test_get_page_in_another_generation() {
    let files = resolver(&[
        ("about.tpl", "@lang(en)About@end@lang(fr)À propos@end"),
        ("index.tpl", "@{ get_page('about', 'fr').content }|@{ get_page('about', {generation: 'en'}).url }"),
    ]);
    let site = Site::new(files, bilingual());
    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("À propos|/about.html"));
    assert_eq!(sink.get("fr/index.html"), Some("À propos|/about.html"));
}

#[test]
fn test_unknown_generation_is_isolated() {
    let site = site(&[("index.tpl", "@{ get_page('index', 'de') }!")]);
    let (report, sink) = build(&site);
    assert!(report.is_success());
    let out = sink.get("index.html").expect("page written");
    assert!(out.contains("unknown generation `de`"), "{out}");
    assert!(out.ends_with('!'));
}

#[test]
fn test_missing_page_is_isolated() {
    let site = site(&[("index.tpl", "[@{ get_page('nope') }]")]);
    let (_, sink) = build(&site);
    let out = sink.get("index.html").expect("page written");
    assert!(out.starts_with("[[render error at "), "{out}");
    assert!(out.contains("`nope` not found"), "{out}");
}

#[test]
fn test_get_pages_lists_matching_pages() {
    let site = site(&[
        ("blog/a.tpl", "@let(title = 'A')\n"),
        ("blog/b.tpl", "@let(title = 'B')\n"),
        ("blog/_draft.tpl", "@let(title = 'D')\n"),
        ("index.tpl", "@for(p in get_pages('blog/*.tpl'))@p.title;@end"),
    ]);
    let (_, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("A;B;"));
}

#[test]
fn test_cyclic_reference_sees_in_progress_page() {
    let site = site(&[
        ("a.tpl", "A:@{ get_page('b').content }"),
        ("b.tpl", "B:@{ get_page('a').url }"),
    ]);
    let (report, sink) = build(&site);
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(sink.get("b.html"), Some("B:/a.html"));
    assert_eq!(sink.get("a.html"), Some("A:B:/a.html"));
}

#[test]
fn test_self_reference_while_repeating() {
    let site = site(&[("loop.tpl", "@repeat(get_page('loop').yields)\nx")]);
    let (report, _) = build(&site);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].message.contains("refers to itself"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Output claims
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_first_claim_on_an_output_path_wins() {
    let site = site(&[
        ("a.tpl", "@let(output = 'same.html')\nA"),
        ("b.tpl", "@let(output = 'same.html')\nB"),
    ]);
    let (report, sink) = build(&site);
    assert_eq!(sink.get("same.html"), Some("A"));
    assert_eq!(report.collisions, ["same.html"]);
    let owner = site.url_owner("same.html").expect("claimed");
    assert_eq!(owner.template().path, "a.tpl");
    assert_eq!(site.claimed_paths(), ["same.html"]);
}

#[test]
fn test_skipped_pages_stay_addressable() {
    let site = site(&[
        ("draft.tpl", "@let(skip = true)\nDraft"),
        ("index.tpl", "@{ get_page('draft').content }"),
    ]);
    let (report, sink) = build(&site);
    assert_eq!(sink.get("draft.html"), None);
    assert_eq!(sink.get("index.html"), Some("Draft"));
    assert_eq!(report.skipped, 1);
    assert!(site.url_owner("draft.html").is_none());
}

// ══════════════════════════════════════════════════════════════════════════════
// Failures
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_failures_do_not_abort_the_build() {
    let site = site(&[
        ("bad.tpl", "@repeat(5)\nx"),
        ("good.tpl", "ok"),
        ("worse.tpl", "@let(x = null.field)\nx"),
    ]);
    let (report, sink) = build(&site);
    assert_eq!(sink.get("good.html"), Some("ok"));
    assert_eq!(sink.len(), 1);
    assert!(!report.is_success());

    let templates: Vec<&str> = report.failures.iter().map(|f| f.template.as_str()).collect();
    assert_eq!(templates, ["bad.tpl", "worse.tpl"]);
    assert!(report.failures[0].message.contains("@repeat"));
    assert!(report.failures[1].message.contains("cannot read `field` of null"));
}

#[test]
fn test_compile_errors_are_reported() {
    let site = site(&[("broken.tpl", "@if(x)\nunclosed"), ("index.tpl", "fine")]);
    let (report, sink) = build(&site);
    assert_eq!(sink.get("index.html"), Some("fine"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].template, "broken.tpl");
    assert!(report.failures[0].message.contains("failed to compile"));

    let diagnostics = site.diagnostics("broken.tpl").expect("template exists");
    assert!(diagnostics.has_errors());
    assert!(matches!(
        site.template("broken.tpl"),
        Err(SiteError::Compile { path, .. }) if path == "broken.tpl"
    ));
}

#[test]
fn test_failed_page_status_is_kept() {
    let site = site(&[("worse.tpl", "@let(x = null.field)\nx")]);
    site.begin_pass();
    assert!(site.page("worse", None, None).is_err());
    let generation = site.generation("default").expect("default generation");
    let pages = site.template_pages("worse.tpl", &generation).expect("set exists");
    assert_eq!(pages[0].status(), PageStatus::Failed);
}

// ══════════════════════════════════════════════════════════════════════════════
// Asset jobs
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_asset_jobs_are_queued_once() {
    let site = site(&[
        ("blog/cover.png", "PNG"),
        ("css/site.scss", "body {}"),
        (
            "blog/post.tpl",
            "<img src=\"@{ copy_file('cover.png') }\">@{ copy_file('cover.png') }@{ process_file('/css/site.scss', '/css/site.css', 'sass') }",
        ),
    ]);
    let (report, sink) = build(&site);
    assert_eq!(
        sink.get("blog/post.html"),
        Some("<img src=\"/blog/cover.png\">/blog/cover.png/css/site.css")
    );
    assert_eq!(report.jobs, 2);

    let jobs = site.jobs();
    assert_eq!(jobs[0].src, "blog/cover.png");
    assert_eq!(jobs[0].transform, None);
    assert_eq!(jobs[1].dest, "css/site.css");
    assert_eq!(jobs[1].transform.as_deref(), Some("sass"));

    assert_eq!(site.take_jobs().len(), 2);
    assert!(site.jobs().is_empty());
}

#[test]
fn test_copying_a_missing_file_is_isolated() {
    let site = site(&[("index.tpl", "@{ copy_file('missing.png', 'img/m.png') }")]);
    let (_, sink) = build(&site);
    let out = sink.get("index.html").expect("page written");
    assert!(out.contains("`missing.png` not found"), "{out}");
    assert!(site.jobs().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Routine listing & logging
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_routine_source() {
    let site = site(&[("index.tpl", "Hello @name")]);
    let source = site.routine_source("index.tpl").expect("compiles");
    assert!(source.contains("function init(scope, out)"), "{source}");
    assert!(source.contains("return out.finish();"), "{source}");
}

#[test]
fn test_logging_init_installs_once() {
    let _ = folio_compiler::logging::init("warn");
    assert!(folio_compiler::logging::init("warn").is_err());
}
