// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

fn compile(rules: Vec<RuleConfig>) -> RuleSet {
    RuleSet::compile(rules).expect("rules compile")
}

#[test]
fn test_first_declared_rule_wins() {
    let rules = compile(vec![
        RuleConfig::new("/blog/*", "/first/:splat"),
        RuleConfig::new("/blog/:slug", "/second/:slug"),
    ]);

    let m = rules.evaluate("/blog/hello", None, false).unwrap();
    assert_eq!(m.rule_index, 0);
    assert_eq!(m.target_path, "/first/hello");

    // Reversed declaration order flips the winner.
    let rules = compile(vec![
        RuleConfig::new("/blog/:slug", "/second/:slug"),
        RuleConfig::new("/blog/*", "/first/:splat"),
    ]);
    let m = rules.evaluate("/blog/hello", None, false).unwrap();
    assert_eq!(m.rule_index, 0);
    assert_eq!(m.target_path, "/second/hello");
}

#[test]
fn test_rule_query_replaces_request_query() {
    let rules = compile(vec![RuleConfig::new(
        "/api/*",
        "/.netlify/functions/echo?a=1&a=2",
    )]);

    let m = rules
        .evaluate("/api/test", Some("foo=1&foo=2"), false)
        .unwrap();
    assert_eq!(m.target_path, "/.netlify/functions/echo");
    assert_eq!(m.target_query.as_deref(), Some("a=1&a=2"));
    assert!(matches!(m.action, RuleAction::Rewrite { status: 200, .. }));
}

#[test]
fn test_redirect_location_uses_rule_query() {
    let rules = compile(vec![RuleConfig::new("/bar", "/?a=1&a=2").with_status(302)]);

    let m = rules.evaluate("/bar", Some("foo=1&foo=2"), false).unwrap();
    assert!(m.is_redirect());
    assert_eq!(
        m.action,
        RuleAction::Redirect {
            status: 302,
            location: "/?a=1&a=2".to_string()
        }
    );
}

#[test]
fn test_request_query_passes_through() {
    let rules = compile(vec![RuleConfig::new("/foo", "/").with_status(301)]);

    let m = rules.evaluate("/foo", Some("a=1&a=2"), false).unwrap();
    assert_eq!(
        m.action,
        RuleAction::Redirect {
            status: 301,
            location: "/?a=1&a=2".to_string()
        }
    );
}

#[test]
fn test_query_placeholder_substitution() {
    let rules = compile(vec![RuleConfig::new("/test id=:id", "/?param=:id")]);

    let m = rules.evaluate("/test", Some("id=1"), false).unwrap();
    assert_eq!(m.params["id"], "1");
    assert_eq!(m.target_query.as_deref(), Some("param=1"));

    // Declared key missing from the request.
    assert!(rules.evaluate("/test", Some("other=1"), false).is_none());
    assert!(rules.evaluate("/test", None, false).is_none());
}

#[test]
fn test_structured_query_map() {
    let rules = compile(vec![
        RuleConfig::new("/lang", "/en").with_query("lang", "en"),
        RuleConfig::new("/lang", "/other/:l").with_query("lang", ":l"),
    ]);

    let m = rules.evaluate("/lang", Some("lang=en"), false).unwrap();
    assert_eq!(m.target_path, "/en");

    let m = rules.evaluate("/lang", Some("x=1&lang=fr"), false).unwrap();
    assert_eq!(m.target_path, "/other/fr");
}

#[test]
fn test_splat_into_query() {
    let rules = compile(vec![RuleConfig::new(
        "/baz/*",
        "/.netlify/functions/echo?query=:splat",
    )]);

    let m = rules.evaluate("/baz/abc", None, false).unwrap();
    assert_eq!(m.params[SPLAT], "abc");
    assert_eq!(m.target_query.as_deref(), Some("query=abc"));
}

#[test]
fn test_static_file_blocks_non_forced_rules() {
    let rules = compile(vec![
        RuleConfig::new("/index.html", "/soft"),
        RuleConfig::new("/index.html", "/hard").forced(),
    ]);

    let m = rules.evaluate("/index.html", None, true).unwrap();
    assert_eq!(m.target_path, "/hard");
    assert!(m.force);

    let m = rules.evaluate("/index.html", None, false).unwrap();
    assert_eq!(m.target_path, "/soft");
}

#[test]
fn test_trailing_slash_is_ignored() {
    let rules = compile(vec![RuleConfig::new("/docs/", "/manual").with_status(301)]);
    assert!(rules.evaluate("/docs", None, false).is_some());
    assert!(rules.evaluate("/docs/", None, false).is_some());
}

#[test]
fn test_absolute_targets() {
    let rules = compile(vec![
        RuleConfig::new("/ext/*", "https://example.com/:splat").with_status(302),
        RuleConfig::new("/proxy/*", "http://localhost:3000/:splat"),
    ]);

    let m = rules.evaluate("/ext/a/b", Some("x=1"), false).unwrap();
    assert_eq!(
        m.action,
        RuleAction::Redirect {
            status: 302,
            location: "https://example.com/a/b?x=1".to_string()
        }
    );

    let m = rules.evaluate("/proxy/api", None, false).unwrap();
    assert_eq!(
        m.action,
        RuleAction::Proxy {
            url: "http://localhost:3000/api".to_string(),
            status: 200
        }
    );
}

#[test]
fn test_custom_status_rewrite() {
    let rules = compile(vec![RuleConfig::new("/*", "/missing.html").with_status(404)]);
    let m = rules.evaluate("/nope", None, false).unwrap();
    assert_eq!(
        m.action,
        RuleAction::Rewrite {
            path: "/missing.html".to_string(),
            query: None,
            status: 404
        }
    );
}

#[test]
fn test_location_is_percent_encoded() {
    let rules = compile(vec![RuleConfig::new("/go/:name", "/files/:name").with_status(301)]);
    let m = rules.evaluate("/go/ünïcode file", None, false).unwrap();
    match m.action {
        RuleAction::Redirect { location, .. } => {
            assert_eq!(location, "/files/%C3%BCn%C3%AFcode%20file");
        }
        other => panic!("expected redirect, got {other:?}"),
    }
}

#[test]
fn test_absolute_location_is_percent_encoded() {
    let rules = compile(vec![
        RuleConfig::new("/go/*", "https://example.com/:splat").with_status(301),
        RuleConfig::new("/api/*", "http://localhost:3000/v1/:splat"),
    ]);

    let location = |path: &str| match rules.evaluate(path, None, false).unwrap().action {
        RuleAction::Redirect { location, .. } => location,
        other => panic!("expected redirect, got {other:?}"),
    };
    assert_eq!(location("/go/a b"), "https://example.com/a%20b");
    assert_eq!(location("/go/café"), "https://example.com/caf%C3%A9");
    assert_eq!(location("/go/plain/path"), "https://example.com/plain/path");
    assert!(hyper::header::HeaderValue::from_str(&location("/go/café")).is_ok());

    match rules.evaluate("/api/a b", None, false).unwrap().action {
        RuleAction::Proxy { url, .. } => assert_eq!(url, "http://localhost:3000/v1/a%20b"),
        other => panic!("expected proxy, got {other:?}"),
    }
}

#[test]
fn test_encode_path_escapes_reserved_bytes() {
    assert_eq!(encode_path("/[test]/a?b#c"), "/%5Btest%5D/a%3Fb%23c");
    assert_eq!(encode_path("/keep/-._~!$&'()*+,;=:@"), "/keep/-._~!$&'()*+,;=:@");
    assert_eq!(encode_path("/100%"), "/100%25");
}

#[test]
fn test_load_time_errors() {
    let err = RuleSet::compile(vec![RuleConfig::new("", "/x")]).unwrap_err();
    assert_eq!(err, RuleError::EmptyFrom { index: 1 });

    let err = RuleSet::compile(vec![
        RuleConfig::new("/ok", "/fine"),
        RuleConfig::new("/a/*/b", "/x"),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        RuleError::Pattern {
            index: 2,
            source: PatternError::MisplacedSplat,
            ..
        }
    ));

    let err = RuleSet::compile(vec![RuleConfig::new("/a/:id", "/b/:name")]).unwrap_err();
    assert!(matches!(
        err,
        RuleError::Pattern {
            source: PatternError::Unresolved(ref n),
            ..
        } if n == "name"
    ));

    let err = RuleSet::compile(vec![RuleConfig::new("/a", "/b").with_status(99)]).unwrap_err();
    assert_eq!(err, RuleError::InvalidStatus { index: 1, status: 99 });

    let err = RuleSet::compile(vec![RuleConfig::new("/a", "  ")]).unwrap_err();
    assert_eq!(err, RuleError::EmptyTo { index: 1 });
}

#[test]
fn test_rule_config_deserialization() {
    let rules: Vec<RuleConfig> = serde_json::from_value(serde_json::json!([
        { "from": "/a", "to": "/b" },
        { "from": "/c", "to": "/d", "status": "302" },
        { "from": "/e", "to": "/f", "status": 404, "force": true, "query": { "k": ":v" } }
    ]))
    .unwrap();

    assert_eq!(rules[0].status, 200);
    assert_eq!(rules[1].status, 302);
    assert_eq!(rules[2].status, 404);
    assert!(rules[2].force);
    assert_eq!(rules[2].query["k"], ":v");
}

#[test]
fn test_parse_query_decodes() {
    let pairs = parse_query("a=1&b=hello+world&c=%5Bx%5D&flag");
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "hello world".to_string()),
            ("c".to_string(), "[x]".to_string()),
            ("flag".to_string(), String::new()),
        ]
    );
}
