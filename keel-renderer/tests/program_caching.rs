use std::sync::Arc;

use keel_core::{Inputs, TemplateValue};
use keel_renderer::{CacheMode, Engine, EngineCache, EngineOptions, Rendered};
use rstest::rstest;
use serde_json::json;

fn inputs(value: TemplateValue) -> Inputs {
    match value {
        TemplateValue::Object(map) => map,
        other => panic!("inputs must be an object, got {other}"),
    }
}

#[test]
fn same_key_set_reuses_environment_and_program() {
    let engine = Engine::new();
    let template = json!("${x * 10}");

    let first = engine.render(&template, &inputs(json!({"x": 1}))).expect("render");
    let second = engine.render(&template, &inputs(json!({"x": 2}))).expect("render");

    assert_eq!(first, Rendered::Value(json!(10)));
    assert_eq!(second, Rendered::Value(json!(20)));

    let stats = engine.cache().stats();
    assert_eq!(stats.environment_misses, 1);
    assert_eq!(stats.environment_hits, 1);
    assert_eq!(stats.program_misses, 1);
    assert_eq!(stats.program_hits, 1);
    assert_eq!(engine.cache().program_cache_len(), 1);
}

#[test]
fn one_render_builds_its_environment_once() {
    let engine = Engine::new();
    engine
        .render(&json!({"a": "${x}", "b": "${x + 1}", "c": ["${x}"]}), &inputs(json!({"x": 1})))
        .expect("render");
    let stats = engine.cache().stats();
    assert_eq!(stats.environment_misses, 1);
    assert_eq!(stats.environment_hits, 0);
    // `${x}` appears twice; the second is a program hit.
    assert_eq!(stats.program_misses, 2);
    assert_eq!(stats.program_hits, 1);
}

#[test]
fn different_key_sets_get_separate_environments() {
    let engine = Engine::new();
    engine.render(&json!("${x}"), &inputs(json!({"x": 1}))).expect("render");
    engine
        .render(&json!("${x}"), &inputs(json!({"x": 1, "y": 2})))
        .expect("render");
    assert_eq!(engine.cache().environment_cache_len(), 2);
    assert_eq!(engine.cache().program_cache_len(), 2);
}

#[test]
fn failed_compiles_are_not_cached() {
    let engine = Engine::new();
    for _ in 0..2 {
        assert!(engine.render(&json!("${x +}"), &inputs(json!({"x": 1}))).is_err());
    }
    assert_eq!(engine.cache().program_cache_len(), 0);
    assert_eq!(engine.cache().stats().program_misses, 2);
}

#[rstest]
#[case::unbounded(CacheMode::Unbounded, 3)]
#[case::bounded(CacheMode::Bounded(2), 2)]
#[case::disabled(CacheMode::Disabled, 0)]
fn program_cache_mode_limits_entries(#[case] mode: CacheMode, #[case] expected_len: usize) {
    let engine = Engine::with_options(&EngineOptions {
        program_cache: mode,
        ..EngineOptions::default()
    });
    let vars = inputs(json!({"x": 1}));
    for expr in ["${x}", "${x + 1}", "${x + 2}"] {
        engine.render(&json!(expr), &vars).expect("render");
    }
    assert_eq!(engine.cache().program_cache_len(), expected_len);
}

#[test]
fn disabled_caches_still_render_correctly() {
    let engine = Engine::with_options(&EngineOptions::uncached());
    for x in 0..3 {
        let out = engine
            .render(&json!("n=${x}"), &inputs(json!({"x": x})))
            .expect("render");
        assert_eq!(out, Rendered::Value(json!(format!("n={x}"))));
    }
    let stats = engine.cache().stats();
    assert_eq!(stats.environment_hits, 0);
    assert_eq!(stats.program_hits, 0);
    assert_eq!(engine.cache().environment_cache_len(), 0);
}

#[test]
fn engines_can_share_one_cache() {
    let cache = Arc::new(EngineCache::default());
    let a = Engine::with_cache(Arc::clone(&cache));
    let b = Engine::with_cache(Arc::clone(&cache));
    a.render(&json!("${x}"), &inputs(json!({"x": 1}))).expect("render");
    b.render(&json!("${x}"), &inputs(json!({"x": 2}))).expect("render");
    assert_eq!(cache.stats().program_hits, 1);
}

#[test]
fn concurrent_renders_agree_with_sequential_results() {
    let engine = Engine::new();
    let template = json!({
        "name": "${metadata.name}",
        "replicas": "${parameters.replicas * 2}",
        "labels": {"app": "${metadata.name}-${hash(metadata.name)}"},
    });

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let engine = engine.clone();
            let template = &template;
            scope.spawn(move || {
                for i in 0..25 {
                    let name = format!("svc-{worker}-{i}");
                    let vars = inputs(json!({
                        "metadata": {"name": name.clone()},
                        "parameters": {"replicas": i},
                    }));
                    let out = engine
                        .render(template, &vars)
                        .expect("render")
                        .into_value()
                        .expect("value");
                    assert_eq!(out["name"], json!(name));
                    assert_eq!(out["replicas"], json!(i * 2));
                    let expected_label = format!("{name}-{}", keel_renderer::fnv_hash(&name));
                    assert_eq!(out["labels"]["app"], json!(expected_label));
                }
            });
        }
    });

    let stats = engine.cache().stats();
    assert_eq!(engine.cache().environment_cache_len(), 1);
    assert_eq!(engine.cache().program_cache_len(), 3);
    assert_eq!(stats.environment_hits + stats.environment_misses, 200);
}
