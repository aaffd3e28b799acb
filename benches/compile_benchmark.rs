//! Benchmark for expression parsing and pipeline compilation
//!
//! Target: compiling a realistic filter should stay well under 1ms

use boom_filter_core::compiler::CompilerContext;
use boom_filter_core::config::load_filters;
use boom_filter_core::expression::cache::{clear_cache, get_or_parse};
use boom_filter_core::expression::{parse, DEFAULT_MAX_DEPTH};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SCHEMA: &str = r#"{
    "type": "record",
    "name": "Alert",
    "fields": [
        {"name": "objectId", "type": "string"},
        {"name": "candidate", "type": {
            "type": "record",
            "name": "Candidate",
            "fields": [
                {"name": "jd", "type": "double"},
                {"name": "magpsf", "type": "float"},
                {"name": "sigmapsf", "type": "float"},
                {"name": "diffmaglim", "type": "float"},
                {"name": "drb", "type": ["null", "float"]},
                {"name": "isdiffpos", "type": "string"}
            ]
        }},
        {"name": "prv_candidates", "type": ["null", {"type": "array", "items": "Candidate"}]}
    ]
}"#;

const CATALOG: &str = r#"{
    "arithmeticVariables": [
        {"name": "color", "variable": "color = candidate.magpsf - candidate.diffmaglim"},
        {"name": "snr", "variable": "snr = \\frac{1.0857}{candidate.sigmapsf}"},
        {"name": "score", "variable": "score = \\sqrt{color^2 + \\left|snr\\right|} \\cdot 2"}
    ],
    "listVariables": [
        {"name": "min_mag", "listCondition": {
            "type": "array", "field": "prv_candidates", "operator": "$min", "subField": "magpsf"
        }},
        {"name": "has_bright", "listCondition": {
            "type": "array", "field": "prv_candidates", "operator": "$anyElementTrue",
            "value": {"id": "e", "logic": "And", "children": [
                {"category": "condition", "id": "e1", "field": "magpsf", "operator": "$lt", "value": 18}
            ]}
        }}
    ]
}"#;

const FILTER: &str = r#"{
    "id": "root",
    "logic": "And",
    "children": [
        {"category": "condition", "id": "c1", "field": "candidate.drb", "operator": "$gt", "value": "0.5"},
        {"category": "condition", "id": "c2", "field": "candidate.isdiffpos", "operator": "$in", "value": ["t", "1"]},
        {"category": "condition", "id": "c3", "field": "score", "operator": "$gt", "value": 3},
        {"category": "condition", "id": "c4", "field": "min_mag", "operator": "$lt", "value": 19},
        {"category": "condition", "id": "c5", "field": "prv_candidates", "operator": "$lengthGt", "value": 2},
        {"category": "block", "id": "b1", "logic": "Or", "children": [
            {"category": "condition", "id": "c6", "field": "has_bright", "operator": "$eq", "value": true},
            {"category": "condition", "id": "c7", "field": "candidate.jd", "operator": "$between", "value": [2459000, 2460000]}
        ]},
        {"category": "block", "id": "b2", "logic": "And", "customBlockName": "faint", "isTrue": false, "children": [
            {"category": "condition", "id": "c8", "field": "candidate.magpsf", "operator": "$gt", "value": 20.5}
        ]}
    ]
}"#;

fn benchmark_compile(c: &mut Criterion) {
    let context = CompilerContext::from_json(SCHEMA, CATALOG, None).expect("context");
    let filters = load_filters(FILTER).expect("filters");

    c.bench_function("compile_filter", |b| {
        b.iter(|| black_box(context.compile(black_box(&filters))))
    });

    c.bench_function("compile_filter_json", |b| {
        b.iter(|| black_box(context.compile_json(black_box(FILTER))))
    });
}

fn benchmark_expression_parsing(c: &mut Criterion) {
    let expressions = vec![
        "a + b",
        r"\frac{candidate.magpsf - candidate.diffmaglim}{2}",
        r"\left|\left|x\right| - y\right|",
        r"\sqrt{color^2 + snr^2} \cdot \log(flux_{g})",
        "-(a * b) ^ 2 / (c - 1e-3)",
    ];

    c.bench_function("expression_parsing_cold", |b| {
        b.iter(|| {
            for expr in &expressions {
                let _ = black_box(parse(expr));
            }
        })
    });

    c.bench_function("expression_parsing_cached", |b| {
        clear_cache();
        for expr in &expressions {
            let _ = get_or_parse(expr, DEFAULT_MAX_DEPTH);
        }

        b.iter(|| {
            for expr in &expressions {
                let _ = black_box(get_or_parse(expr, DEFAULT_MAX_DEPTH));
            }
        })
    });
}

criterion_group!(benches, benchmark_compile, benchmark_expression_parsing);
criterion_main!(benches);
