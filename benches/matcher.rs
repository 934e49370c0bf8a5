use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use delta_consumer::core::{ChangeSide, Quad, Term, RDF_TYPE};
use delta_consumer::mapping::{BindingPolicy, Matcher};
use delta_consumer::parsing::{parse_delta_message, MappingRule, RuleCompiler, RuleSource};

const LZ: &str = "http://example.org/graphs/landing-zone";
const TARGET: &str = "http://example.org/graphs/target";

/// `count` rules, each joining a type with one property of its own.
fn rules(count: usize) -> Vec<MappingRule> {
    let sources: Vec<RuleSource> = (0..count)
        .map(|i| {
            RuleSource::new(
                format!("rule-{}.rq", i),
                format!(
                    "PREFIX ex: <http://example.org/>
CONSTRUCT {{ ?s ex:mapped{i} ?v }} WHERE {{ ?s a ex:Class{i} ; ex:prop{i} ?v }}",
                    i = i
                ),
            )
        })
        .collect();
    RuleCompiler::new(LZ, TARGET).compile(&sources).unwrap()
}

fn statements(count: usize) -> Vec<Quad> {
    (0..count)
        .map(|i| {
            let subject = format!("http://example.org/resource/{}", i);
            if i % 2 == 0 {
                Quad::new(subject, RDF_TYPE, Term::iri(format!("http://example.org/Class{}", i % 50)), None)
            } else {
                Quad::new(
                    subject,
                    format!("http://example.org/prop{}", i % 50),
                    Term::literal(format!("value {}", i)),
                    None,
                )
            }
        })
        .collect()
}

fn bench_match_quad(c: &mut Criterion) {
    let quads = statements(1_000);
    let mut group = c.benchmark_group("match_quad");
    for rule_count in [1, 10, 50] {
        let compiled = rules(rule_count);
        for (label, policy) in [("subject_only", BindingPolicy::SubjectOnly), ("all", BindingPolicy::All)] {
            let matcher = Matcher::new(policy);
            group.bench_with_input(BenchmarkId::new(label, rule_count), &compiled, |b, compiled| {
                b.iter(|| {
                    let updates: usize = quads
                        .iter()
                        .map(|quad| matcher.match_quad(compiled, quad, ChangeSide::Inserts).len())
                        .sum();
                    black_box(updates)
                });
            });
        }
    }
    group.finish();
}

fn bench_compile_rules(c: &mut Criterion) {
    c.bench_function("compile 50 rules", |b| b.iter(|| black_box(rules(50))));
}

fn bench_parse_delta_message(c: &mut Criterion) {
    let changes: Vec<String> = (0..1_000)
        .map(|i| {
            format!(
                r#"{{"subject": {{"type": "uri", "value": "http://example.org/resource/{i}"}},
                   "predicate": {{"type": "uri", "value": "http://example.org/name"}},
                   "object": {{"type": "literal", "value": "name {i}", "xml:lang": "en"}}}}"#,
                i = i
            )
        })
        .collect();
    let payload = format!(r#"[{{"inserts": [{}], "deletes": []}}]"#, changes.join(","));

    c.bench_function("parse 1000 changes", |b| {
        b.iter(|| black_box(parse_delta_message(payload.as_bytes()).unwrap()))
    });
}

criterion_group!(benches, bench_match_quad, bench_compile_rules, bench_parse_delta_message);
criterion_main!(benches);
