//! Performance benchmarks for expression evaluation and workflow fan-out

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use hostflow::config::{parse_inventory, parse_workflow};
use hostflow::expression::{Expression, Value};
use hostflow::module::ModuleRegistry;
use hostflow::workflow::{ExecutionConfig, RecordingDisplay, WorkflowContext};

fn create_inventory_yaml(num_hosts: usize) -> String {
    let mut yaml = String::from("hosts:\n");
    for i in 0..num_hosts {
        yaml.push_str(&format!(
            "  host{i}:\n    transport: none\n    vars: {{index: {i}, role: web}}\n"
        ));
    }
    yaml.push_str("groups:\n  all: [");
    let names: Vec<String> = (0..num_hosts).map(|i| format!("host{i}")).collect();
    yaml.push_str(&names.join(", "));
    yaml.push_str("]\n");
    yaml
}

const WORKFLOW: &str = r#"
processes:
  - name: Bench
    targets: [all]
    steps:
      - id: check
        name: Check
        module: assert
        condition: "var.role == 'web'"
        input:
          condition: "${var.index >= 0}"
      - id: loop
        name: Loop
        module: message
        loop:
          items: "[1, 2, 3, 4]"
        input:
          message: "item ${item} on ${host.name}"
"#;

fn bench_expression_evaluation(c: &mut Criterion) {
    let mut vars = BTreeMap::new();
    vars.insert(
        "result".to_string(),
        Value::map([(
            "output",
            Value::map([("count", Value::from(3)), ("stdout", Value::from("ok"))]),
        )]),
    );
    vars.insert("item".to_string(), Value::from("nginx"));

    let mut group = c.benchmark_group("expression_evaluation");
    group.warm_up_time(Duration::from_secs(1));

    let condition = Expression::parse("result.output.count > 0 && result.output.stdout == 'ok'")
        .unwrap();
    group.bench_function("condition", |b| {
        b.iter(|| black_box(condition.evaluate_bool(black_box(&vars)).unwrap()));
    });

    let template = Expression::template("install ${item} (${result.output.count})").unwrap();
    group.bench_function("template", |b| {
        b.iter(|| black_box(template.evaluate(black_box(&vars)).unwrap()));
    });

    group.bench_function("parse", |b| {
        b.iter(|| black_box(Expression::parse(black_box("(a.b[0] + 1) >= c && !d")).unwrap()));
    });
    group.finish();
}

fn bench_host_fan_out(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let registry = ModuleRegistry::with_defaults();

    let mut group = c.benchmark_group("host_fan_out");
    group.warm_up_time(Duration::from_secs(1));

    for num_hosts in [1, 10, 100] {
        let inventory = parse_inventory(&create_inventory_yaml(num_hosts)).unwrap();
        let workflow = parse_workflow(WORKFLOW, &registry, &inventory).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(num_hosts),
            &workflow,
            |b, workflow| {
                b.to_async(&runtime).iter(|| async {
                    let mut ctx = WorkflowContext::new(
                        ExecutionConfig::default(),
                        Arc::new(RecordingDisplay::new()),
                    );
                    let outcome = workflow.run(&mut ctx).await;
                    black_box(outcome.is_success())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_expression_evaluation, bench_host_fan_out);
criterion_main!(benches);
