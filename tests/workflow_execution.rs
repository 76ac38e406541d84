//! Integration tests for step, process and workflow execution

mod common;

use common::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use hostflow::expression::{Expression, Value};
use hostflow::inventory::Host;
use hostflow::module::builtin::CommandModule;
use hostflow::module::{InputError, ModuleResult};
use hostflow::transport::{CancellationToken, CommandOutput, Escalation};
use hostflow::workflow::{
    EscalateConfig, ExecutionConfig, LoopConfig, OutputConfig, Process, ProcessDefaults, Step,
    StepBuilder, Workflow, WorkflowError,
};

fn builder(id: &str, spy: &SpyModule, targets: &[&str]) -> StepBuilder {
    Step::builder(id, id)
        .module(Arc::new(spy.clone()))
        .targets(hosts(targets))
}

fn build(builder: StepBuilder) -> Step {
    builder.build(&ProcessDefaults::default()).unwrap()
}

fn flag(value: &Value, key: &str) -> Option<bool> {
    match value.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

#[tokio::test]
async fn test_step_without_loop_runs_once_per_host() {
    let spy = SpyModule::echo("spy");
    let step = build(builder("once", &spy, &["h1", "h2"]).input("value", template("${host.name}")));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert!(run.is_success());
    assert_eq!(spy.count(), 2);
    let seen: BTreeSet<String> = spy.hosts().into_iter().collect();
    assert_eq!(seen, BTreeSet::from(["h1".to_string(), "h2".to_string()]));

    let output = &run.outputs["h1"];
    assert_eq!(flag(output, "changed"), Some(true));
    assert!(output.get("results").is_none());
    assert_eq!(
        output.get("output").and_then(|o| o.get("value")),
        Some(&Value::from("h1"))
    );
}

#[tokio::test]
async fn test_list_loop_runs_in_order_with_index() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("list", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("['a', 'b', 'c']")))
            .input("item", template("${item}"))
            .input("value", template("${index}")),
    );
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;
    assert!(run.is_success());

    let calls: Vec<(Value, Value)> = spy
        .invocations()
        .into_iter()
        .map(|i| (i.input["item"].clone(), i.input["value"].clone()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (Value::from("a"), Value::from(0)),
            (Value::from("b"), Value::from(1)),
            (Value::from("c"), Value::from(2)),
        ]
    );

    let results = run.outputs["h1"].get("results").and_then(Value::as_map).unwrap();
    let labels: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(labels, vec!["0", "1", "2"]);
}

#[tokio::test]
async fn test_map_loop_visits_each_entry_once() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("map", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("{x: 1, y: 2}")))
            .input("item", template("${item}"))
            .input("value", template("${index}")),
    );
    let (mut ctx, _) = context();

    step.run(&mut ctx).await;

    let pairs: Vec<(Value, Value)> = spy
        .invocations()
        .into_iter()
        .map(|i| (i.input["value"].clone(), i.input["item"].clone()))
        .collect();
    assert_eq!(pairs.len(), 2);
    for expected in [
        (Value::from("x"), Value::from(1)),
        (Value::from("y"), Value::from(2)),
    ] {
        assert_eq!(pairs.iter().filter(|p| **p == expected).count(), 1);
    }
}

#[tokio::test]
async fn test_false_condition_never_invokes_module() {
    let spy = SpyModule::echo("spy");
    let step = build(builder("skip", &spy, &["h1", "h2"]).condition(expr("host.name == 'nobody'")));
    let (mut ctx, display) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 0);
    assert!(run.is_success());
    for host in ["h1", "h2"] {
        assert_eq!(flag(&run.outputs[host], "skipped"), Some(true));
        assert_eq!(flag(&run.outputs[host], "changed"), Some(false));
    }
    assert!(display.lines().iter().any(|l| l.contains("h1:") && l.contains("SKIPPED")));
}

#[tokio::test]
async fn test_continue_on_fail_keeps_host_running() {
    let failing = SpyModule::echo("failing");
    let after = SpyModule::echo("after");
    let s1 = build(
        builder("s1", &failing, &["h1", "h2"])
            .input("fail", template("${host.name == 'h1'}"))
            .output(OutputConfig {
                continue_on_fail: Some(expr("true")),
                ..OutputConfig::default()
            }),
    );
    let s2 = build(builder("s2", &after, &["h1", "h2"]));

    let (mut ctx, display) = context();
    let run = s1.run(&mut ctx).await;
    assert!(run.errors.is_empty());
    assert_eq!(run.tolerated.len(), 1);
    assert_eq!(run.tolerated[0].host, "h1");
    assert_eq!(flag(&run.outputs["h1"], "failed"), Some(true));
    assert_eq!(flag(&run.outputs["h1"], "ignored_failure"), Some(true));
    let lines = display.lines();
    let failed = lines
        .iter()
        .position(|l| l.contains("h1:") && l.ends_with("FAILED"))
        .unwrap();
    assert!(!lines[failed].contains("IGNORED"));
    assert!(lines[failed + 1..]
        .iter()
        .take_while(|l| l.starts_with("    "))
        .any(|l| l == "    WARNING: failure ignored by continue_on_fail"));

    let process = Process::new("p", vec![s1, s2]).unwrap();
    let (mut ctx, _) = context();
    let (output, result) = process.run(&mut ctx).await;
    assert!(result.is_ok());
    assert_eq!(after.count(), 2);
    assert!(output.get("s2", "h1").is_some());
    assert!(!ctx.is_failed("h1"));
}

#[tokio::test]
async fn test_failure_stops_only_the_failing_host() {
    let failing = SpyModule::echo("failing");
    let after = SpyModule::echo("after");
    let s1 = build(builder("s1", &failing, &["h1", "h2"]).input("fail", template("${host.name == 'h1'}")));
    let s2 = build(builder("s2", &after, &["h1", "h2"]));
    let process = Process::new("p", vec![s1, s2]).unwrap();

    let (mut ctx, display) = context();
    let (output, result) = process.run(&mut ctx).await;

    let error = result.unwrap_err();
    assert_eq!(error.failed_hosts(), vec!["h1"]);
    assert_eq!(after.hosts(), vec!["h2".to_string()]);
    assert!(output.get("s2", "h1").is_none());
    assert!(output.get("s2", "h2").is_some());
    assert!(ctx.is_failed("h1"));
    assert!(!ctx.is_failed("h2"));

    let lines = display.lines();
    let failed = lines
        .iter()
        .position(|l| l.contains("h1:") && l.ends_with("FAILED"))
        .unwrap();
    assert_eq!(lines[failed + 1], "    ERROR:   spy failure");
    assert_eq!(lines[failed + 2], "      DETAIL:  requested by input");
}

#[tokio::test]
async fn test_echo_scenario_marks_both_hosts_changed() {
    let spy = SpyModule::new("echo", |_, _| {
        Some(ModuleResult::success(
            true,
            BTreeMap::from([("stdout".to_string(), Value::from("hi"))]),
        ))
    });
    let defaults = ProcessDefaults {
        targets: Some(hosts(&["h1", "h2"])),
        ..ProcessDefaults::default()
    };
    let step = Step::builder("echo", "Echo")
        .module(Arc::new(spy.clone()))
        .condition(expr("true"))
        .build(&defaults)
        .unwrap();
    let workflow = Workflow::new(vec![Process::new("p", vec![step]).unwrap()]);

    let (mut ctx, _) = context();
    let outcome = workflow.run(&mut ctx).await;

    assert!(outcome.is_success());
    let process = outcome.process("p").unwrap();
    for host in ["h1", "h2"] {
        let output = process.get("echo", host).unwrap();
        assert_eq!(flag(output, "changed"), Some(true));
        assert_eq!(
            output.get("output").and_then(|o| o.get("stdout")),
            Some(&Value::from("hi"))
        );
    }
}

#[tokio::test]
async fn test_loop_label_is_stored_with_each_iteration() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("labels", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("['a', 'b']")).with_label(expr("item")))
            .input("item", template("${item}")),
    );
    let (mut ctx, display) = context();

    let run = step.run(&mut ctx).await;

    let results = run.outputs["h1"].get("results").and_then(Value::as_map).unwrap();
    assert_eq!(results.len(), 2);
    for (index, label) in [("0", "a"), ("1", "b")] {
        assert_eq!(results[index].get("label"), Some(&Value::from(label)));
        assert_eq!(
            results[index].get("output").and_then(|o| o.get("item")),
            Some(&Value::from(label))
        );
    }
    assert_eq!(flag(&run.outputs["h1"], "changed"), Some(true));
    let lines = display.lines();
    assert!(lines.iter().any(|l| l.starts_with("  h1->a:")));
    assert!(lines.iter().any(|l| l.starts_with("  h1->b:")));
}

#[tokio::test]
async fn test_repeated_labels_keep_every_iteration() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("same", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("[true, false]")).with_label(expr("'same'")))
            .input("fail", template("${item}")),
    );
    let (mut ctx, display) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 2);
    let output = &run.outputs["h1"];
    assert_eq!(flag(output, "failed"), Some(true));
    let results = output.get("results").and_then(Value::as_map).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(flag(&results["0"], "failed"), Some(true));
    assert_eq!(flag(&results["1"], "failed"), Some(false));
    for iteration in results.values() {
        assert_eq!(iteration.get("label"), Some(&Value::from("same")));
    }
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].label.as_deref(), Some("same"));
    let labelled = display
        .lines()
        .iter()
        .filter(|l| l.starts_with("  h1->same:"))
        .count();
    assert_eq!(labelled, 2);
}

#[tokio::test]
async fn test_failed_iteration_does_not_stop_later_iterations() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("all", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("[true, false, false]")))
            .input("fail", template("${item}")),
    );
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 3);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].label.as_deref(), Some("0"));
    let results = run.outputs["h1"].get("results").and_then(Value::as_map).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(flag(&results["0"], "failed"), Some(true));
    assert_eq!(flag(&results["1"], "changed"), Some(true));
    assert_eq!(flag(&results["2"], "changed"), Some(true));
    assert!(ctx.is_failed("h1"));
}

#[tokio::test]
async fn test_empty_module_output_is_stored() {
    let spy = SpyModule::new("quiet", |_, _| Some(ModuleResult::success(false, BTreeMap::new())));
    let step = build(builder("quiet", &spy, &["h1"]));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert!(run.is_success());
    assert_eq!(
        run.outputs["h1"].get("output"),
        Some(&Value::Map(BTreeMap::new()))
    );
}

#[tokio::test]
async fn test_loop_condition_skips_iterations() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("filtered", &spy, &["h1"])
            .loop_config(LoopConfig::new(expr("[1, 2, 3]")).with_condition(expr("item != 2")))
            .input("item", template("${item}")),
    );
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 2);
    let results = run.outputs["h1"].get("results").and_then(Value::as_map).unwrap();
    assert_eq!(flag(&results["1"], "skipped"), Some(true));
    assert_eq!(flag(&run.outputs["h1"], "skipped"), Some(false));
}

#[tokio::test]
async fn test_changed_condition_overrides_module() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("count", &spy, &["h1"])
            .input("count", Expression::literal(0))
            .output(OutputConfig {
                changed_condition: Some(expr("result.output.count > 0")),
                ..OutputConfig::default()
            }),
    );
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert!(run.is_success());
    assert_eq!(flag(&run.outputs["h1"], "changed"), Some(false));
}

#[tokio::test]
async fn test_failed_condition_marks_failure() {
    let spy = SpyModule::echo("spy");
    let step = build(
        builder("check", &spy, &["h1"])
            .input("count", Expression::literal(3))
            .output(OutputConfig {
                failed_condition: Some(expr("result.output.count > 2")),
                ..OutputConfig::default()
            }),
    );
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].message, "failed_condition is true");
    assert!(ctx.is_failed("h1"));
}

#[tokio::test]
async fn test_escalate_without_impersonation_uses_host_secret() {
    let spy = SpyModule::echo("spy");
    let host = Arc::new(Host::new("h1", Arc::new(MockTransport::default())).with_escalate_secret("s3cret"));
    let step = Step::builder("root", "Root")
        .module(Arc::new(spy.clone()))
        .targets(vec![host])
        .escalate(EscalateConfig {
            escalate: Some(expr("true")),
            impersonate_user: None,
        })
        .build(&ProcessDefaults::default())
        .unwrap();
    let (mut ctx, _) = context();

    step.run(&mut ctx).await;

    assert_eq!(
        spy.invocations()[0].escalation,
        Some(Escalation::AsSelf {
            secret: Some("s3cret".to_string())
        })
    );
}

#[tokio::test]
async fn test_impersonation_and_disabled_escalation() {
    let spy = SpyModule::echo("spy");
    let host = Arc::new(Host::new("h1", Arc::new(MockTransport::default())).with_escalate_secret("s3cret"));
    let impersonate = Step::builder("as-postgres", "As postgres")
        .module(Arc::new(spy.clone()))
        .targets(vec![Arc::clone(&host)])
        .escalate(EscalateConfig {
            escalate: Some(expr("true")),
            impersonate_user: Some(template("postgres")),
        })
        .build(&ProcessDefaults::default())
        .unwrap();
    let plain = Step::builder("plain", "Plain")
        .module(Arc::new(spy.clone()))
        .targets(vec![host])
        .escalate(EscalateConfig {
            escalate: Some(expr("false")),
            impersonate_user: Some(template("postgres")),
        })
        .build(&ProcessDefaults::default())
        .unwrap();
    let (mut ctx, _) = context();

    impersonate.run(&mut ctx).await;
    plain.run(&mut ctx).await;

    let invocations = spy.invocations();
    assert_eq!(
        invocations[0].escalation,
        Some(Escalation::Impersonate {
            user: "postgres".to_string(),
            secret: Some("s3cret".to_string())
        })
    );
    assert_eq!(invocations[1].escalation, None);
}

#[tokio::test]
async fn test_command_module_runs_through_transport() {
    let transport = Arc::new(MockTransport::new(CommandOutput {
        exit_code: 0,
        stdout: "ok\n".to_string(),
        stderr: String::new(),
    }));
    let host = Arc::new(
        Host::new("h1", transport.clone())
            .with_escalate_secret("s3cret")
            .with_var("pkg", "nginx"),
    );
    let step = Step::builder("install", "Install")
        .module(Arc::new(CommandModule))
        .targets(vec![host])
        .input("command", template("install ${var.pkg}"))
        .escalate(EscalateConfig {
            escalate: Some(expr("true")),
            impersonate_user: None,
        })
        .build(&ProcessDefaults::default())
        .unwrap();
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert!(run.is_success());
    let commands = transport.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "install nginx");
    assert_eq!(
        commands[0].1,
        Some(Escalation::AsSelf {
            secret: Some("s3cret".to_string())
        })
    );
    assert_eq!(
        run.outputs["h1"].get("output").and_then(|o| o.get("stdout")),
        Some(&Value::from("ok\n"))
    );
}

#[tokio::test]
async fn test_timeout_fails_the_iteration() {
    let spy = SpyModule::echo("slow").with_delay(Duration::from_secs(5));
    let step = build(builder("slow", &spy, &["h1"]).exec_timeout(template("50ms")));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].message, "module timed out after 50ms");
}

#[tokio::test]
async fn test_timeout_precedence() {
    let plain = SpyModule::echo("plain");
    let with_default = SpyModule::echo("defaulted").with_default_timeout(Duration::from_secs(7));
    let config = ExecutionConfig {
        default_timeout: Duration::from_secs(3),
    };
    let (mut ctx, _) = context_with(config);

    build(builder("a", &plain, &["h1"])).run(&mut ctx).await;
    build(builder("b", &with_default, &["h1"])).run(&mut ctx).await;
    build(builder("c", &with_default, &["h1"]).exec_timeout(template("1m")))
        .run(&mut ctx)
        .await;

    assert_eq!(plain.invocations()[0].timeout, Duration::from_secs(3));
    let timeouts: Vec<Duration> = with_default.invocations().iter().map(|i| i.timeout).collect();
    assert_eq!(timeouts, vec![Duration::from_secs(7), Duration::from_secs(60)]);
}

#[tokio::test]
async fn test_missing_result_is_a_failure() {
    let spy = SpyModule::new("silent", |_, _| None);
    let step = build(builder("silent", &spy, &["h1"]));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(run.errors[0].message, "no result returned from module");
}

#[tokio::test]
async fn test_invalid_input_never_invokes_module() {
    let spy = SpyModule::echo("spy");
    let step = build(builder("bad", &spy, &["h1"]).input("count", template("lots")));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 0);
    assert_eq!(run.errors[0].message, "invalid module input");
}

#[tokio::test]
async fn test_module_validation_failure_never_invokes_module() {
    let spy = SpyModule::echo("spy").with_validator(|host, input| {
        match input.get("count") {
            Some(Value::Number(n)) if *n < 0.0 => Err(InputError::Invalid(format!(
                "count must not be negative on {}",
                host.name()
            ))),
            _ => Ok(()),
        }
    });
    let step = build(builder("validated", &spy, &["h1"]).input("count", Expression::literal(-1)));
    let (mut ctx, display) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 0);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].message, "module validation failed");
    let output = &run.outputs["h1"];
    assert_eq!(flag(output, "failed"), Some(true));
    assert_eq!(
        output.get("error_detail"),
        Some(&Value::from("count must not be negative on h1"))
    );
    assert!(output.get("output").is_none());
    assert!(display
        .lines()
        .contains(&"      DETAIL:  count must not be negative on h1".to_string()));
    assert!(ctx.is_failed("h1"));
}

#[tokio::test]
async fn test_expression_error_is_a_host_failure() {
    let spy = SpyModule::echo("spy");
    let step = build(builder("undefined", &spy, &["h1"]).input("value", template("${nope}")));
    let (mut ctx, _) = context();

    let run = step.run(&mut ctx).await;

    assert_eq!(spy.count(), 0);
    assert_eq!(run.errors[0].message, "failed to evaluate input `value`");
    assert_eq!(flag(&run.outputs["h1"], "failed"), Some(true));
}

#[tokio::test]
async fn test_process_defaults_are_inherited() {
    let spy = SpyModule::echo("spy");
    let defaults = ProcessDefaults {
        targets: Some(hosts(&["h1"])),
        exec_timeout: Some(template("45s")),
        what_if: Some(true),
        input: Some(BTreeMap::from([("value".to_string(), template("inherited"))])),
        ..ProcessDefaults::default()
    };
    let step = Step::builder("s", "S")
        .module(Arc::new(spy.clone()))
        .build(&defaults)
        .unwrap();
    let (mut ctx, _) = context();

    step.run(&mut ctx).await;

    let invocation = &spy.invocations()[0];
    assert!(invocation.what_if);
    assert_eq!(invocation.timeout, Duration::from_secs(45));
    assert_eq!(invocation.input["value"], Value::from("inherited"));
}

#[tokio::test]
async fn test_tasks_expose_earlier_outputs() {
    let first = SpyModule::echo("first");
    let second = SpyModule::echo("second");
    let s1 = build(builder("s1", &first, &["h1"]).input("value", template("from-s1")));
    let s2 = build(
        builder("s2", &second, &["h1"])
            .condition(expr("tasks.s1.changed"))
            .input("value", template("${tasks.s1.output.value}")),
    );
    let process = Process::new("p", vec![s1, s2]).unwrap();
    let (mut ctx, _) = context();

    let (_, result) = process.run(&mut ctx).await;

    assert!(result.is_ok());
    assert_eq!(second.invocations()[0].input["value"], Value::from("from-s1"));
}

#[tokio::test]
async fn test_workflow_stops_at_failing_process_and_closes_transports() {
    let transport = Arc::new(MockTransport::default());
    let host = Arc::new(Host::new("h1", transport.clone()));
    let failing = SpyModule::new("failing", |_, _| Some(ModuleResult::failure("boom", "")));
    let later = SpyModule::echo("later");

    let p1 = Process::new(
        "first",
        vec![Step::builder("s", "S")
            .module(Arc::new(failing))
            .targets(vec![Arc::clone(&host)])
            .build(&ProcessDefaults::default())
            .unwrap()],
    )
    .unwrap();
    let p2 = Process::new(
        "second",
        vec![Step::builder("s", "S")
            .module(Arc::new(later.clone()))
            .targets(vec![host])
            .build(&ProcessDefaults::default())
            .unwrap()],
    )
    .unwrap();
    let workflow = Workflow::new(vec![p1, p2]);

    let (mut ctx, _) = context();
    let outcome = workflow.run(&mut ctx).await;

    assert_eq!(outcome.processes.len(), 1);
    assert_eq!(later.count(), 0);
    assert_eq!(transport.closes(), 1);
    match outcome.into_result() {
        Err(WorkflowError::Process(error)) => assert_eq!(error.process, "first"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_workflow_runs_nothing() {
    let transport = Arc::new(MockTransport::default());
    let host = Arc::new(Host::new("h1", transport.clone()));
    let spy = SpyModule::echo("spy");
    let step = Step::builder("s", "S")
        .module(Arc::new(spy.clone()))
        .targets(vec![host])
        .build(&ProcessDefaults::default())
        .unwrap();
    let workflow = Workflow::new(vec![Process::new("p", vec![step]).unwrap()]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (ctx, _) = context();
    let mut ctx = ctx.with_cancellation(cancel);
    let outcome = workflow.run(&mut ctx).await;

    assert_eq!(spy.count(), 0);
    assert_eq!(transport.closes(), 1);
    assert!(matches!(outcome.error, Some(WorkflowError::Cancelled(ref p)) if p == "p"));
}

#[tokio::test]
async fn test_cancellation_interrupts_running_module() {
    let spy = SpyModule::echo("slow").with_delay(Duration::from_secs(30));
    let step = build(builder("slow", &spy, &["h1"]));
    let cancel = CancellationToken::new();
    let (ctx, _) = context();
    let mut ctx = ctx.with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let run = step.run(&mut ctx).await;
    trigger.await.unwrap();

    assert_eq!(run.errors[0].message, "execution cancelled");
}
