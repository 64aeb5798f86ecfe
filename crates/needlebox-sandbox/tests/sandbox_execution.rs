//! End-to-end tests for the sandbox executor.

use std::time::{Duration, Instant};

use needlebox_sandbox::{Action, ActionKind, ExecutionStatus, SandboxConfig, SandboxExecutor};

const CONTEXT: &str = "filler line one\nthe secret KEY=4096 is here\nfiller line two\n";

fn executor() -> SandboxExecutor {
    SandboxExecutor::new(CONTEXT, SandboxConfig::default()).unwrap()
}

// -------------------------------------------------------------------------
// Happy paths
// -------------------------------------------------------------------------

#[test]
fn test_extracts_value_from_context() {
    let action = Action::search(
        r#"let m = search(r"KEY=(\d+)")
if m { print group(m, 1) } else { print "Needle not found" }"#,
    );
    let r = executor().execute(&action, Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::Ok);
    assert_eq!(r.stdout(), "4096\n");
    assert!(r.error().is_none());
}

#[test]
fn test_slice_and_summarize_kinds_run() {
    let exec = executor();
    let r = exec.execute(&Action::slice("print head(CONTEXT, 6)"), Duration::from_secs(5));
    assert_eq!(r.stdout(), "filler\n");
    let r = exec.execute(
        &Action::summarize("print len(lines(CONTEXT)), len(words(CONTEXT))"),
        Duration::from_secs(5),
    );
    assert_eq!(r.stdout(), "3 11\n");
}

#[test]
fn test_empty_output_is_still_ok() {
    let r = executor().execute(&Action::search("let x = 1"), Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::Ok);
    assert_eq!(r.stdout(), "");
}

// -------------------------------------------------------------------------
// Isolation
// -------------------------------------------------------------------------

#[test]
fn test_state_does_not_leak_between_actions() {
    let exec = executor();
    let first = exec.execute(&Action::search("let secret = 7"), Duration::from_secs(5));
    assert!(first.is_ok());
    let second = exec.execute(&Action::search("print secret"), Duration::from_secs(5));
    assert_eq!(second.status(), ExecutionStatus::RuntimeError);
    assert!(second.error().unwrap().contains("unknown variable 'secret'"));
}

#[test]
fn test_capability_violations() {
    let exec = executor();
    for body in [
        "import os\nprint 1",
        "let f = open(\"/etc/passwd\")",
        "print subprocess",
        "let x = eval(\"1\")",
        "print getattr(CONTEXT, \"x\")",
    ] {
        let r = exec.execute(&Action::search(body), Duration::from_secs(5));
        assert_eq!(
            r.status(),
            ExecutionStatus::CapabilityViolation,
            "body {body:?} was not rejected"
        );
        assert!(r.stdout().is_empty());
        assert!(r.error().is_some());
    }
}

#[test]
fn test_kind_outside_allow_list_is_violation() {
    let action = Action::new(ActionKind::Custom("shell".into()), "print 1");
    let r = executor().execute(&action, Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::CapabilityViolation);
    assert!(r.error().unwrap().contains("not allowed"));
}

#[test]
fn test_oversized_body_is_violation() {
    let cfg = SandboxConfig {
        max_action_len: 16,
        ..SandboxConfig::default()
    };
    let exec = SandboxExecutor::new(CONTEXT, cfg).unwrap();
    let r = exec.execute(&Action::search("print \"0123456789abcdef\""), Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::CapabilityViolation);
}

// -------------------------------------------------------------------------
// Failure modes
// -------------------------------------------------------------------------

#[test]
fn test_runaway_loop_times_out() {
    let started = Instant::now();
    let r = executor().execute(
        &Action::search("let n = 0\nrepeat 1000000000 { n = n + 1 }"),
        Duration::from_millis(50),
    );
    assert_eq!(r.status(), ExecutionStatus::Timeout);
    assert!(r.stdout().is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_long_operator_chain_fails_cleanly_on_small_stack() {
    let worker = std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(|| {
            let exec = executor();
            let deep = format!("print 1{}", "+1".repeat(2044));
            assert!(deep.len() <= SandboxConfig::default().max_action_len);
            let deep = exec.execute(&Action::search(deep), Duration::from_secs(5));
            let shallow = exec.execute(
                &Action::search(format!("print 1{}", "+1".repeat(200))),
                Duration::from_secs(5),
            );
            (deep, shallow)
        })
        .unwrap();
    let (deep, shallow) = worker.join().unwrap();
    assert_eq!(deep.status(), ExecutionStatus::RuntimeError);
    assert!(deep.error().unwrap().contains("expression deeper"));
    assert_eq!(shallow.stdout(), "201\n");
}

#[test]
fn test_multiplying_replace_stays_within_budget() {
    let snippet = "let s = \"a\"\nrepeat 20 { s = s + s }\nprint len(replace(s, \"a\", head(s, 256)))";
    let budget = Duration::from_millis(20);
    let started = Instant::now();
    let r = executor().execute(&Action::search(snippet), budget);
    assert!(
        matches!(r.status(), ExecutionStatus::Timeout | ExecutionStatus::RuntimeError),
        "{r:?}"
    );
    assert!(r.stdout().is_empty());
    assert!(started.elapsed() < budget + Duration::from_millis(500));

    let r = executor().execute(&Action::search(snippet), Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::RuntimeError);
    assert!(r.error().unwrap().contains("exceeds limit"));
}

#[test]
fn test_invalid_pattern_is_runtime_error_with_line() {
    let r = executor().execute(
        &Action::search("let a = 1\nprint search(\"KEY=(\")"),
        Duration::from_secs(5),
    );
    assert_eq!(r.status(), ExecutionStatus::RuntimeError);
    assert!(r.error().unwrap().starts_with("line 2:"));
}

#[test]
fn test_python_snippet_is_rejected_or_fails() {
    // No denied identifiers, but not valid snippet syntax either.
    let r = executor().execute(
        &Action::search("m = [x for x in CONTEXT]"),
        Duration::from_secs(5),
    );
    assert_eq!(r.status(), ExecutionStatus::RuntimeError);
}

#[test]
fn test_output_is_truncated_not_failed() {
    let cfg = SandboxConfig {
        max_output_chars: 10,
        ..SandboxConfig::default()
    };
    let exec = SandboxExecutor::new(CONTEXT, cfg).unwrap();
    let r = exec.execute(&Action::search("print CONTEXT"), Duration::from_secs(5));
    assert_eq!(r.status(), ExecutionStatus::Ok);
    assert!(r.truncated());
    assert_eq!(r.stdout().chars().count(), 10);
}

// -------------------------------------------------------------------------
// Determinism
// -------------------------------------------------------------------------

#[test]
fn test_same_action_same_observation() {
    let exec = executor();
    let action = Action::search(r#"for m in find_all(r"line (\w+)") { print group(m, 1), start(m) }"#);
    let a = exec.execute(&action, Duration::from_secs(5));
    let b = exec.execute(&action, Duration::from_secs(5));
    assert!(a.is_ok());
    assert!(a.same_observation(&b));
    assert_eq!(a.stdout(), "one 7\ntwo 51\n");
}

#[test]
fn test_executor_is_shareable_across_threads() {
    let exec = executor();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let exec = exec.clone();
            std::thread::spawn(move || {
                exec.execute(&Action::search("print count(\"filler\")"), Duration::from_secs(5))
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().stdout(), "2\n");
    }
}
