//! Dispatching jobs over a scripted transport

use fleetmig_context::Context;
use fleetmig_dispatch::{
    DispatchError, Dispatcher, RemoteTarget, Report, RunOutput, Script, TransportError, Upload,
};
use fleetmig_test_utils::{FakeCall, FakeTransport};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

fn targets(addresses: &[&str]) -> Vec<RemoteTarget> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            RemoteTarget::new(*addr)
                .with_label("default")
                .with_label(i.to_string())
        })
        .collect()
}

#[tokio::test]
async fn test_unreachable_host_still_gets_a_result() {
    let transport = Arc::new(
        FakeTransport::new()
            .with_output("10.0.0.1", RunOutput::ok("hello\n"))
            .unreachable("10.0.0.2"),
    );
    let dispatcher = Dispatcher::new(transport.clone());
    let job = Script::new("echo hello\n").job(&Context::live());

    let results = dispatcher
        .dispatch(&targets(&["10.0.0.1", "10.0.0.2"]), &job)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].target.address, "10.0.0.1");
    assert!(results[0].error.is_none());
    assert_eq!(results[0].stdout, "hello\n");
    assert_eq!(results[1].target.address, "10.0.0.2");
    assert!(matches!(
        results[1].error,
        Some(TransportError::Unreachable { ref host, .. }) if host == "ubuntu@10.0.0.2"
    ));
    assert_eq!(transport.scripts_for("10.0.0.1"), vec!["set -eu\necho hello\n"]);
}

#[tokio::test]
async fn test_nonzero_exit_is_a_problem_without_error() {
    let transport = Arc::new(FakeTransport::new().with_output("10.0.0.3", RunOutput::exited(2, "no such service\n")));
    let dispatcher = Dispatcher::new(transport);

    let results = dispatcher
        .dispatch(&targets(&["10.0.0.3"]), &Script::new("false\n").job(&Context::live()))
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].error.is_none());
    assert_eq!(results[0].code, 2);
    assert!(results[0].is_problem());
}

#[tokio::test]
async fn test_failed_copy_skips_the_script() {
    let transport = Arc::new(FakeTransport::new().failing_copy("10.0.0.2"));
    let dispatcher = Dispatcher::new(transport.clone());
    let job = Script::new("do-op tar xf ~/tools.tgz\n")
        .job_with_upload(&Context::live(), Upload::new("/tmp/juju.tgz", "tools.tgz"));

    let results = dispatcher
        .dispatch(&targets(&["10.0.0.1", "10.0.0.2"]), &job)
        .await;

    assert!(results[0].is_clean());
    assert_eq!(results[0].stdout, "scp /tmp/juju.tgz ubuntu@10.0.0.1:~/tools.tgz");
    assert!(matches!(results[1].error, Some(TransportError::Copy { .. })));
    assert_eq!(results[1].stdout, "scp /tmp/juju.tgz ubuntu@10.0.0.2:~/tools.tgz");
    assert!(transport.scripts_for("10.0.0.2").is_empty());
    assert_eq!(
        transport.scripts_for("10.0.0.1"),
        vec!["set -eu\ntar xf ~/tools.tgz\n"]
    );
}

#[tokio::test]
async fn test_preview_job_never_copies() {
    let transport = Arc::new(FakeTransport::new());
    let dispatcher = Dispatcher::new(transport.clone());
    let job = Script::new("do-op tar xf ~/tools.tgz\n")
        .job_with_upload(&Context::preview(), Upload::keep_name("/tmp/tools.tgz"));

    let results = dispatcher
        .dispatch(&targets(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), &job)
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_clean()));
    assert!(transport.copies().is_empty());
    let scripts = transport.scripts_for("10.0.0.3");
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("echo 'scp /tmp/tools.tgz ~/tools.tgz'"));
    assert!(scripts[0].contains("echo '  run: 'tar xf ~/tools.tgz"));
}

#[tokio::test]
async fn test_custom_user_reaches_transport() {
    let transport = Arc::new(FakeTransport::new());
    let dispatcher = Dispatcher::new(transport.clone()).with_user("admin");

    dispatcher
        .dispatch(&targets(&["10.0.0.1"]), &Script::new("true\n").job(&Context::live()))
        .await;

    assert!(matches!(
        transport.calls().as_slice(),
        [FakeCall::Run { user_host, .. }] if user_host == "admin@10.0.0.1"
    ));
}

#[tokio::test]
async fn test_report_check_counts_problems() {
    let transport = Arc::new(
        FakeTransport::new()
            .unreachable("10.0.0.1")
            .with_output("10.0.0.2", RunOutput::exited(1, "")),
    );
    let dispatcher = Dispatcher::new(transport);
    let results = dispatcher
        .dispatch(
            &targets(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]),
            &Script::new("true\n").job(&Context::live()),
        )
        .await;

    let report = Report::new(&results);
    assert_eq!(report.clean().count(), 1);
    assert_eq!(report.problem_count(), 2);
    let err = report.check().unwrap_err();
    assert!(matches!(err, DispatchError::TargetsFailed { count: 2 }));
    assert_eq!(err.to_string(), "one or more machines had a problem");

    let rendered = report.to_string();
    let clean_at = rendered.find("default 2").unwrap();
    let problem_at = rendered.find("default 0").unwrap();
    assert!(clean_at < problem_at);
}

#[tokio::test]
async fn test_no_targets_no_calls() {
    let transport = Arc::new(FakeTransport::new());
    let dispatcher = Dispatcher::new(transport.clone());
    let upload = Upload::new(PathBuf::from("/tmp/x"), "x");

    let results = dispatcher
        .dispatch(&[], &Script::new("true\n").job_with_upload(&Context::live(), upload))
        .await;

    assert!(results.is_empty());
    assert!(transport.calls().is_empty());
}
