//! Update flow against the real process runner and generated POSIX scripts.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use relay_common::{ProcessRunner, RelayConfig};
use relayd::{RelayState, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::common::{RelayRoot, init_test_logging};

fn relay_state(run_timeout: Duration) -> Arc<RelayState> {
    let config = RelayConfig {
        run_timeout,
        ..RelayConfig::default()
    };
    Arc::new(RelayState::new(
        Arc::new(ProcessRunner::new(config.output_limit_bytes)),
        &config,
        config.port,
    ))
}

async fn post_update(state: &Arc<RelayState>, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/update")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = create_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_update_installs_and_reports_state_file_tag() {
    init_test_logging();
    crate::test_log!("TEST START: test_update_installs_and_reports_state_file_tag");

    let root = RelayRoot::with_script(
        r#"printf '{"release_tag":"%s"}' "$tag" > "$cfg/data/grocy-addon-state.json"
echo "updated $repo to $tag""#,
    );
    let state = relay_state(Duration::from_secs(30));

    let (status, json) = post_update(
        &state,
        json!({
            "repository": "https://github.com/Raph563/Grocy",
            "releaseTag": "1.2.3",
            "localRootPath": root.path_str(),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {json}");
    assert_eq!(json["ok"], true);
    assert_eq!(json["installedTag"], "v1.2.3");
    assert_eq!(json["tagSource"], "state_file");
    assert_eq!(json["stdout"], "updated Raph563/Grocy to v1.2.3\n");
    assert!(root.state_file().is_file());

    crate::test_log!("TEST PASS: test_update_installs_and_reports_state_file_tag");
}

#[tokio::test]
async fn test_flags_reach_the_script() {
    init_test_logging();
    crate::test_log!("TEST START: test_flags_reach_the_script");

    let root = RelayRoot::with_script(r#"echo "tag=[$tag] pre=$pre nobackup=$nobackup""#);
    let state = relay_state(Duration::from_secs(30));

    let (status, json) = post_update(
        &state,
        json!({
            "repository": "owner/repo",
            "localRootPath": root.path_str(),
            "includePrerelease": true,
            "noBackup": true,
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stdout"], "tag=[] pre=1 nobackup=1\n");
    // No state file and no requested tag.
    assert_eq!(json["installedTag"], "");
    assert_eq!(json["tagSource"], "requested");

    crate::test_log!("TEST PASS: test_flags_reach_the_script");
}

#[tokio::test]
async fn test_failing_script_returns_output_tails() {
    init_test_logging();
    crate::test_log!("TEST START: test_failing_script_returns_output_tails");

    let root = RelayRoot::with_script("echo downloading\necho 'release not found' >&2\nexit 2");
    let state = relay_state(Duration::from_secs(30));

    let (status, json) = post_update(
        &state,
        json!({"repository": "owner/repo", "localRootPath": root.path_str()}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "Update script failed (exit 2).");
    assert_eq!(json["stdout"], "downloading\n");
    assert_eq!(json["stderr"], "release not found\n");
    assert!(!state.gate.is_running());

    crate::test_log!("TEST PASS: test_failing_script_returns_output_tails");
}

#[tokio::test]
async fn test_timeout_kills_script_and_accepts_next_call() {
    init_test_logging();
    crate::test_log!("TEST START: test_timeout_kills_script_and_accepts_next_call");

    let root = RelayRoot::with_script("if [ -n \"$tag\" ]; then sleep 30; fi\necho quick");
    let state = relay_state(Duration::from_secs(1));

    let (status, json) = post_update(
        &state,
        json!({
            "repository": "owner/repo",
            "releaseTag": "slow",
            "localRootPath": root.path_str(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Update timeout after 1s");
    assert!(!state.gate.is_running());

    let (status, json) = post_update(
        &state,
        json!({"repository": "owner/repo", "localRootPath": root.path_str()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stdout"], "quick\n");

    crate::test_log!("TEST PASS: test_timeout_kills_script_and_accepts_next_call");
}

#[tokio::test]
async fn test_second_request_during_run_conflicts() {
    init_test_logging();
    crate::test_log!("TEST START: test_second_request_during_run_conflicts");

    let root = RelayRoot::with_script("sleep 1\necho first");
    let state = relay_state(Duration::from_secs(30));
    let body = json!({"repository": "owner/repo", "localRootPath": root.path_str()});

    let first = {
        let state = state.clone();
        let body = body.clone();
        tokio::spawn(async move { post_update(&state, body).await })
    };
    while !state.gate.is_running() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, json) = post_update(&state, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Update already running.");

    let (status, json) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stdout"], "first\n");

    crate::test_log!("TEST PASS: test_second_request_during_run_conflicts");
}

#[tokio::test]
async fn test_symlinked_config_outside_root_is_rejected() {
    init_test_logging();
    crate::test_log!("TEST START: test_symlinked_config_outside_root_is_rejected");

    let root = RelayRoot::with_script("echo should-not-run");
    let outside = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(outside.path().join("data")).unwrap();
    std::fs::remove_dir_all(root.path().join("config")).unwrap();
    std::os::unix::fs::symlink(outside.path(), root.path().join("config")).unwrap();
    let state = relay_state(Duration::from_secs(30));

    let (status, json) = post_update(
        &state,
        json!({"repository": "owner/repo", "localRootPath": root.path_str()}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Invalid local root path.");
    assert!(!state.gate.is_running());

    crate::test_log!("TEST PASS: test_symlinked_config_outside_root_is_rejected");
}
