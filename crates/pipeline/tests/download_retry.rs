//! Integration tests for download attempts and the retry loop.
//!
//! Covers timeout classification, the shrinking retry set, the final
//! unbounded attempt and how the recovery record follows each attempt.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use assetgen_core::types::AssetKey;
use assetgen_events::GenerationEvent;
use assetgen_pipeline::{AbortReason, DownloadOutcome, PipelineError};

use common::*;

// ---------------------------------------------------------------------------
// Test: single attempt
// ---------------------------------------------------------------------------

/// A retryable attempt in which job 5 times out hands back exactly job 5,
/// and the recovery record still holds it.
#[tokio::test]
async fn retryable_timeout_keeps_job_pending() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend.script_job("5", vec![UrlBehavior::Timeout]);
    let state = download_state("Kick.anim", &["5"]);
    let task = state.unique_task_id;
    record(&h, &state).await;

    let outcome = h.orch.download_once(state).await.unwrap();

    assert_matches!(outcome, DownloadOutcome::PartialRetry { remaining, downloaded } => {
        assert_eq!(remaining.job_ids, jobs(&["5"]));
        assert_eq!(remaining.custom_seeds, vec![100]);
        assert!(downloaded.is_empty());
    });
    let rec = h.recovery.get(task).await.unwrap().expect("record kept");
    assert_eq!(rec.job_ids, jobs(&["5"]));
}

/// Downloaded jobs leave the record while timed-out siblings stay in it.
#[tokio::test]
async fn record_is_partially_removed() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend.script_job("5", vec![UrlBehavior::Timeout]);
    let state = download_state("Kick.anim", &["4", "5", "6"]);
    let task = state.unique_task_id;
    record(&h, &state).await;

    let outcome = h.orch.download_once(state).await.unwrap();

    assert_matches!(outcome, DownloadOutcome::PartialRetry { remaining, downloaded } => {
        assert_eq!(remaining.job_ids, jobs(&["5"]));
        assert_eq!(remaining.custom_seeds, vec![101]);
        assert_eq!(downloaded, jobs(&["4", "6"]));
    });
    let rec = h.recovery.get(task).await.unwrap().unwrap();
    assert_eq!(rec.job_ids, jobs(&["5"]));
    assert_eq!(rec.custom_seeds, vec![101]);
}

/// The first job gets the long URL budget, the others a short status check.
#[tokio::test]
async fn first_job_gets_the_long_budget() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    let timeouts = h.orch.config().timeouts.clone();

    h.orch
        .download_once(download_state("Kick.anim", &["a", "b", "c"]))
        .await
        .unwrap();

    let budgets: Vec<Duration> = h
        .backend
        .resolve_calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, d)| *d)
        .collect();
    assert_eq!(
        budgets,
        vec![
            timeouts.motion_download_create_url_retry,
            timeouts.status_check_create_url_retry,
            timeouts.status_check_create_url_retry,
        ]
    );
}

/// A job whose URL never arrives is timed out by its own budget rather
/// than stalling the attempt.
#[tokio::test(start_paused = true)]
async fn hanging_job_times_out_into_retry_set() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend.script_job("slow", vec![UrlBehavior::Hang]);

    let outcome = h
        .orch
        .download_once(download_state("Kick.anim", &["fast", "slow"]))
        .await
        .unwrap();

    assert_matches!(outcome, DownloadOutcome::PartialRetry { remaining, downloaded } => {
        assert_eq!(remaining.job_ids, jobs(&["slow"]));
        assert_eq!(downloaded, jobs(&["fast"]));
    });
}

/// A non-recoverable server code and an unknown failure are both reported
/// and left out of the attempt, the loop carries on, and neither job leaves
/// the recovery record since neither was downloaded.
#[tokio::test]
async fn hard_failures_are_reported_and_stay_recorded() {
    let mut h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend
        .script_job("expired", vec![UrlBehavior::ServerError("JobExpired")]);
    h.backend
        .script_job("odd", vec![UrlBehavior::ServerError("SomethingNew")]);
    let state = download_state("Kick.anim", &["expired", "odd", "ok"]);
    let task = state.unique_task_id;
    record(&h, &state).await;

    let outcome = h.orch.download_once(state).await.unwrap();

    assert_matches!(outcome, DownloadOutcome::Complete { downloaded } => {
        assert_eq!(downloaded, jobs(&["ok"]));
    });
    let failed: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            GenerationEvent::ItemFailed { job_id, .. } => job_id,
            _ => None,
        })
        .collect();
    assert_eq!(failed, jobs(&["expired", "odd"]));
    let rec = h.recovery.get(task).await.unwrap().expect("failed jobs stay recorded");
    assert_eq!(rec.job_ids, jobs(&["expired", "odd"]));
    assert_eq!(rec.custom_seeds, vec![100, 101]);
}

/// A transient server error on the only job aborts the attempt but keeps
/// the job recorded, and a later resume downloads it.
#[tokio::test]
async fn transient_failure_keeps_job_for_resume() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend
        .script_job("j1", vec![UrlBehavior::ServerError("Http503")]);
    let state = download_state("Kick.anim", &["j1"]);
    let task = state.unique_task_id;
    record(&h, &state).await;

    let outcome = h.orch.download_once(state).await.unwrap();

    assert_matches!(outcome, DownloadOutcome::Aborted(AbortReason::NothingProduced));
    assert!(h.assets.stored_jobs().is_empty());
    let rec = h.recovery.get(task).await.unwrap().expect("undownloaded job stays recorded");
    assert_eq!(rec.job_ids, jobs(&["j1"]));

    let summary = h.orch.resume_interrupted_downloads().await.unwrap();
    assert_eq!(summary.downloaded, jobs(&["j1"]));
    assert!(h.recovery.get(task).await.unwrap().is_none());
}

/// Once the first result is applied, the record no longer asks for
/// auto-apply, so resuming the rest never applies a second result.
#[tokio::test]
async fn applied_result_is_not_applied_again_on_resume() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend.script_job("b", vec![UrlBehavior::Timeout]);
    let mut state = download_state("Kick.anim", &["a", "b"]);
    state.auto_apply = true;
    let task = state.unique_task_id;
    record(&h, &state).await;

    let outcome = h.orch.download_once(state).await.unwrap();

    assert_matches!(outcome, DownloadOutcome::PartialRetry { remaining, .. } => {
        assert!(!remaining.auto_apply);
    });
    let rec = h.recovery.get(task).await.unwrap().unwrap();
    assert_eq!(rec.job_ids, jobs(&["b"]));
    assert!(!rec.auto_apply);

    h.orch.resume_interrupted_downloads().await.unwrap();

    let applied = h.assets.applied.lock().unwrap().clone();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1, std::path::PathBuf::from("mem/Kick.anim/a"));
}

/// An attempt with nothing produced and nothing pending aborts; only
/// developer mode adds a failure notice on top of the per-job reports.
#[tokio::test]
async fn nothing_produced_aborts() {
    for developer_mode in [false, true] {
        let config = assetgen_core::config::OrchestratorConfig {
            developer_mode,
            ..test_config()
        };
        let mut h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), config);
        h.backend
            .script_job("gone", vec![UrlBehavior::ServerError("JobNotFound")]);

        let outcome = h
            .orch
            .download_once(download_state("Kick.anim", &["gone"]))
            .await
            .unwrap();

        assert_matches!(outcome, DownloadOutcome::Aborted(AbortReason::NothingProduced));
        let notices = drain(&mut h.events)
            .iter()
            .filter(|e| matches!(e, GenerationEvent::GenerationFailed { .. }))
            .count();
        assert_eq!(notices, usize::from(developer_mode));
    }
}

/// With simulated server failures in developer mode every resolved job is
/// treated as a hard failure.
#[tokio::test]
async fn simulated_server_failures_drop_jobs() {
    let config = assetgen_core::config::OrchestratorConfig {
        developer_mode: true,
        simulate_server_failures: true,
        ..test_config()
    };
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), config);

    let outcome = h
        .orch
        .download_once(download_state("Kick.anim", &["a"]))
        .await
        .unwrap();

    assert_matches!(outcome, DownloadOutcome::Aborted(AbortReason::NothingProduced));
    assert!(h.assets.stored_jobs().is_empty());
}

// ---------------------------------------------------------------------------
// Test: retry loop
// ---------------------------------------------------------------------------

/// Across attempts the job set only ever shrinks to a subset of the
/// previous one, and every job is eventually downloaded exactly once.
#[tokio::test]
async fn retry_set_shrinks_monotonically() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend
        .script_job("j1", vec![UrlBehavior::Timeout, UrlBehavior::Timeout]);
    h.backend.script_job("j3", vec![UrlBehavior::Timeout]);
    let state = download_state("Kick.anim", &["j1", "j2", "j3"]);
    record(&h, &state).await;

    let mut downloaded = h.orch.download_with_retry(state).await.unwrap();
    downloaded.sort();

    assert_eq!(downloaded, jobs(&["j1", "j2", "j3"]));
    assert_eq!(
        h.backend.resolved_jobs(),
        jobs(&["j1", "j2", "j3", "j1", "j3", "j1"])
    );
    let mut stored = h.assets.stored_jobs();
    stored.sort();
    assert_eq!(stored, jobs(&["j1", "j2", "j3"]));
    assert!(h.recovery.get_all().await.unwrap().is_empty());
}

/// The final attempt resolves URLs without a practical deadline.
#[tokio::test]
async fn final_attempt_uses_unbounded_budget() {
    let config = assetgen_core::config::OrchestratorConfig {
        retry_count: 1,
        ..test_config()
    };
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), config);
    h.backend.script_job("j1", vec![UrlBehavior::Timeout]);
    let timeouts = h.orch.config().timeouts.clone();

    h.orch
        .download_with_retry(download_state("Kick.anim", &["j1"]))
        .await
        .unwrap();

    let budgets: Vec<Duration> = h
        .backend
        .resolve_calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, d)| *d)
        .collect();
    assert_eq!(
        budgets,
        vec![timeouts.motion_download_create_url_retry, timeouts.no_timeout]
    );
}

/// If the final, non-retryable attempt still times out on job 5, the loop
/// fails with a distinct internal error and job 5 stays recoverable.
#[tokio::test]
async fn final_attempt_timeout_is_an_internal_error() {
    let config = assetgen_core::config::OrchestratorConfig {
        retry_count: 0,
        ..test_config()
    };
    let mut h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), config);
    h.backend.script_job("5", vec![UrlBehavior::Timeout]);
    let state = download_state("Kick.anim", &["5"]);
    let task = state.unique_task_id;
    h.orch
        .session()
        .add_placeholders(&AssetKey::from("Kick.anim"), state.progress_task_id, 1);
    record(&h, &state).await;

    let result = h.orch.download_with_retry(state).await;

    assert_matches!(result, Err(PipelineError::TerminalAttemptTimedOut { job_ids }) => {
        assert_eq!(job_ids, jobs(&["5"]));
    });
    let rec = h.recovery.get(task).await.unwrap().expect("job 5 still recoverable");
    assert_eq!(rec.job_ids, jobs(&["5"]));
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, GenerationEvent::PlaceholdersRemoved { .. })));
}

/// An aborted attempt ends the loop as an already-reported failure.
#[tokio::test]
async fn aborted_attempt_is_handled() {
    let h = harness(MemoryAssetStore::with_asset("Kick.anim", b"pose"), test_config());
    h.backend
        .script_job("x", vec![UrlBehavior::ServerError("Forbidden")]);

    let result = h
        .orch
        .download_with_retry(download_state("Kick.anim", &["x"]))
        .await;

    assert_matches!(result, Err(PipelineError::Handled));
    assert_eq!(h.backend.resolved_jobs(), jobs(&["x"]));
}
