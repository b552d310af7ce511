use logmine::config::{ClusterConfig, ConfigError, FailurePolicy, ReductionShape};
use logmine::pipeline::{cluster_lines, cluster_single_pass, BatchFailure, Coordinator, PipelineError};
use logmine::source::{LineSource, RawLine, SourceError, VecSource};

const LOGIN_LINES: [&str; 3] = ["user 10 login ok", "user 11 login ok", "user 12 login fail"];

fn config(assign: f64, merge: f64) -> ClusterConfig {
    ClusterConfig {
        assign_threshold: assign,
        merge_threshold: merge,
        ..ClusterConfig::default()
    }
}

#[test]
fn single_batch_groups_login_lines() {
    let report = cluster_lines(&LOGIN_LINES, config(0.34, 0.34)).unwrap();
    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.find("user <*> login ok").unwrap().count, 2);
    assert_eq!(report.find("user 12 login fail").unwrap().count, 1);
    assert_eq!(report.summary.total_records, 3);
    assert_eq!(report.summary.clustered_records, 3);
    assert_eq!(report.summary.batches, 1);
}

#[test]
fn split_batches_reach_the_same_clusters() {
    let cfg = ClusterConfig { batch_size: 2, ..config(0.34, 0.34) };
    let report = cluster_lines(&LOGIN_LINES, cfg).unwrap();
    assert_eq!(report.summary.batches, 2);
    assert_eq!(report.clusters.len(), 2);

    let ok = report.find("user <*> login ok").unwrap();
    assert_eq!(ok.count, 2);
    assert_eq!(ok.batches, vec![0]);
    let fail = report.find("user 12 login fail").unwrap();
    assert_eq!(fail.count, 1);
    assert_eq!(fail.batches, vec![1]);
}

#[test]
fn sequential_reduction_matches_on_separable_input() {
    let lines: Vec<String> = (0..12)
        .map(|i| if i % 3 == 0 { format!("disk {i} full now") } else { format!("user {i} login ok") })
        .collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

    let balanced = cluster_lines(&lines, ClusterConfig { batch_size: 2, ..config(0.34, 0.34) }).unwrap();
    let sequential = cluster_lines(
        &lines,
        ClusterConfig { batch_size: 2, reduction: ReductionShape::Sequential, ..config(0.34, 0.34) },
    )
    .unwrap();

    for report in [&balanced, &sequential] {
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.find("user <*> login ok").unwrap().count, 8);
        assert_eq!(report.find("disk <*> full now").unwrap().count, 4);
    }
    assert_eq!(balanced.summary.reduction, ReductionShape::Balanced);
    assert_eq!(sequential.summary.reduction, ReductionShape::Sequential);
}

#[test]
fn many_small_batches_across_waves() {
    let lines: Vec<String> = (0..10)
        .map(|i| if i % 2 == 0 { format!("user {i} login ok") } else { format!("disk {i} full now") })
        .collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let cfg = ClusterConfig { batch_size: 1, parallelism: 3, threads: 2, ..config(0.34, 0.34) };

    let report = cluster_lines(&lines, cfg.clone()).unwrap();
    assert_eq!(report.summary.batches, 10);
    assert_eq!(report.clusters.len(), 2);
    let user = report.find("user <*> login ok").unwrap();
    let disk = report.find("disk <*> full now").unwrap();
    assert_eq!((user.count, disk.count), (5, 5));
    assert_eq!(user.batches, vec![0, 2, 4, 6, 8]);

    let reference = cluster_single_pass(&lines, &cfg).unwrap();
    assert_eq!(reference.len(), 2);
    assert_eq!(reference.members(), 10);
}

#[test]
fn blank_lines_are_skipped_not_clustered() {
    let report = cluster_lines(&["a b", "", "a b", "   "], config(0.5, 0.5)).unwrap();
    assert_eq!(report.summary.total_records, 4);
    assert_eq!(report.summary.skipped_records, 2);
    assert_eq!(report.summary.clustered_records, 2);
    assert_eq!(report.clusters.len(), 1);
}

#[test]
fn min_members_filters_small_clusters() {
    let cfg = ClusterConfig { min_members: 2, ..config(0.3, 0.3) };
    let report = cluster_lines(&["a b", "a b", "a b", "x y z"], cfg).unwrap();
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].count, 3);
    assert_eq!(report.summary.filtered_records, 1);
    assert_eq!(report.summary.unique_patterns, 1);
}

fn oversized_lines() -> Vec<&'static str> {
    vec!["a b", "a b c d", "a b"]
}

#[test]
fn skip_policy_drops_the_failing_batch() {
    let cfg = ClusterConfig {
        batch_size: 1,
        max_tokens: 3,
        failure_policy: FailurePolicy::Skip,
        ..config(0.5, 0.5)
    };
    let report = cluster_lines(&oversized_lines(), cfg).unwrap();
    assert_eq!(report.failures.len(), 1);
    let failed = &report.failures[0];
    assert_eq!(failed.batch, 1);
    assert_eq!(failed.records, 1);
    assert_eq!(failed.reason, BatchFailure::Oversized { offset: 1, tokens: 4, limit: 3 });
    assert_eq!(report.summary.failed_batches, 1);
    assert_eq!(report.summary.total_records, 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].count, 2);
}

#[test]
fn abort_policy_fails_the_job() {
    let cfg = ClusterConfig { batch_size: 1, max_tokens: 3, ..config(0.5, 0.5) };
    let err = cluster_lines(&oversized_lines(), cfg).unwrap_err();
    match err {
        PipelineError::Batch { batch, reason } => {
            assert_eq!(batch, 1);
            assert!(matches!(reason, BatchFailure::Oversized { tokens: 4, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_max_tokens_disables_the_limit() {
    let cfg = ClusterConfig { max_tokens: 0, ..config(0.5, 0.5) };
    let long = vec!["tok"; 10_000].join(" ");
    let report = cluster_lines(&[long.as_str()], cfg).unwrap();
    assert_eq!(report.clusters.len(), 1);
}

#[test]
fn cancelled_job_reports_partial_result() {
    let coordinator = Coordinator::new(config(0.5, 0.5)).unwrap();
    coordinator.cancel_flag().cancel();
    let mut source = VecSource::new(["a b", "a b"]);
    let report = coordinator.run_to_report(&mut source).unwrap();
    assert!(report.summary.cancelled);
    assert_eq!(report.summary.total_records, 0);
    assert!(report.clusters.is_empty());
}

struct FailingSource {
    calls: u64,
}

impl LineSource for FailingSource {
    fn next_batch(&mut self, _max: usize) -> Result<Option<Vec<RawLine>>, SourceError> {
        self.calls += 1;
        if self.calls == 1 {
            Ok(Some(vec![RawLine { id: 0, text: "a b".to_string() }]))
        } else {
            Err(SourceError::Other { offset: 1, reason: "disk vanished".to_string() })
        }
    }
}

#[test]
fn source_errors_are_fatal() {
    let cfg = ClusterConfig { parallelism: 1, failure_policy: FailurePolicy::Skip, ..config(0.5, 0.5) };
    let coordinator = Coordinator::new(cfg).unwrap();
    let err = coordinator.run(&mut FailingSource { calls: 0 }).unwrap_err();
    assert!(matches!(err, PipelineError::Source { batch: 1, .. }));
}

#[test]
fn invalid_config_is_rejected_before_reading() {
    let err = cluster_lines(&LOGIN_LINES, ClusterConfig { batch_size: 0, ..ClusterConfig::default() }).unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::BatchSize(0))));
    let err = Coordinator::new(config(1.5, 0.5)).err().unwrap();
    assert!(matches!(err, PipelineError::Config(ConfigError::OutOfRange { field: "assign_threshold", .. })));
}

#[test]
fn empty_input_gives_empty_report() {
    let report = cluster_lines(&[], ClusterConfig::default()).unwrap();
    assert!(report.clusters.is_empty());
    assert_eq!(report.summary.batches, 0);
    assert!(!report.summary.cancelled);
}
