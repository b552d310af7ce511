use logmine::config::{ClusterConfig, ConfigError, FailurePolicy, GapPolicy, Normalization, ReductionShape};
use std::io::Write;

#[test]
fn defaults_are_valid() {
    let cfg = ClusterConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.batch_size, 10_000);
    assert_eq!(cfg.gap_policy, GapPolicy::WildcardPad);
    assert_eq!(cfg.reduction, ReductionShape::Balanced);
    assert_eq!(cfg.failure_policy, FailurePolicy::Abort);
    assert!(cfg.parallelism >= 1);
}

#[test]
fn thresholds_outside_unit_interval_are_rejected() {
    let cfg = ClusterConfig { assign_threshold: -0.1, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { field: "assign_threshold", .. })));
    let cfg = ClusterConfig { merge_threshold: 1.01, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { field: "merge_threshold", .. })));
    let cfg = ClusterConfig { assign_threshold: f64::NAN, ..ClusterConfig::default() };
    assert!(cfg.validate().is_err());
    let cfg = ClusterConfig { match_weight: 2.0, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::OutOfRange { field: "match_weight", .. })));
}

#[test]
fn boundary_thresholds_are_accepted() {
    let cfg = ClusterConfig { assign_threshold: 0.0, merge_threshold: 1.0, ..ClusterConfig::default() };
    cfg.validate().unwrap();
}

#[test]
fn sizes_must_be_positive() {
    let cfg = ClusterConfig { batch_size: 0, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::BatchSize(0))));
    let cfg = ClusterConfig { parallelism: 0, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::Parallelism(0))));
}

#[test]
fn length_cutoff_must_be_in_half_open_interval() {
    for bad in [0.0, -1.0, 1.5] {
        let cfg = ClusterConfig { length_ratio_cutoff: bad, ..ClusterConfig::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::LengthCutoff(_))), "cutoff {bad}");
    }
}

#[test]
fn custom_normalization_needs_valid_rules() {
    let cfg = ClusterConfig { normalization: Normalization::Custom, ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::NoVariables)));
    let cfg = ClusterConfig {
        normalization: Normalization::Custom,
        variables: vec!["ip:/[0-9.]+/".into(), "broken".into()],
        ..ClusterConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::Variable { .. })));
}

#[test]
fn bad_delimiters_are_rejected() {
    let cfg = ClusterConfig { delimiters: "(".into(), ..ClusterConfig::default() };
    assert!(matches!(cfg.validate(), Err(ConfigError::Delimiters { .. })));
}

#[test]
fn toml_overrides_only_named_fields() {
    let cfg = ClusterConfig::from_toml_str(
        r#"
batch_size = 500
assign_threshold = 0.3
normalization = "numeric-placeholder"
gap_policy = "truncate"
reduction = "sequential"
failure_policy = "skip"
"#,
    )
    .unwrap();
    assert_eq!(cfg.batch_size, 500);
    assert_eq!(cfg.assign_threshold, 0.3);
    assert_eq!(cfg.merge_threshold, 0.6);
    assert_eq!(cfg.normalization, Normalization::NumericPlaceholder);
    assert_eq!(cfg.gap_policy, GapPolicy::Truncate);
    assert_eq!(cfg.reduction, ReductionShape::Sequential);
    assert_eq!(cfg.failure_policy, FailurePolicy::Skip);
    assert_eq!(cfg.max_tokens, 4096);
}

#[test]
fn unknown_toml_keys_are_errors() {
    let err = ClusterConfig::from_toml_str("batch_sise = 10").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_reads_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "merge_threshold = 0.25").unwrap();
    writeln!(file, "variables = [\"ip:/\\\\d+(\\\\.\\\\d+){{3}}/\"]").unwrap();
    writeln!(file, "normalization = \"custom\"").unwrap();
    file.flush().unwrap();

    let cfg = ClusterConfig::load(file.path()).unwrap();
    assert_eq!(cfg.merge_threshold, 0.25);
    assert_eq!(cfg.variables, vec![r"ip:/\d+(\.\d+){3}/".to_string()]);
    cfg.validate().unwrap();
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ClusterConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
