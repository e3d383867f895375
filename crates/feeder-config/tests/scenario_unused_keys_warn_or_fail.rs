//! Unused config keys are reported; `Fail` turns the report into an error.

use feeder_config::{
    load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy, DEFAULT_CONFIG_YAML,
};

const TYPO_OVERLAY: &str = r#"
relay:
  confirm_timout_ms: 5000
gas:
  max_fee_gwei: 40
"#;

#[test]
fn builtin_defaults_are_fully_consumed() {
    let loaded = load_layered_yaml_from_strings(&[DEFAULT_CONFIG_YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "{:?}", report.unused_leaf_pointers);
}

#[test]
fn warn_policy_reports_typos_without_failing() {
    let loaded = load_layered_yaml_from_strings(&[DEFAULT_CONFIG_YAML, TYPO_OVERLAY]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/gas/max_fee_gwei".to_string(),
            "/relay/confirm_timout_ms".to_string()
        ]
    );
}

#[test]
fn fail_policy_rejects_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[DEFAULT_CONFIG_YAML, TYPO_OVERLAY]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"), "{err}");
}
