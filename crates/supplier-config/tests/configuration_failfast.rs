use std::ffi::OsString;
use std::fs;

use ortho_config::OrthoConfig;
use tempfile::TempDir;
use supplier_config::Config;

#[test]
fn malformed_config_file_fails_to_load() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("supplier.toml");

    fs::write(&path, r#"reply_timeout_ms = "soon""#).expect("write malformed config");

    let args = vec![
        OsString::from("supplier"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ];

    let error = Config::load_from_iter(args).expect_err("loading must fail");
    assert!(
        !error.to_string().is_empty(),
        "expected a descriptive error message"
    );
}

#[test]
fn loaded_alias_is_validated() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = temp_dir.path().join("supplier.toml");

    fs::write(&path, "alias_from = \"/warehouse\"\n").expect("write config");

    let args = vec![
        OsString::from("supplier"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ];

    let config = Config::load_from_iter(args).expect("config loads");
    assert!(config.validate().is_err(), "half an alias must be rejected");
}
