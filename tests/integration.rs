use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bundle-search"))
}

fn record(machine_name: &str, item: &str, charity: &str) -> String {
    serde_json::json!({
        "machine_name": machine_name,
        "author": "Test Publisher",
        "basic_data": {
            "human_name": format!("{} bundle", machine_name),
            "description": "<p>A bundle</p>",
            "detailed_marketing_blurb": null,
            "short_marketing_blurb": "short",
            "media_type": "game"
        },
        "from_bundle": {
            "tile_short_name": machine_name,
            "start_date|datetime": "2024-01-01T18:00:00",
            "end_date|datetime": "2024-01-15T18:00:00",
            "product_url": format!("/games/{}", machine_name)
        },
        "charity_data": {
            "charity_items": { charity: {"human_name": "Charity", "description_text": "Helps"} }
        },
        "tier_item_data": {
            item: {"human_name": "Item", "description_text": "An item"}
        }
    })
    .to_string()
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("bundles-1.jsonl"),
        format!(
            "{}\n{}\n",
            record("alpha", "sword", "kids_fund"),
            record("beta", "shield", "kids_fund")
        ),
    )
    .unwrap();
    fs::write(
        data_dir.join("bundles-2.jsonl"),
        format!("{}\n", record("gamma", "sword", "sea_trust")),
    )
    .unwrap();
    fs::write(data_dir.join("notes.txt"), "not a bundle file").unwrap();

    let config_content = format!(
        r#"[ingest]
data_dir = "{}/data"
cache_path = "{}/cache/cache.json"

[server]
log_level = "warn"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("bundle-search.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cli(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_dry_run_counts_records() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cli(&config_path, &["load", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"));
    assert!(stdout.contains("records: 3"));
    assert!(stdout.contains("distinct items: 2"));
    assert!(stdout.contains("distinct charities: 2"));
}

#[test]
fn test_dry_run_respects_limit() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_cli(&config_path, &["load", "--dry-run", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("files: 1"));
    assert!(stdout.contains("records: 1"));
}

#[test]
fn test_dry_run_does_not_write_cache() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success) = run_cli(&config_path, &["load", "--dry-run"]);
    assert!(success);
    assert!(!tmp.path().join("cache").join("cache.json").exists());
}

#[test]
fn test_dry_run_reports_bad_line() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("data").join("bundles-3.jsonl"),
        "{\"machine_name\": \n",
    )
    .unwrap();

    let (_, stderr, success) = run_cli(&config_path, &["load", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("bundles-3.jsonl:1"), "stderr={}", stderr);
}

#[test]
fn test_load_missing_data_dir_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_cli(
        &config_path,
        &["load", "--dry-run", "--data-dir", "/nonexistent/bundles"],
    );
    assert!(!success);
    assert!(stderr.contains("data directory does not exist"));
}

#[test]
fn test_whitespace_search_is_a_no_op() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cli(&config_path, &["search", "   "]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[embedding]\nprovider = \"openai\"\n").unwrap();

    let (_, stderr, success) = run_cli(&bad, &["load", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("openai"), "stderr={}", stderr);
}
