use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn aloc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push(format!("aloc{}", std::env::consts::EXE_SUFFIX));
    path
}

const PAGE_V1: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="product-card"><h2 class="product-name">Gaming Laptop</h2><span class="product-price">$999.99</span></div>
</body></html>"#;

const PAGE_V2: &str = r#"<!DOCTYPE html>
<html><body>
  <article class="item"><span class="item-label">Gaming Laptop</span><output class="item-cost">$999.99</output></article>
</body></html>"#;

const PAGE_GONE: &str = r#"<html><body><p>Sold out</p></body></html>"#;

const URL: &str = "https://shop.example/p/1";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let pages = root.join("pages");
    fs::create_dir_all(&pages).unwrap();
    fs::write(pages.join("v1.html"), PAGE_V1).unwrap();
    fs::write(pages.join("v2.html"), PAGE_V2).unwrap();
    fs::write(pages.join("gone.html"), PAGE_GONE).unwrap();

    let config_content = format!(
        r#"[store]
dir = "{}/data/fingerprints"
history_limit = 3

[scoring]
threshold = 0.70

[adaptive]
mode = "adaptive"

[domains.aliases]
"archive.example" = "shop.example"
"#,
        root.display().to_string().replace('\\', "/")
    );

    let config_path = config_dir.join("aloc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn page(tmp: &TempDir, name: &str) -> String {
    tmp.path()
        .join("pages")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn run_aloc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = aloc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run aloc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn save_v1(tmp: &TempDir, config_path: &Path) {
    let v1 = page(tmp, "v1.html");
    let (stdout, stderr, success) =
        run_aloc(config_path, &["save", &v1, ".product-card", "--url", URL]);
    assert!(success, "save failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_save_writes_domain_file() {
    let (tmp, config_path) = setup_test_env();
    let v1 = page(&tmp, "v1.html");

    let (stdout, stderr, success) =
        run_aloc(&config_path, &["save", &v1, ".product-card", "--url", URL]);
    assert!(success, "save failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("shop.example"));
    assert!(tmp
        .path()
        .join("data/fingerprints/shop.example.json")
        .exists());
}

#[test]
fn test_save_without_match_fails() {
    let (tmp, config_path) = setup_test_env();
    let v2 = page(&tmp, "v2.html");
    let (_, stderr, success) =
        run_aloc(&config_path, &["save", &v2, ".product-card", "--url", URL]);
    assert!(!success);
    assert!(stderr.contains("nothing saved"), "stderr={}", stderr);
}

#[test]
fn test_locate_literal_hit() {
    let (tmp, config_path) = setup_test_env();
    let v1 = page(&tmp, "v1.html");
    let (stdout, _, success) =
        run_aloc(&config_path, &["locate", &v1, ".product-card", "--url", URL]);
    assert!(success);
    assert!(stdout.contains("Literal match: 1 element(s)"), "{}", stdout);
    assert!(stdout.contains("Gaming Laptop"));
}

#[test]
fn test_locate_relocates_after_redesign() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v2 = page(&tmp, "v2.html");
    let (stdout, stderr, success) = run_aloc(
        &config_path,
        &["locate", &v2, ".product-card", "--url", URL, "--explain"],
    );
    assert!(success, "locate failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Relocated ["), "{}", stdout);
    assert!(stdout.contains("<article class=\"item\">"));
    assert!(stdout.contains("#1 ["));
}

#[test]
fn test_locate_json_output() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v2 = page(&tmp, "v2.html");
    let (stdout, _, success) = run_aloc(
        &config_path,
        &["locate", &v2, ".product-card", "--url", URL, "--json"],
    );
    assert!(success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "relocated");
    assert_eq!(report["domain"], "shop.example");
    assert_eq!(report["elements"][0]["tag"], "article");
    assert_eq!(report["scores"][0]["sub"]["text"], 1.0);
    assert!(report["scores"][0]["total"].as_f64().unwrap() >= 0.70);
    assert_eq!(report["refresh"], "not_requested");
}

#[test]
fn test_locate_no_match_exits_zero() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let gone = page(&tmp, "gone.html");
    let (stdout, _, success) =
        run_aloc(&config_path, &["locate", &gone, ".product-card", "--url", URL]);
    assert!(success);
    assert!(stdout.contains("No match."));
}

#[test]
fn test_literal_mode_does_not_relocate() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v2 = page(&tmp, "v2.html");
    let (stdout, _, success) = run_aloc(
        &config_path,
        &["locate", &v2, ".product-card", "--url", URL, "--mode", "literal"],
    );
    assert!(success);
    assert!(stdout.contains("No match."));
}

#[test]
fn test_threshold_override() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v2 = page(&tmp, "v2.html");
    let (stdout, _, success) = run_aloc(
        &config_path,
        &["locate", &v2, ".product-card", "--url", URL, "--threshold", "0.99"],
    );
    assert!(success);
    assert!(stdout.contains("No match."));
}

#[test]
fn test_alias_domain_shares_fingerprints() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v2 = page(&tmp, "v2.html");
    let (stdout, _, success) = run_aloc(
        &config_path,
        &[
            "locate",
            &v2,
            ".product-card",
            "--url",
            "https://archive.example/web/2024/p/1",
        ],
    );
    assert!(success);
    assert!(stdout.contains("Relocated ["), "{}", stdout);

    let (stdout, _, _) = run_aloc(
        &config_path,
        &["locate", &v2, ".product-card", "--domain", "other.example"],
    );
    assert!(stdout.contains("No match."));
}

#[test]
fn test_invalid_locator_fails() {
    let (tmp, config_path) = setup_test_env();
    let v1 = page(&tmp, "v1.html");
    let (_, stderr, success) = run_aloc(&config_path, &["locate", &v1, "div >", "--url", URL]);
    assert!(!success);
    assert!(stderr.contains("Invalid locator"), "stderr={}", stderr);
}

#[test]
fn test_missing_domain_fails() {
    let (tmp, config_path) = setup_test_env();
    let v2 = page(&tmp, "v2.html");
    let (_, stderr, success) = run_aloc(&config_path, &["locate", &v2, ".product-card"]);
    assert!(!success);
    assert!(stderr.contains("No domain key"), "stderr={}", stderr);
}

#[test]
fn test_list_show_and_domains() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let (stdout, _, success) = run_aloc(&config_path, &["domains"]);
    assert!(success);
    assert!(stdout.contains("shop.example"));

    let (stdout, _, success) = run_aloc(&config_path, &["list", "--domain", "shop.example"]);
    assert!(success);
    assert!(stdout.contains(".product-card"));
    assert!(stdout.contains("div"));

    let (stdout, _, success) = run_aloc(
        &config_path,
        &["show", ".product-card", "--domain", "shop.example"],
    );
    assert!(success);
    let fp: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(fp["tag"], "div");
    assert_eq!(fp["domain_key"], "shop.example");
    assert_eq!(fp["text_signature"]["snippet"], "gaming laptop $999.99");
}

#[test]
fn test_save_on_literal_hit_keeps_history() {
    let (tmp, config_path) = setup_test_env();
    save_v1(&tmp, &config_path);

    let v1 = page(&tmp, "v1.html");
    let (stdout, _, success) = run_aloc(
        &config_path,
        &["locate", &v1, ".product-card", "--url", URL, "--save"],
    );
    assert!(success);
    assert!(stdout.contains("Fingerprint saved."));

    let (stdout, _, _) = run_aloc(
        &config_path,
        &["show", ".product-card", "--domain", "shop.example", "--history"],
    );
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["history"].as_array().unwrap().len(), 1);
}

#[test]
fn test_corrupt_store_file_is_cold_start() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("data/fingerprints");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("shop.example.json"), "{ truncated").unwrap();

    let v2 = page(&tmp, "v2.html");
    let (stdout, _, success) =
        run_aloc(&config_path, &["locate", &v2, ".product-card", "--url", URL]);
    assert!(success);
    assert!(stdout.contains("No match."));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    // default store dir is relative, so run from an empty directory
    let output = Command::new(aloc_binary())
        .current_dir(tmp.path())
        .args(["--config", "absent.toml", "domains"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No fingerprints stored"), "{}", stdout);
}

#[test]
fn test_bad_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("aloc.toml");
    fs::write(&path, "[scoring.weights]\ntext = 2.0\n").unwrap();
    let (_, stderr, success) = run_aloc(&path, &["domains"]);
    assert!(!success);
    assert!(stderr.contains("weights"), "stderr={}", stderr);
}
