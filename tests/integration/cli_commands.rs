#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn json_stdout(args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("keyway")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn plan_prints_explain_tree_and_expressions() {
    let topology = fixture("hobbits.toml");
    let output = cargo_bin_cmd!("keyway")
        .arg("plan")
        .arg("--topology")
        .arg(&topology)
        .args(["--where", "race = hobbit", "--where", "origin.place = Shire"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("Indexed [index=age-index]"), "{text}");
    assert!(text.contains("key condition: #n1_0 = :v1_0"), "{text}");
    assert!(text.contains("filter: #n2_0.#n2_1 = :v2_0"), "{text}");
    assert!(text.contains("Shire"), "{text}");
}

#[test]
fn plan_redacts_literals() {
    let topology = fixture("hobbits.toml");
    let topology = topology.to_str().expect("utf8 path");
    let output = cargo_bin_cmd!("keyway")
        .args(["plan", "--topology", topology, "--redact"])
        .args(["--where", "name = Legolas"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(!text.contains("Legolas"), "{text}");
    assert!(text.contains(":v1_0 = ?"), "{text}");
}

#[test]
fn plan_emits_json_with_placeholders() {
    let topology = fixture("hobbits.toml");
    let json = json_stdout(&[
        "--format",
        "json",
        "plan",
        "--topology",
        topology.to_str().expect("utf8 path"),
        "--where",
        "race = hobbit",
        "--where",
        "age between 30,60",
        "--where",
        "race_name begins_with Fro",
    ]);
    assert_eq!(json["path"], "Indexed");
    assert_eq!(json["index"], "age-index");
    assert_eq!(
        json["key_condition"],
        "#n1_0 = :v1_0 AND #n2_0 BETWEEN :v2_0 AND :v2_1"
    );
    assert_eq!(json["filter"], "begins_with(#n3_0, :v3_0)");
    assert_eq!(json["names"]["#n2_0"], "age");
    assert_eq!(json["values"][":v2_1"], 60);
    assert_eq!(json["values"][":v3_0"], "Fro");
}

#[test]
fn plan_without_key_conditions_scans() {
    let topology = fixture("hobbits.toml");
    let json = json_stdout(&[
        "--format",
        "json",
        "plan",
        "--topology",
        topology.to_str().expect("utf8 path"),
    ]);
    assert_eq!(json["path"], "Scan");
    assert!(json["index"].is_null());
    assert!(json["key_condition"].is_null());
    assert!(json["filter"].is_null());
}

#[test]
fn query_pages_through_a_fixture() {
    let people = fixture("hobbits.json");
    let people = people.to_str().expect("utf8 path");
    let first = json_stdout(&[
        "--format", "json", "query", "--fixture", people, "--where", "race = hobbit", "--limit",
        "2",
    ]);
    assert_eq!(first["items"][0]["id"], "pippin");
    assert_eq!(first["items"][1]["id"], "merry");
    assert_eq!(first["truncated"], true);
    let cursor = first["next_cursor"].as_str().expect("cursor");

    let second = json_stdout(&[
        "--format", "json", "query", "--fixture", people, "--where", "race = hobbit", "--limit",
        "2", "--cursor", cursor,
    ]);
    assert_eq!(second["items"][0]["id"], "sam");
    assert_eq!(second["items"][1]["id"], "frodo");
}

#[test]
fn query_text_output_and_scan_only() {
    let people = fixture("hobbits.json");
    let output = cargo_bin_cmd!("keyway")
        .arg("query")
        .arg("--fixture")
        .arg(&people)
        .args(["--scan-only", "--where", "origin not_exists"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("\"aragorn\""), "{text}");
    assert!(text.contains("truncated: false"), "{text}");
    assert!(!text.contains("next cursor"), "{text}");
}

#[test]
fn query_rejects_range_key_comparators_it_cannot_express() {
    let people = fixture("hobbits.json");
    cargo_bin_cmd!("keyway")
        .arg("query")
        .arg("--fixture")
        .arg(&people)
        .args(["--where", "race = hobbit", "--where", "age <> 50"])
        .assert()
        .failure();
}

#[test]
fn batch_get_reads_keys_in_order() {
    let people = fixture("hobbits.json");
    let json = json_stdout(&[
        "--format",
        "json",
        "batch-get",
        "--fixture",
        people.to_str().expect("utf8 path"),
        "--key",
        "id=gimli,updateTime=1",
        "--key",
        "id=frodo,updateTime=2",
        "--key",
        "id=nobody,updateTime=1",
    ]);
    let items = json.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "Gimli");
    assert_eq!(items[1]["items"][0], "sting");
}

#[test]
fn config_file_sets_default_page_size() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("keyway.toml");
    fs::write(&config, "default_page_size = 3\n").expect("write config");
    let people = fixture("hobbits.json");
    let output = cargo_bin_cmd!("keyway")
        .env("KEYWAY_CONFIG", &config)
        .args(["--format", "json", "query", "--fixture"])
        .arg(&people)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["items"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["truncated"], true);
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("keyway.toml");
    fs::write(&config, "default_page_size = 0\n").expect("write config");
    let topology = fixture("hobbits.toml");
    cargo_bin_cmd!("keyway")
        .arg("--config")
        .arg(&config)
        .arg("plan")
        .arg("--topology")
        .arg(&topology)
        .assert()
        .failure();
}

#[test]
fn list_pages_through_a_prefix() {
    let media = fixture("media.json");
    let media = media.to_str().expect("utf8 path");
    let first = json_stdout(&[
        "--format", "json", "list", "--objects", media, "--where", "key begins_with photos/",
        "--limit", "3",
    ]);
    assert_eq!(first["bucket"], "media");
    assert_eq!(first["objects"][0]["key"], "photos/2023/beach.jpg");
    assert_eq!(first["objects"][0]["size"], 2048);
    assert_eq!(first["objects"].as_array().map(Vec::len), Some(3));
    assert_eq!(first["truncated"], true);
    let cursor = first["next_cursor"].as_str().expect("cursor");

    let second = json_stdout(&[
        "--format", "json", "list", "--objects", media, "--where", "key begins_with photos/",
        "--limit", "3", "--cursor", cursor,
    ]);
    let keys: Vec<_> = second["objects"]
        .as_array()
        .expect("array")
        .iter()
        .map(|o| o["key"].as_str().expect("key"))
        .collect();
    assert_eq!(keys, ["photos/cover.jpg", "photos/index.html"]);
    assert_eq!(second["truncated"], false);
    assert!(second["next_cursor"].is_null());
}

#[test]
fn list_uses_the_configured_listing_section() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("keyway.toml");
    fs::write(
        &config,
        "[listing]\nbucket = \"media\"\nprefix_field = \"path\"\ndelimiter = \"/\"\n",
    )
    .expect("write config");
    let media = fixture("media.json");
    let output = cargo_bin_cmd!("keyway")
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg("--objects")
        .arg(&media)
        .args(["--where", "path begins_with photos/"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(
        text,
        "photos/cover.jpg\t512\nphotos/index.html\t64\ntruncated: false\n"
    );

    fs::write(&config, "[listing]\nbucket = \"archive\"\n").expect("write config");
    cargo_bin_cmd!("keyway")
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg("--objects")
        .arg(&media)
        .assert()
        .failure();
}
