// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_dummy_config(dir: &Path) {
    fs::write(
        dir.join(".m3embedrc.toml"),
        r#"
[tokenizer]
provider = "dummy"
vocab_size = 5000

[model]
provider = "dummy"
dense_dim = 16
sparse_dim = 4
colbert_dim = 8
"#,
    )
    .expect("write config");
}

fn m3embed(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("m3embed"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"));
    for (key, _) in std::env::vars_os() {
        if key.to_string_lossy().starts_with("M3EMBED_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> Value {
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json")
}

#[test]
fn encode_json_emits_reference_records() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());

    let assert = m3embed(dir.path())
        .args([
            "--format",
            "json",
            "encode",
            "Hello world!",
            "the cat and the dog",
        ])
        .assert()
        .success();
    let json = stdout_json(&assert);

    let record = &json["the cat and the dog"];
    assert_eq!(record["dense_vecs"].as_array().expect("dense").len(), 16);

    let colbert = record["colbert_vecs"].as_array().expect("colbert");
    assert_eq!(colbert.len(), 7);
    assert!(colbert
        .iter()
        .all(|v| v.as_array().expect("vector").len() == 8));

    let lexical = record["lexical_weights"].as_object().expect("lexical");
    for (key, weight) in lexical {
        let id: i64 = key.parse().expect("decimal token id");
        assert!(id > 3);
        assert!(weight.as_f64().expect("weight") > 0.0);
    }

    assert!(json["Hello world!"].is_object());
}

#[test]
fn encode_output_round_trips_through_compare() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());
    let texts = dir.path().join("texts.txt");
    fs::write(&texts, "first text\nsecond text here\nthird\n").expect("write texts");

    m3embed(dir.path())
        .args(["encode", "--input", "texts.txt", "--output", "reference.json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote 3 embeddings"));

    let reference: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("reference.json")).unwrap())
            .expect("reference json");
    assert_eq!(reference.as_object().expect("map").len(), 3);

    m3embed(dir.path())
        .args(["compare", "--reference", "reference.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS first text"))
        .stdout(predicate::str::contains("FAIL").not());
}

#[test]
fn compare_reports_mismatching_reference() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());

    m3embed(dir.path())
        .args(["encode", "alpha beta", "--output", "reference.json", "--quiet"])
        .assert()
        .success();

    let path = dir.path().join("reference.json");
    let mut reference: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let record = reference["alpha beta"].as_object_mut().expect("record");
    record.insert("colbert_vecs".to_string(), serde_json::json!([]));
    fs::write(&path, reference.to_string()).unwrap();

    m3embed(dir.path())
        .env("NO_COLOR", "1")
        .args(["compare", "--reference", "reference.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAIL alpha beta"))
        .stdout(predicate::str::contains("multi-vector count 4 != reference 0"))
        .stderr(predicate::str::contains("did not match"));
}

#[test]
fn tokenize_prints_ordered_ids_and_mask() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());

    let assert = m3embed(dir.path())
        .args(["--format", "json", "tokenize", "one two three"])
        .assert()
        .success();
    let json = stdout_json(&assert);

    let ids = json["input_ids"].as_array().expect("ids");
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[0], 2);
    assert_eq!(ids[4], 3);
    assert_eq!(json["attention_mask"], serde_json::json!([1, 1, 1, 1, 1]));
}

#[test]
fn malformed_tokenizer_output_fails_without_result() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join(".m3embedrc.toml"),
        r#"
[tokenizer]
provider = "command"
command = '''echo '{"tokens": [2, 10, 11, 3], "token_indices": [0, 0, 2, 3]}' '''

[model]
provider = "dummy"
dense_dim = 8
"#,
    )
    .unwrap();

    m3embed(dir.path())
        .args(["--format", "json", "encode", "anything"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Malformed tokenization"));
}

#[test]
fn special_tokens_are_configurable_from_env() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join(".m3embedrc.toml"),
        r#"
[tokenizer]
provider = "command"
command = '''echo '{"tokens": [2, 501, 3], "token_indices": [0, 1, 2]}' '''

[model]
provider = "command"
command = '''echo '{"dense_vecs": [[1.0, 0.0]], "sparse_weights": [[[0.9], [0.8], [0.7]]], "colbert_vecs": [[[1, 0], [0, 1], [1, 1]]]}' '''
"#,
    )
    .unwrap();

    let assert = m3embed(dir.path())
        .args(["--format", "json", "--compact", "encode", "x"])
        .assert()
        .success();
    let lexical = stdout_json(&assert)["x"]["lexical_weights"].clone();
    assert_eq!(
        lexical.as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["501"]
    );

    let assert = m3embed(dir.path())
        .env("M3EMBED_SPECIAL_TOKENS", "501")
        .args(["--format", "json", "encode", "x"])
        .assert()
        .success();
    let lexical = stdout_json(&assert)["x"]["lexical_weights"].clone();
    let keys: Vec<String> = lexical.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["2".to_string(), "3".to_string()]);
}

#[test]
fn negative_min_weight_from_env_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());

    m3embed(dir.path())
        .env("M3EMBED_MIN_WEIGHT", "-1")
        .args(["encode", "some text"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("min_weight must be a finite"));
}

#[test]
fn user_config_is_read_from_home() {
    let dir = TempDir::new().expect("tempdir");
    let user_config = dir.path().join(".config").join("m3embed");
    fs::create_dir_all(&user_config).expect("config dir");
    fs::write(
        user_config.join("config.toml"),
        "[model]\nprovider = \"dummy\"\ndense_dim = 24\n",
    )
    .expect("write user config");
    let project = dir.path().join("project");
    fs::create_dir_all(&project).expect("project dir");

    m3embed(&project)
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"))
        .env("NO_COLOR", "1")
        .args(["--dummy", "encode", "Hello world!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("length: 24"));
}

#[test]
fn dummy_flag_works_without_config() {
    let dir = TempDir::new().expect("tempdir");

    m3embed(dir.path())
        .env("NO_COLOR", "1")
        .args(["--dummy", "encode", "Hello world!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Text: Hello world!"))
        .stdout(predicate::str::contains("length: 1024"))
        .stdout(predicate::str::contains("vectors: 4"));
}

#[test]
fn encode_without_texts_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());

    m3embed(dir.path())
        .args(["encode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No texts given"));
}
