use std::fs::File;
use std::path::Path;

use arcade_runtime::script_harness::{load_fixture, run_fixture, HarnessOutput};

#[test]
fn paddle_fixture_matches_golden() {
    assert_fixture_matches("tests/fixtures/script_harness/paddle.json", "tests/fixtures/script_harness/paddle.golden.json");
}

#[test]
fn faulty_fixture_matches_golden() {
    assert_fixture_matches("tests/fixtures/script_harness/faulty.json", "tests/fixtures/script_harness/faulty.golden.json");
}

#[test]
fn paddle_fixture_is_stable_across_runs() {
    let fixture = load_fixture("tests/fixtures/script_harness/paddle.json").expect("load fixture");
    let first = run_fixture(&fixture).expect("run fixture first time");
    let second = run_fixture(&fixture).expect("run fixture second time");
    assert_eq!(first, second, "fixture should produce identical output across runs");
}

#[test]
fn missing_script_fails_the_run() {
    let dir = tempfile::tempdir().expect("temp dir");
    let fixture_path = dir.path().join("broken.json");
    std::fs::write(&fixture_path, r#"{ "script": "nowhere.lua" }"#).expect("write fixture");
    let fixture = load_fixture(&fixture_path).expect("load fixture");
    let err = run_fixture(&fixture).expect_err("script does not exist");
    assert!(format!("{err:#}").contains("nowhere.lua"), "unexpected error: {err:#}");
}

fn assert_fixture_matches(fixture_path: &str, golden_path: &str) {
    let fixture = load_fixture(fixture_path).expect("load fixture");
    let output = run_fixture(&fixture).expect("run fixture");
    let golden_file = File::open(Path::new(golden_path)).expect("open golden");
    let golden: HarnessOutput = serde_json::from_reader(golden_file).expect("parse golden");
    assert_eq!(output, golden, "fixture {} diverged from golden {}", fixture_path, golden_path);
}
