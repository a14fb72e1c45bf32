//! Layering guardrails: the engine must not reach up into the CLI.
//!
//! `harness` is the library surface; `cli` is one consumer of it. This test
//! scans the engine sources and fails if any of them imports from `crate::cli`.

use std::fs;
use std::path::Path;

#[test]
fn harness_does_not_depend_on_cli() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/harness");
    let mut offenders = Vec::new();

    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_none_or(|ext| ext != "rs") {
            continue;
        }
        let source = fs::read_to_string(&path).unwrap();
        for (lineno, line) in source.lines().enumerate() {
            let code = line.split("//").next().unwrap_or("");
            if code.contains("crate::cli") {
                offenders.push(format!("{}:{}", path.display(), lineno + 1));
            }
        }
    }

    assert!(offenders.is_empty(), "harness imports the CLI layer: {offenders:?}");
}
