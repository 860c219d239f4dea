//! End-to-end evaluation over JSONL fixtures on disk.

use std::io::Write;

use tempfile::NamedTempFile;
use treebeam_eval::{evaluate_file, read_predictions, LengthNorm};

fn write_fixture(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn reads_records_and_skips_blank_lines() {
    let file = write_fixture(&[
        r#"{"target":"x = 1","hypotheses":[{"text":"x = 1","score":-0.2,"length":3}]}"#,
        "",
        r#"{"target":"y()","hypotheses":[]}"#,
    ]);
    let predictions = read_predictions(file.path()).unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].target, "x = 1");
    assert_eq!(predictions[0].hypotheses[0].length, 3);
    assert!(predictions[1].hypotheses.is_empty());
}

#[test]
fn malformed_record_names_the_line() {
    let file = write_fixture(&[
        r#"{"target":"ok","hypotheses":[]}"#,
        r#"{"target": 42}"#,
    ]);
    let err = read_predictions(file.path()).unwrap_err();
    assert!(err.to_string().contains(":2"), "unexpected error: {err}");
}

#[test]
fn missing_file_is_an_error() {
    let err = read_predictions(std::path::Path::new("/nonexistent/preds.jsonl")).unwrap_err();
    assert!(err.to_string().contains("failed to open"));
}

#[test]
fn evaluate_reports_best_of_top_k() {
    // At k=1 only the normalized-best hypothesis counts; at k=2 the exact
    // match inside the top 2 lifts the example to 100.
    let file = write_fixture(&[concat!(
        r#"{"target":"a b c","hypotheses":["#,
        r#"{"text":"abd","score":-0.1,"length":3},"#,
        r#"{"text":"abc","score":-0.5,"length":3}"#,
        r#"]}"#,
    )]);
    let reports =
        evaluate_file(file.path(), &[1, 2], LengthNorm::new(10.0, 0.7)).unwrap();
    assert_eq!(reports.len(), 2);

    assert_eq!(reports[0].top_k, 1);
    assert_eq!(reports[0].examples, 1);
    let one_sub_over_three = (1.0 - 1.0 / 3.0) * 100.0;
    assert!((reports[0].mean_similarity - one_sub_over_three).abs() < 1e-9);
    assert!((reports[0].std_similarity - 0.0).abs() < 1e-12);

    assert_eq!(reports[1].top_k, 2);
    assert!((reports[1].mean_similarity - 100.0).abs() < 1e-9);
}

#[test]
fn examples_without_hypotheses_are_skipped() {
    let file = write_fixture(&[
        r#"{"target":"aa","hypotheses":[{"text":"aa","score":-0.3,"length":2}]}"#,
        r#"{"target":"bb","hypotheses":[]}"#,
    ]);
    let reports = evaluate_file(file.path(), &[5], LengthNorm::new(10.0, 0.7)).unwrap();
    assert_eq!(reports[0].examples, 1);
    assert!((reports[0].mean_similarity - 100.0).abs() < 1e-9);
}

#[test]
fn report_carries_the_normalization_knobs() {
    let file = write_fixture(&[
        r#"{"target":"t","hypotheses":[{"text":"t","score":-1.0,"length":1}]}"#,
    ]);
    let reports = evaluate_file(file.path(), &[1], LengthNorm::new(7.5, 0.4)).unwrap();
    assert_eq!(reports[0].len_norm_base, 7.5);
    assert_eq!(reports[0].len_norm_pow, 0.4);
    assert_eq!(reports[0].path, file.path().display().to_string());
}
