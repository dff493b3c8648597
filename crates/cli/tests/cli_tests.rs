// End-to-end tests for the distmerge binary: job file in, workbook out.
//
// Run with: cargo test -p distmerge-cli --test cli_tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use distmerge_recon::CellValue;
use rust_xlsxwriter::{Format, Workbook};

fn distmerge() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_distmerge"));
    cmd.env_remove("DISTMERGE_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    distmerge().args(args).output().expect("run distmerge")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const SOURCE: &str = "\
Investor,Date,Amount,Memo
Jon Smith,1/15/2024,100.00,wire
John Smith,2024-01-15,50.00,wire
Acme Holdings,1/15/2024,\"$1,250.00\",
Fund Admin,1/15/2024,12.00,fee
Jane Doe,3/31/2024,(300),clawback
Jane Doe,4/30/2024,75.00,outside template
Acme Holdings,3/31/2024,n/a,
";

const JOB: &str = r#"
source = "distributions.csv"
target = "import.xlsx"

[columns]
entity = "Investor"
date = "Date"
amount = "Amount"

[mapping]
"Fund Admin" = ""
"#;

/// Stock import template: blocks for 15 Jan 2024 (F) and 31 Mar 2024 (M),
/// three investors above the GP row.
fn write_template(path: &Path, entity_label: &str) {
    let mut wb = Workbook::new();
    let bold = Format::new().set_bold();
    let ws = wb.add_worksheet();
    for (base, label) in [(5u16, "15 January 2024"), (12, "31 March 2024")] {
        ws.write_string_with_format(0, base, "Distribution Period", &bold).unwrap();
        ws.write_string(2, base, "First Day").unwrap();
        ws.write_string(2, base + 1, "Last Day").unwrap();
        ws.write_string(3, base, label).unwrap();
        ws.write_string(3, base + 1, label).unwrap();
        ws.write_string(4, base, "Gross").unwrap();
        ws.write_string(4, base + 5, "Payment Date").unwrap();
    }
    ws.write_string_with_format(4, 2, entity_label, &bold).unwrap();
    ws.write_string(5, 2, "John Smith").unwrap();
    ws.write_string(6, 2, "Acme Holdings LLC").unwrap();
    ws.write_string(7, 2, "Jane Doe").unwrap();
    ws.write_string(8, 2, "GP").unwrap();
    wb.save(path).unwrap();
}

/// Temp dir holding a template, a source export and a job file.
fn workspace(job: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    write_template(&dir.path().join("import.xlsx"), "Investing Entity");
    std::fs::write(dir.path().join("distributions.csv"), SOURCE).unwrap();
    let job_path = dir.path().join("job.toml");
    std::fs::write(&job_path, job).unwrap();
    (dir, job_path)
}

fn json_stdout(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"))
}

// ===========================================================================
// complete
// ===========================================================================

#[test]
fn complete_writes_default_output_next_to_job() {
    let (dir, job) = workspace(JOB);
    let output = run(&["complete", job.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("3 amount(s) written"));

    let out = dir.path().join("updated_target.xlsx");
    let grid = distmerge_io::target::read_grid(&out).unwrap();
    assert_eq!(grid.get(5, 5), &CellValue::Number(150.0));
    assert_eq!(grid.get(6, 5), &CellValue::Number(1250.0));
    assert_eq!(grid.get(7, 12), &CellValue::Number(-300.0));
    assert_eq!(grid.text(4, 2), Some("Investing Entity"));
}

#[test]
fn complete_json_reports_unmatched_pairs() {
    let (dir, job) = workspace(JOB);
    let out = dir.path().join("filled.xlsx");
    let output = run(&["complete", job.to_str().unwrap(), "-o", out.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    assert_eq!(val["written"], 3);
    assert_eq!(val["duplicate_groups"], 1);
    assert_eq!(val["unparseable_amounts"], 1);
    assert_eq!(val["unmatched"].as_array().unwrap().len(), 3);
    assert_eq!(val["output"]["mode"], "patched");
    assert!(out.exists());
}

#[test]
fn complete_strict_fails_on_unmatched_but_still_writes() {
    let (dir, job) = workspace(JOB);
    let output = run(&["complete", job.to_str().unwrap(), "--strict"]);
    assert_eq!(output.status.code(), Some(63));
    assert!(stderr(&output).contains("no source amount"));
    assert!(dir.path().join("updated_target.xlsx").exists());
}

#[test]
fn complete_honours_persisted_pick() {
    let job = format!("{JOB}\n[[duplicates]]\nentity = \"John Smith\"\ndate = \"2024-01-15\"\nchoice = 100.0\n");
    let (dir, job) = workspace(&job);
    let output = run(&["complete", job.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let grid = distmerge_io::target::read_grid(&dir.path().join("updated_target.xlsx")).unwrap();
    assert_eq!(grid.get(5, 5), &CellValue::Number(100.0));
}

#[test]
fn complete_rejects_pick_outside_group() {
    let job = format!("{JOB}\n[[duplicates]]\nentity = \"John Smith\"\ndate = \"2024-01-15\"\nchoice = 75.0\n");
    let (_dir, job) = workspace(&job);
    let output = run(&["complete", job.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn layout_error_exits_61() {
    let (dir, job) = workspace(JOB);
    write_template(&dir.path().join("import.xlsx"), "Investor Name");
    let output = run(&["complete", job.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(61));
    assert!(stderr(&output).contains("cannot find expected layout"));
}

#[test]
fn missing_source_column_exits_60_with_hint() {
    let (_dir, job) = workspace(&JOB.replace("amount = \"Amount\"", "amount = \"Net\""));
    let output = run(&["complete", job.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));
    assert!(stderr(&output).contains("available columns: Investor, Date, Amount, Memo"));
}

// ===========================================================================
// extend
// ===========================================================================

#[test]
fn extend_appends_new_date_and_placeholder() {
    let (dir, job) = workspace(JOB);
    let output = run(&["extend", job.to_str().unwrap(), "--year", "2026", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    assert_eq!(val["dates"], serde_json::json!(["2024-04-30", "2040-01-01"]));
    assert_eq!(val["block_columns"], serde_json::json!(["T", "AA"]));
    assert_eq!(val["placeholders"], 1);
    assert_eq!(val["existing_blocks"], 2);

    let grid = distmerge_io::target::read_grid(&dir.path().join("populated_incomplete_filtered.xlsx")).unwrap();
    assert_eq!(grid.text(3, 19), Some("30 April 2024"));
    assert_eq!(grid.text(3, 21), Some("Preferred Return"));
    assert_eq!(grid.get(1, 22), &CellValue::Number(2026.0));
}

#[test]
fn extend_reports_unparseable_source_dates() {
    let (dir, job) = workspace(JOB);
    let source = format!("{SOURCE}Jane Doe,TBD,10.00,pending\n");
    std::fs::write(dir.path().join("distributions.csv"), source).unwrap();

    let output = run(&["extend", job.to_str().unwrap(), "--year", "2026", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = json_stdout(&output);
    assert_eq!(val["unparseable_dates"], 1);
    assert_eq!(val["dates"], serde_json::json!(["2024-04-30", "2040-01-01"]));

    let output = run(&["extend", job.to_str().unwrap(), "--year", "2026"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("skipped 1 row(s) with unparseable dates"));
}

#[test]
fn extend_respects_date_range() {
    let job = format!("{JOB}\n[extend]\ndistribution_type = \"interest\"\nfrom = \"2024-05-01\"\n");
    let (_dir, job) = workspace(&job);
    let output = run(&["extend", job.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    assert_eq!(val["selected"], serde_json::json!([]));
    assert_eq!(val["dates"], serde_json::json!([]));
}

// ===========================================================================
// suggest / duplicates / scan / validate
// ===========================================================================

#[test]
fn suggest_write_persists_mapping() {
    let (_dir, job) = workspace(JOB);
    let output = run(&["suggest", job.to_str().unwrap(), "--write"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = std::fs::read_to_string(&job).unwrap();
    let config = distmerge_recon::JobConfig::from_toml(&text).unwrap();
    assert_eq!(config.mapping["Jon Smith"], "John Smith");
    assert_eq!(config.mapping["Acme Holdings"], "Acme Holdings LLC");
    assert_eq!(config.mapping["Fund Admin"], "");
}

#[test]
fn suggest_json_marks_overrides() {
    let (_dir, job) = workspace(JOB);
    let output = run(&["suggest", job.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    let rows = val["rows"].as_array().unwrap();
    let admin = rows.iter().find(|r| r["source"] == "Fund Admin").unwrap();
    assert_eq!(admin["overridden"], true);
    assert_eq!(admin["effective"], "");
}

#[test]
fn duplicates_lists_groups_with_choice() {
    let (_dir, job) = workspace(JOB);
    let output = run(&["duplicates", job.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    let groups = val["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["entity"], "John Smith");
    assert_eq!(groups[0]["sum"], 150.0);
    assert_eq!(groups[0]["choice"], "sum");
}

#[test]
fn scan_reports_axes() {
    let (dir, _job) = workspace(JOB);
    let target = dir.path().join("import.xlsx");
    let output = run(&["scan", target.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = json_stdout(&output);
    assert_eq!(val["entities"]["label_row"], 4);
    assert_eq!(val["entities"]["gp_row"], 8);
    assert_eq!(val["entities"]["entries"].as_array().unwrap().len(), 3);
    assert_eq!(val["dates"]["columns"]["6"], "2024-01-15");
}

#[test]
fn validate_accepts_good_job_and_rejects_bad_one() {
    let (dir, job) = workspace(JOB);
    let output = run(&["validate", job.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("valid:"));

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, format!("{JOB}\n[extend]\ndistribution_type = \"bonus\"\n")).unwrap();
    let output = run(&["validate", bad.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn unknown_log_level_is_a_usage_error() {
    let (_dir, job) = workspace(JOB);
    let output = run(&["--log", "loud", "validate", job.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}
