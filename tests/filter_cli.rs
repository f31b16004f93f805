//! CLI tests for the filter command.
//!
//! Tests cover:
//! 1. Exact mode: attribute tables at parent, child and grandchild level
//! 2. Exact mode: strand and position bounds
//! 3. Pattern mode: column and attribute field searches
//! 4. stdin input and error handling

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

// =============================================================================
// Helper functions
// =============================================================================

const GFF: &str = "##gff-version 3\n\
ctg1\tprokka\tgene\t10\t300\t.\t+\t.\tID=g1;locus_tag=KP_0001\n\
ctg1\tprokka\tmRNA\t10\t300\t.\t+\t.\tID=m1;Parent=g1\n\
ctg1\tprokka\tCDS\t10\t150\t.\t+\t0\tID=c1;Parent=m1;product=kinase\n\
ctg1\tprokka\tCDS\t160\t300\t.\t+\t0\tID=c2;Parent=m1;product=ligase\n\
ctg1\tprokka\tgene\t400\t500\t.\t-\t.\tID=g2;locus_tag=KP_0002\n\
ctg1\tprokka\tCDS\t400\t500\t.\t-\t0\tID=c3;Parent=g2;product=phosphatase\n\
ctg1\tbarrnap\trRNA\t600\t700\t.\t.\t.\tID=r1;product=16S ribosomal RNA\n";

fn create_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

fn run_gfftk(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "--release", "--"])
        .args(args)
        .output()
        .expect("Failed to run gfftk")
}

fn run_gfftk_with_stdin(args: &[&str], stdin_content: &str) -> Output {
    let mut child = Command::new("cargo")
        .args(["run", "--release", "--"])
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn gfftk");

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_content.as_bytes()).unwrap();
    }

    child.wait_with_output().expect("Failed to wait for gfftk")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// IDs of the feature lines, in output order.
fn ids(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| !l.starts_with('#'))
        .filter_map(|l| {
            l.split('\t')
                .nth(8)?
                .split(';')
                .find_map(|kv| kv.strip_prefix("ID="))
                .map(str::to_string)
        })
        .collect()
}

// =============================================================================
// Exact mode
// =============================================================================

#[test]
fn test_exact_grandchild_keeps_chain_and_prunes_siblings() {
    let gff = create_file(GFF);
    let table = create_file("##product\nkinase\n");

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "-a",
        table.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("##gff-version 3\n"));
    assert_eq!(ids(&text), vec!["g1", "m1", "c1"]);
}

#[test]
fn test_exact_parent_match_keeps_whole_subtree() {
    let gff = create_file(GFF);
    let table = create_file("##locus_tag\nKP_0001\n");

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "-a",
        table.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["g1", "m1", "c1", "c2"]);
}

#[test]
fn test_exact_multiple_keys_merge() {
    let gff = create_file(GFF);
    let table = create_file("##product\nphosphatase\n\n##ID\nr1\n");

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "-a",
        table.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["g2", "c3", "r1"]);
}

#[test]
fn test_exact_no_match_prints_header_only() {
    let gff = create_file(GFF);
    let table = create_file("##product\nhelicase\n");

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "-a",
        table.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "##gff-version 3\n");
}

#[test]
fn test_exact_strand_keeps_unknown() {
    let gff = create_file(GFF);

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "--strand",
        "minus",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["g2", "c3", "r1"]);
}

#[test]
fn test_exact_position_bounds_inclusive() {
    let gff = create_file(GFF);

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "--start",
        "400",
        "--end",
        "700",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["g2", "c3", "r1"]);
}

#[test]
fn test_exact_stats_on_stderr() {
    let gff = create_file(GFF);

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "--strand",
        "plus",
        "--stats",
    ]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("Filter stats:"));
    assert_eq!(ids(&stdout(&output)), vec!["g1", "m1", "c1", "c2", "r1"]);
}

#[test]
fn test_exact_from_stdin() {
    let table = create_file("##ID\nc2\n");
    let output = run_gfftk_with_stdin(
        &["filter", "--exact", "-a", table.path().to_str().unwrap()],
        GFF,
    );
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["g1", "m1", "c2"]);
}

#[test]
fn test_exact_malformed_table_fails() {
    let gff = create_file(GFF);
    let table = create_file("kinase\n##product\n");

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "-a",
        table.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Malformed filter file at line 1"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_exact_malformed_coordinates_skipped_with_bounds() {
    let gff = create_file(
        "ctg1\t.\tgene\tten\t50\t.\t+\t.\tID=bad\n\
         ctg1\t.\tgene\t10\t50\t.\t+\t.\tID=good\n",
    );

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "--end",
        "100",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["good"]);
}

#[test]
fn test_strict_mode_rejects_malformed_coordinates() {
    let gff = create_file("ctg1\t.\tgene\tten\t50\t.\t+\t.\tID=bad\n");

    let output = run_gfftk(&[
        "--strict",
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_exact_deep_parent_chain_completes() {
    let mut content = String::from("ctg1\t.\tgene\t1\t10\t.\t+\t.\tID=f0\n");
    for i in 1..100_000 {
        content.push_str(&format!(
            "ctg1\t.\tpart\t1\t10\t.\t+\t.\tID=f{};Parent=f{}\n",
            i,
            i - 1
        ));
    }
    let gff = create_file(&content);

    let output = run_gfftk(&[
        "filter",
        "--exact",
        "-i",
        gff.path().to_str().unwrap(),
        "--start",
        "1",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(ids(&stdout(&output)).len(), 100_000);
}

// =============================================================================
// Pattern mode
// =============================================================================

#[test]
fn test_pattern_source_column() {
    let gff = create_file(GFF);

    let output = run_gfftk(&[
        "filter",
        "-i",
        gff.path().to_str().unwrap(),
        "-c",
        "2",
        "-p",
        "barrnap",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["r1"]);
}

#[test]
fn test_pattern_attribute_field_from_list() {
    let gff = create_file(GFF);
    let list = create_file("kinase\nphosphatase\n");

    let output = run_gfftk(&[
        "filter",
        "-i",
        gff.path().to_str().unwrap(),
        "-f",
        "product",
        "-l",
        list.path().to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["c1", "c3"]);
}

#[test]
fn test_pattern_sort() {
    let gff = create_file(
        "ctg1\t.\tgene\t500\t600\t.\t+\t.\tID=b\n\
         ctg1\t.\tgene\t10\t20\t.\t+\t.\tID=a\n",
    );

    let output = run_gfftk(&[
        "filter",
        "-i",
        gff.path().to_str().unwrap(),
        "-c",
        "1",
        "-p",
        "ctg1",
        "--sort",
    ]);
    assert!(output.status.success());
    assert_eq!(ids(&stdout(&output)), vec!["a", "b"]);
}

#[test]
fn test_pattern_without_patterns_fails() {
    let gff = create_file(GFF);
    let output = run_gfftk(&["filter", "-i", gff.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No patterns given"));
}

#[test]
fn test_pattern_short_line_fails() {
    let gff = create_file("ctg1\t.\tgene\t10\n");
    let output = run_gfftk(&["filter", "-i", gff.path().to_str().unwrap(), "-p", "x"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("line 1"));
}
