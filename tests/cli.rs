//! End-to-end tests of the `seqcache` binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FASTA: &str = ">chr1 first\nACGTN\n>chr2\nTTTT\n>chr3\nACGGacgg\n";

fn seqcache() -> Command {
    Command::cargo_bin("seqcache").unwrap()
}

fn build_fixture(dir: &TempDir) -> std::path::PathBuf {
    let input = dir.path().join("tiny.fa");
    fs::write(&input, FASTA).unwrap();
    seqcache().arg("build").arg(&input).assert().success();
    dir.path().join("tiny")
}

fn exists(path: &Path, ext: &str) -> bool {
    let mut name = path.as_os_str().to_owned();
    name.push(ext);
    Path::new(&name).exists()
}

#[test]
fn build_derives_basename_from_input() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    assert!(exists(&base, ".idx"));
    let store = seqcache::StoreReader::open(&base).unwrap();
    assert!(store.payload_path().exists());
}

#[test]
fn fetch_prints_fasta() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);

    seqcache()
        .arg("fetch")
        .arg(&base)
        .arg("chr1")
        .assert()
        .success()
        .stdout(">chr1:0-5\nACGTN\n");

    seqcache()
        .args(["fetch", "--start", "1", "--end", "3"])
        .arg(&base)
        .arg("chr2")
        .assert()
        .success()
        .stdout(">chr2:1-3\nTT\n");
}

#[test]
fn fetch_reverse_complement() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    seqcache()
        .args(["fetch", "--reverse-complement", "--end", "4"])
        .arg(&base)
        .arg("chr3")
        .assert()
        .success()
        .stdout(">chr3:0-4(-)\nCCGT\n");
}

#[test]
fn fetch_rejects_bad_ranges_and_names() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    seqcache()
        .args(["fetch", "--end", "99"])
        .arg(&base)
        .arg("chr1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid range"));
    seqcache()
        .arg("fetch")
        .arg(&base)
        .arg("chrZ")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown chromosome"));
}

#[test]
fn preserve_case_keeps_soft_masking() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("masked.fa");
    fs::write(&input, FASTA).unwrap();
    let base = dir.path().join("masked");
    seqcache()
        .args(["build", "--preserve-case", "--basename"])
        .arg(&base)
        .arg(&input)
        .assert()
        .success();
    seqcache()
        .arg("fetch")
        .arg(&base)
        .arg("chr3")
        .assert()
        .success()
        .stdout(">chr3:0-8\nACGGacgg\n");
}

#[test]
fn info_lists_chromosomes() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    seqcache()
        .arg("info")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains("Format version: 2.1.0"))
        .stdout(predicate::str::contains("Chromosomes: 3"))
        .stdout(predicate::str::contains("chr2\t4\t5"));
}

#[test]
fn export_then_build_from_container() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    let pack = dir.path().join("copy.seqpack");
    seqcache()
        .arg("export")
        .arg(&base)
        .arg(&pack)
        .assert()
        .success();
    seqcache().arg("build").arg(&pack).assert().success();

    let copy = dir.path().join("copy");
    seqcache()
        .arg("fetch")
        .arg(&copy)
        .arg("chr3")
        .assert()
        .success()
        .stdout(">chr3:0-8\nACGGACGG\n");
}

#[test]
fn upgrade_reports_each_store() {
    let dir = TempDir::new().unwrap();
    let base = build_fixture(&dir);
    let old = dir.path().join("old");
    seqcache::legacy::write_legacy(&old, &[("chrM", &b"GATTACA"[..])]).unwrap();

    seqcache()
        .arg("upgrade")
        .arg(&base)
        .arg(&old)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date (format 2.1.0)"))
        .stdout(predicate::str::contains("upgraded 1.9.5 -> 2.1.0"));
    assert!(!exists(&old, ".header"));
    assert!(exists(&old, ".idx"));
}

#[test]
fn missing_store_fails() {
    let dir = TempDir::new().unwrap();
    seqcache()
        .arg("upgrade")
        .arg(dir.path().join("nothing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No sequence store found"));
}

#[test]
fn malformed_fasta_fails_without_writing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.fa");
    fs::write(&input, "ACGT\n>chr1\nACGT\n").unwrap();
    seqcache()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.fa:1"));
    assert!(!exists(&dir.path().join("bad"), ".idx"));
}

#[test]
fn build_errors_name_input_and_basename() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("dup.fa");
    fs::write(&input, ">chr1\nACGT\n>chr2\nGG\n>chr1\nTT\n").unwrap();
    seqcache()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate chromosome"))
        .stderr(predicate::str::contains(input.display().to_string()))
        .stderr(predicate::str::contains(
            dir.path().join("dup").display().to_string(),
        ));
    assert!(!exists(&dir.path().join("dup"), ".idx"));
}
