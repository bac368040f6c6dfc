use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

const P1_LINE: &str =
    "P1\treviewed\tNameA\tlineage1\tGO:1\tfunc1\tpath1\t1.1.1.1\tMKTAYIAKQRQISFVK\n";

#[test]
fn test_cli_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmerscan")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("makedb"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("stats"));

    Ok(())
}

#[test]
fn test_cli_makedb_search_stats() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let input_dir = temp_dir.path().join("uniprot");
    std::fs::create_dir(&input_dir)?;
    std::fs::write(input_dir.join("part1.tsv"), P1_LINE)?;
    let db_path = temp_dir.path().join("db");

    let mut cmd = Command::cargo_bin("kmerscan")?;
    cmd.arg("makedb").arg("--input").arg(&input_dir).arg("--output").arg(&db_path);
    cmd.assert().success();
    assert!(db_path.join("store_0").is_dir());

    let query_path = temp_dir.path().join("query.fasta");
    std::fs::write(&query_path, ">q1\nMKTAYIAKQRQISFVK\n")?;
    let mut cmd = Command::cargo_bin("kmerscan")?;
    cmd.arg("search").arg("--db").arg(&db_path).arg("--query").arg(&query_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("QueryName\tQueryKSize\tQStart\tQEnd\tKMatch\tHit.Id\n"))
        .stdout(predicate::str::contains("q1\t10\t1\t16\t10\tP1\n"));

    let mut cmd = Command::cargo_bin("kmerscan")?;
    cmd.arg("stats").arg("--db").arg(&db_path);
    cmd.assert().success().stdout(predicate::str::contains("\"proteins\": 1"));

    Ok(())
}

#[test]
fn test_cli_search_stdin_json() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("part1.tsv");
    std::fs::write(&input, P1_LINE)?;
    let db_path = temp_dir.path().join("db");

    Command::cargo_bin("kmerscan")?
        .arg("makedb")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&db_path)
        .assert()
        .success();

    let mut cmd = assert_cmd::Command::cargo_bin("kmerscan")?;
    cmd.arg("search")
        .arg("--db")
        .arg(&db_path)
        .args(["--query", "-", "--format", "json", "--positions"])
        .write_stdin(">q1\nMKTAYIAKQRQISFVK\n");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"kmatch\":10"))
        .stdout(predicate::str::contains("\"positions\":\"1-10\""));

    Ok(())
}

#[test]
fn test_cli_search_json_survives_malformed_query() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let input = temp_dir.path().join("part1.tsv");
    std::fs::write(&input, P1_LINE)?;
    let db_path = temp_dir.path().join("db");

    Command::cargo_bin("kmerscan")?
        .arg("makedb")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&db_path)
        .assert()
        .success();

    let quality = "I".repeat(16);
    let fastq = format!(
        "@q1\nMKTAYIAKQRQISFVK\n+\n{q}\n@cut\nMKTAYIAKQRQISFVK\n@q3\nMKTAYIAKQRQISFVK\n+\n{q}\n",
        q = quality
    );
    let output = assert_cmd::Command::cargo_bin("kmerscan")?
        .arg("search")
        .arg("--db")
        .arg(&db_path)
        .args(["--query", "-", "--format", "json"])
        .write_stdin(fastq)
        .output()?;
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value.as_array().map(Vec::len), Some(2));

    Ok(())
}

#[test]
fn test_cli_search_missing_database() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempdir()?;
    let query_path = temp_dir.path().join("query.fasta");
    std::fs::write(&query_path, ">q1\nMKTAYIAKQRQISFVK\n")?;

    let mut cmd = Command::cargo_bin("kmerscan")?;
    cmd.arg("search")
        .arg("--db")
        .arg(temp_dir.path().join("nothing"))
        .arg("--query")
        .arg(&query_path);
    cmd.assert().failure();

    Ok(())
}
