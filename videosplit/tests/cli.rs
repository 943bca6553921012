use std::error::Error;
use std::fs::{self, File};
use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn cli_prints_usage_and_exits_one_on_missing_arguments() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));

    // A single positional argument is still incomplete.
    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.arg("input.mp4");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));

    Ok(())
}

#[test]
fn cli_reports_missing_input_file() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.arg("missing.mp4").arg("100").arg(output_dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("input file does not exist"));

    output_dir.close()?;
    Ok(())
}

#[test]
fn cli_rejects_a_zero_megabyte_limit() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.arg("input.mp4").arg("0").arg("out");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("greater than zero megabytes"));

    Ok(())
}

#[test]
fn cli_rejects_a_non_numeric_limit() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.arg("input.mp4").arg("lots").arg("out");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("whole number of megabytes"));

    Ok(())
}

#[test]
fn cli_fails_cleanly_on_unprobeable_input() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("garbage.mp4");
    File::create(&input_path)?.write_all(b"not a video file")?;

    let output_dir = tempdir()?;

    // Whether ffprobe is installed or not, probing this input cannot
    // succeed; the failure must surface as a non-zero exit without any
    // segments being written.
    let mut cmd = Command::cargo_bin("videosplit")?;
    cmd.arg(&input_path).arg("100").arg(output_dir.path());
    cmd.assert().failure();

    let segment_dir = output_dir.path().join("garbage");
    if segment_dir.exists() {
        let mut produced = fs::read_dir(&segment_dir)?;
        assert!(produced.next().is_none(), "no segments may be written");
    }

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}
