use anyhow::Result;
use std::process::Command;

use bireal_engine::device_utils::accelerator;

#[test]
fn test_train_without_accelerator_exits_with_failure() -> Result<()> {
    if accelerator(0).is_some() {
        return Ok(());
    }
    let tmp = tempfile::tempdir()?;
    let save = tmp.path().join("models");

    let output = Command::new(env!("CARGO_BIN_EXE_bireal"))
        .current_dir(tmp.path())
        .args(["train", "--data"])
        .arg(tmp.path().join("data"))
        .arg("--save")
        .arg(&save)
        .env("RUST_LOG", "info")
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    assert!(!save.exists());

    let log = std::fs::read_to_string(tmp.path().join("log").join("log.txt"))?;
    assert!(log.contains("No CUDA device available"), "file log was: {log}");
    Ok(())
}

#[test]
fn test_evaluate_without_accelerator_exits_with_failure() -> Result<()> {
    if accelerator(0).is_some() {
        return Ok(());
    }
    let tmp = tempfile::tempdir()?;

    let status = Command::new(env!("CARGO_BIN_EXE_bireal"))
        .current_dir(tmp.path())
        .args(["evaluate", "--data"])
        .arg(tmp.path().join("data"))
        .status()?;

    assert_eq!(status.code(), Some(1));
    assert!(!tmp.path().join("models").exists());
    Ok(())
}
