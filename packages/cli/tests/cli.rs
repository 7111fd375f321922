use std::path::Path;

use clap::Parser;
use tempfile::TempDir;

use vendor_storage_cli::{execute, Cli, CliError};

const PARTITIONS: &str = "0x100@0(uboot),0x200@0x100(vnvm)";

fn run(args: &[&str]) -> Result<String, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("vendorstore").chain(args.iter().copied()))
        .expect("arguments should parse");
    let mut out = Vec::new();
    execute(&cli, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn args<'a>(common: &[&'a str], rest: &[&'a str]) -> Vec<&'a str> {
    common.iter().chain(rest).copied().collect()
}

fn create(dir: &TempDir) -> String {
    let disk = dir.path().join("emmc.img");
    let disk = disk.to_str().unwrap().to_string();
    run(&[
        "--disk",
        disk.as_str(),
        "--partitions",
        PARTITIONS,
        "create",
        "--blocks",
        "1024",
    ])
    .unwrap();
    disk
}

#[test]
fn create_write_read_list() {
    let dir = TempDir::new().unwrap();
    let disk = create(&dir);
    let common = ["--disk", disk.as_str(), "--partitions", PARTITIONS];

    let out = run(&args(&common, &["write", "--id", "serial-number", "--text", "SN-0042"]))
        .unwrap();
    assert!(out.contains("wrote 7 bytes to item 0x0001"));

    run(&args(&common, &["write", "--id", "0x2", "--hex", "0211"])).unwrap();

    let out = run(&args(&common, &["read", "--id", "1"])).unwrap();
    assert_eq!(out, "SN-0042\n");

    let out = run(&args(&common, &["read", "--id", "wifi-mac", "--hex"])).unwrap();
    assert_eq!(out, "0211\n");

    let out = run(&args(&common, &["list"])).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("0x0001  serial-number"));
    assert!(lines[1].contains("wifi-mac"));

    let out = run(&args(&common, &["info"])).unwrap();
    assert!(out.contains("version:     3"));
    assert!(out.contains("active slot: 1"));
    assert!(out.contains("extent:      0x200@0x100"));
}

#[test]
fn read_to_file_and_binary_fallback() {
    let dir = TempDir::new().unwrap();
    let disk = create(&dir);
    let payload = dir.path().join("key.bin");
    std::fs::write(&payload, [0xFF, 0x00, 0xFE]).unwrap();
    let common = ["--disk", disk.as_str(), "--partitions", PARTITIONS];

    run(&args(&common, &["write", "--id", "300", "--file", payload.to_str().unwrap()]))
        .unwrap();

    let out = run(&args(&common, &["read", "--id", "300"])).unwrap();
    assert_eq!(out, "ff00fe\n");

    let copy = dir.path().join("copy.bin");
    run(&args(&common, &["read", "--id", "300", "--out", copy.to_str().unwrap()]))
        .unwrap();
    assert_eq!(std::fs::read(&copy).unwrap(), vec![0xFF, 0x00, 0xFE]);
}

#[test]
fn config_file_supplies_target() {
    let dir = TempDir::new().unwrap();
    let disk = create(&dir);
    let config = dir.path().join("vendorstore.json");
    std::fs::write(
        &config,
        serde_json::json!({ "disk": disk, "partitions": PARTITIONS, "partition": "vnvm" })
            .to_string(),
    )
    .unwrap();
    let config = config.to_str().unwrap();

    run(&["--config", config, "write", "--id", "5", "--text", "hello"]).unwrap();
    let out = run(&["--config", config, "read", "--id", "5"]).unwrap();
    assert_eq!(out, "hello\n");
}

#[test]
fn empty_store_info() {
    let dir = TempDir::new().unwrap();
    let disk = create(&dir);
    let out = run(&["--disk", disk.as_str(), "--partitions", PARTITIONS, "info"]).unwrap();
    assert!(out.contains("version:     1"));
    assert!(out.contains("active slot: none"));
}

#[test]
fn errors_are_reported() {
    let dir = TempDir::new().unwrap();
    let disk = create(&dir);

    let err = run(&["--disk", disk.as_str(), "--partitions", PARTITIONS, "read", "--id", "9"])
        .unwrap_err();
    assert!(matches!(
        err,
        CliError::Store(vendor_storage_core::Error::NotFound { id: 9 })
    ));

    let err = run(&[
        "--disk",
        disk.as_str(),
        "--partitions",
        PARTITIONS,
        "--partition",
        "misc",
        "info",
    ])
    .unwrap_err();
    assert!(format!("{}", err).contains("not found"));

    let err = run(&["info"]).unwrap_err();
    assert!(matches!(err, CliError::MissingDisk));

    let missing = dir.path().join("missing.img");
    let err = run(&["--disk", missing.to_str().unwrap(), "info"]).unwrap_err();
    assert!(matches!(err, CliError::Block(_)));
    assert!(!Path::new(&missing).exists());
}

#[test]
fn create_rejects_table_without_vendor_partition() {
    let dir = TempDir::new().unwrap();
    let disk = dir.path().join("bad.img");
    let err = run(&[
        "--disk",
        disk.to_str().unwrap(),
        "--partitions",
        "0x100@0(uboot)",
        "create",
        "--blocks",
        "512",
    ])
    .unwrap_err();
    assert!(matches!(err, CliError::Block(_)));
    assert!(!disk.exists());
}

#[test]
fn argument_errors() {
    assert!(Cli::try_parse_from(["vendorstore", "read", "--id", "mac"]).is_err());
    assert!(Cli::try_parse_from(["vendorstore", "write", "--id", "1"]).is_err());
    assert!(Cli::try_parse_from([
        "vendorstore",
        "write",
        "--id",
        "1",
        "--text",
        "a",
        "--hex",
        "00",
    ])
    .is_err());
    assert!(Cli::try_parse_from(["vendorstore", "--grow-policy", "sometimes", "info"]).is_err());
    assert!(Cli::try_parse_from(["vendorstore", "--grow-policy", "overwrite", "info"]).is_ok());
}
