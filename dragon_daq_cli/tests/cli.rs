use std::process::Command;

#[test]
fn test_missing_config_exits_nonzero() {
    let output = Command::new(env!("CARGO_BIN_EXE_dragon_daq_cli"))
        .args(["-p", "/nonexistent/dragon.yaml"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_new_subcommand_writes_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    // The documented invocation: path flag after the subcommand.
    let output = Command::new(env!("CARGO_BIN_EXE_dragon_daq_cli"))
        .args(["new", "-p", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("sample_depth: 30"));
}
