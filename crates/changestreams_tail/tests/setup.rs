use assert_cmd::cmd::Command;

pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub const SPLIT_MERGE: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/split_merge.json");

pub fn make_cli() -> Command {
    Command::cargo_bin("changestreams-tail").expect("Failed to find binary")
}

/// A command with every required argument set, reading from `replay`.
pub fn tail(replay: &str) -> Command {
    let mut cmd = make_cli();
    cmd.timeout(DEFAULT_TIMEOUT)
        .args(["-p", "my-project", "-i", "my-instance", "-d", "my-db", "-s", "SingersStream"])
        .arg("--replay")
        .arg(replay);
    cmd
}
