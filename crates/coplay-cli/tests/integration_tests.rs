use assert_cmd::Command;
use predicates::prelude::*;

fn tiny_run() -> Command {
    let mut cmd = Command::cargo_bin("balance-train").unwrap();
    cmd.args([
        "--cuda",
        "false",
        "--policy",
        "softmax",
        "--num-envs",
        "4",
        "--num-steps",
        "8",
        "--total-timesteps",
        "96",
    ]);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("balance-train").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-play PPO"))
        .stdout(predicate::str::contains("--target-kl"));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let mut cmd = Command::cargo_bin("balance-train").unwrap();
    cmd.args(["--cuda", "false", "--num-envs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_cli_rejects_bad_bool() {
    let mut cmd = Command::cargo_bin("balance-train").unwrap();
    cmd.args(["--cuda", "perhaps"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid truth value"));
}

#[test]
#[cfg(not(feature = "torch"))]
fn test_cli_requires_accelerator_by_default() {
    let mut cmd = Command::cargo_bin("balance-train").unwrap();
    cmd.args(["--policy", "softmax"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("accelerator"));
}

#[test]
fn test_cli_tiny_batched_run() {
    tiny_run()
        .assert()
        .success()
        .stdout(predicate::str::contains("Run saved to: Balance_Train__1__"))
        .stdout(predicate::str::contains("__4_madrona"));
}

#[test]
fn test_cli_tiny_serial_run_with_random_partner() {
    tiny_run()
        .args(["--madrona", "false", "--partner", "random", "--seed", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run saved to: Balance_Train__3__"))
        .stdout(predicate::str::contains("__4_serial"));
}
