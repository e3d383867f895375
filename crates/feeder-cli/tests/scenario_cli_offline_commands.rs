//! Commands that never touch a chain: `pairs` and `config-hash`.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn feeder() -> Command {
    let mut cmd = Command::cargo_bin("feeder").expect("binary");
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn pairs_lists_the_builtin_table_in_order() {
    let out = feeder().arg("pairs").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let names: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(
        names,
        vec![
            "AAVE-USD", "CRV-USD", "ETH-USD", "BTC-USD", "DAI-USD", "USDT-USD", "USDC-USD"
        ]
    );
    assert!(stdout.lines().all(|l| l.ends_with("eligible=true")), "{stdout}");
}

#[test]
fn pairs_reflects_a_replaced_feed_list() {
    let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    f.write_all(
        br#"
feeds:
  - pair: ETH-USD
    source: "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419"
  - pair: BTC-USD
    source: "0xF4030086522a5bEEa4988F8cA5B36dbC97BeE88c"
    target: "0x1111111111111111111111111111111111111111"
"#,
    )
    .unwrap();

    feeder()
        .args(["pairs", "--config"])
        .arg(f.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ETH-USD").and(predicate::str::contains("target=- eligible=false")))
        .stdout(predicate::str::contains("BTC-USD").and(predicate::str::contains("eligible=true")))
        .stdout(predicate::str::contains("AAVE-USD").not());
}

#[test]
fn config_hash_is_stable_across_invocations() {
    let run = || {
        let out = feeder().arg("config-hash").assert().success();
        String::from_utf8(out.get_output().stdout.clone()).unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a, b);
    let first = a.lines().next().unwrap();
    assert!(first.starts_with("config_hash="), "{first}");
    assert_eq!(first.len(), "config_hash=".len() + 64);
}
