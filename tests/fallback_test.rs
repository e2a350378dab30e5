use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn one_payment() -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "customer,amount,currency,method,provider,detail,expiry,country,capture").unwrap();
    writeln!(csv, "alice,10.00,EUR,credit_card,,4242,12/2030,DE,true").unwrap();
    csv
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = one_payment();

    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg(csv.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_db_path_from_environment() {
    let csv = one_payment();

    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg(csv.path()).env("PAYFLOW_DB_PATH", "some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back to In-Memory storage"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = one_payment();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("payflow"));
    cmd.arg(csv.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
