//! Unit tests for stale-lock recovery.

use super::*;
use crate::test_utils::{ExpectedCall, RecordingSleeper, StubExecutor, failure_output, output_with};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const DB_FILES: [&str; 5] = ["Basenames", "Name", "Packages", "__db.001", "__db.002"];

struct Database {
    _temp: TempDir,
    dir: Utf8PathBuf,
}

impl Database {
    fn paths(&self) -> Vec<String> {
        DB_FILES
            .iter()
            .map(|name| self.dir.join(name).into_string())
            .collect()
    }

    fn fuser(&self, output: std::process::Output) -> ExpectedCall {
        let paths = self.paths();
        let mut args = vec!["-u"];
        args.extend(paths.iter().map(String::as_str));
        ExpectedCall::new("fuser", &args, output)
    }

    fn remaining(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .expect("read dir")
            .map(|entry| {
                entry
                    .expect("entry")
                    .file_name()
                    .into_string()
                    .expect("utf-8 name")
            })
            .collect();
        names.sort();
        names
    }
}

#[fixture]
fn database() -> Database {
    let temp = TempDir::new().expect("temp dir");
    let dir = Utf8Path::from_path(temp.path())
        .expect("utf-8 temp dir")
        .join("rpm");
    fs::create_dir(&dir).expect("create db dir");
    for name in DB_FILES {
        fs::write(dir.join(name), b"db").expect("write db file");
    }
    Database { _temp: temp, dir }
}

fn health_query(output: std::process::Output) -> ExpectedCall {
    ExpectedCall::new("rpm", &["-q", "rpm"], output)
}

fn stale_health_query() -> ExpectedCall {
    health_query(failure_output(
        "error: rpmdb: Thread died in Berkeley DB library\nerror: db5 error(-30973)\n",
    ))
}

fn not_held() -> std::process::Output {
    output_with(1, "", "")
}

fn held() -> std::process::Output {
    output_with(0, " 4242", "/var/lib/rpm/Packages:  4242(root)\n")
}

#[rstest]
fn healthy_database_is_left_alone(database: Database) {
    let executor = StubExecutor::new(vec![health_query(output_with(0, "rpm-4.16.1.3-1.x86_64\n", ""))]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let outcome = recovery.ensure_usable().expect("healthy");

    assert_eq!(outcome, LockOutcome::Healthy);
    assert_eq!(database.remaining(), DB_FILES);
    assert!(sleeper.recorded().is_empty());
    executor.assert_finished();
}

#[rstest]
fn unknown_health_query_failure_is_fatal_without_remediation(database: Database) {
    let executor = StubExecutor::new(vec![health_query(failure_output("error: rpmdb open failed\n"))]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let err = recovery.ensure_usable().expect_err("unknown failure");

    assert!(matches!(err, LockError::Database { .. }));
    assert_eq!(err.to_string(), "error calling rpm: error: rpmdb open failed\n");
    assert_eq!(database.remaining(), DB_FILES);
    executor.assert_finished();
}

#[rstest]
fn unheld_stale_lock_is_cleared(database: Database) {
    let executor = StubExecutor::new(vec![stale_health_query(), database.fuser(not_held())]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let outcome = recovery.ensure_usable().expect("repaired");

    assert_eq!(
        outcome,
        LockOutcome::Repaired {
            removed: vec![database.dir.join("__db.001"), database.dir.join("__db.002")],
        }
    );
    assert_eq!(database.remaining(), ["Basenames", "Name", "Packages"]);
    assert!(sleeper.recorded().is_empty());
    executor.assert_finished();
}

#[rstest]
fn lock_released_during_the_pause_is_cleared(database: Database) {
    let executor = StubExecutor::new(vec![
        stale_health_query(),
        database.fuser(held()),
        database.fuser(not_held()),
    ]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let outcome = recovery.ensure_usable().expect("repaired");

    assert!(matches!(outcome, LockOutcome::Repaired { ref removed } if removed.len() == 2));
    assert_eq!(sleeper.recorded(), vec![RECHECK_DELAY]);
    executor.assert_finished();
}

#[rstest]
fn lock_held_on_both_checks_is_not_touched(database: Database) {
    let executor = StubExecutor::new(vec![
        stale_health_query(),
        database.fuser(held()),
        database.fuser(held()),
    ]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let err = recovery.ensure_usable().expect_err("still held");

    assert!(matches!(err, LockError::Held { .. }));
    assert_eq!(database.remaining(), DB_FILES);
    assert_eq!(sleeper.recorded(), vec![RECHECK_DELAY]);
    executor.assert_finished();
}

#[rstest]
fn non_root_holders_do_not_block_repair(database: Database) {
    let executor = StubExecutor::new(vec![
        stale_health_query(),
        database.fuser(output_with(0, " 999", "/var/lib/rpm/Packages:  999(nobody)\n")),
    ]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    recovery.ensure_usable().expect("repaired");

    assert_eq!(database.remaining(), ["Basenames", "Name", "Packages"]);
}

#[rstest]
fn failing_holder_check_is_fatal(database: Database) {
    let paths = database.paths();
    let mut args = vec!["-u"];
    args.extend(paths.iter().map(String::as_str));
    let executor = StubExecutor::new(vec![
        stale_health_query(),
        ExpectedCall::spawn_failure("fuser", &args),
    ]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone());

    let err = recovery.ensure_usable().expect_err("cannot check holders");

    assert!(matches!(err, LockError::HolderCheck { .. }));
    assert_eq!(database.remaining(), DB_FILES);
}

#[rstest]
fn custom_recheck_delay_is_used(database: Database) {
    let executor = StubExecutor::new(vec![
        stale_health_query(),
        database.fuser(held()),
        database.fuser(not_held()),
    ]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, database.dir.clone())
        .with_recheck_delay(Duration::from_secs(1));

    recovery.ensure_usable().expect("repaired");

    assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);
}

#[test]
fn health_query_spawn_failure_is_reported() {
    let executor = StubExecutor::new(vec![ExpectedCall::spawn_failure("rpm", &["-q", "rpm"])]);
    let sleeper = RecordingSleeper::default();
    let recovery = LockRecovery::new(&executor, &sleeper, "/nonexistent");

    let err = recovery.ensure_usable().expect_err("rpm missing");

    assert!(matches!(err, LockError::Query { .. }));
}

#[rstest]
#[case::lock("__db.001", true)]
#[case::bare_prefix("__db", true)]
#[case::packages("Packages", false)]
#[case::embedded("x__db.001", false)]
fn stale_lock_file_names(#[case] name: &str, #[case] expected: bool) {
    assert_eq!(is_stale_lock_file(&Utf8PathBuf::from("/var/lib/rpm").join(name)), expected);
}
