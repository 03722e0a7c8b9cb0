//! CLI integration tests for the nameward binary.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use chrono::{Duration, Utc};
use nameward::store::SqliteStore;
use nameward::types::PendingIdentity;
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("nameward").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["admin", "init", "--data-dir", &self.data_dir_str()])
            .assert()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("nameward.db")).expect("failed to open store")
    }
}

fn expired_pending(id: &str) -> PendingIdentity {
    let created = Utc::now() - Duration::hours(48);
    PendingIdentity {
        better_auth_user_id: id.to_string(),
        email: format!("{id}@example.com"),
        email_lower: format!("{id}@example.com"),
        username_lower: id.to_string(),
        username_display: id.to_string(),
        image_base64: None,
        created_at: created,
        expires_at: created + Duration::hours(24),
    }
}

#[test]
fn test_init_writes_trusted_token() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Trusted token"))
        .stdout(predicate::str::contains("nameward_"));

    ctx.temp_dir
        .child(".trusted_token")
        .assert(predicate::str::starts_with("nameward_"));
    ctx.temp_dir.child("nameward.db").assert(predicate::path::exists());
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.init()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_cleanup_requires_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["cleanup", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nameward admin init"));
}

#[test]
fn test_cleanup_removes_expired_pending_identities() {
    let ctx = TestContext::new();
    ctx.init().success();

    let store = ctx.store();
    store
        .mutation(|s| {
            s.insert_pending_identity(&expired_pending("stale1"))?;
            s.insert_pending_identity(&expired_pending("stale2"))
        })
        .expect("seed pending identities");
    drop(store);

    ctx.cmd()
        .args(["cleanup", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Removed 2 expired pending identities and 0 expired username holds",
        ));

    let remaining = ctx
        .store()
        .query(|s| s.get_pending_identity("stale1"))
        .expect("query pending identity");
    assert!(remaining.is_none());
}

#[test]
fn test_cleanup_rejects_unknown_config_keys() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.temp_dir
        .child("nameward.toml")
        .write_str("claim_attempts = 5\nunknown_key = true\n")
        .expect("write config");

    ctx.cmd()
        .args(["cleanup", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown_key"));
}

#[test]
fn test_admin_session_prints_token() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args([
            "admin",
            "session",
            "--data-dir",
            &ctx.data_dir_str(),
            "--subject",
            "subject-1",
            "--email",
            "someone@example.com",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("nameward_"));
}
