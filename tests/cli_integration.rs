//! Integration tests for the vsession binary.
//!
//! These tests run the CLI against a credentials store file in a temp
//! directory and verify output and exit status.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use vsession::core::types::{Secret, SessionToken};
use vsession::credstore::{CredentialEntry, CredentialStore, SecretCredentialStore};
use vsession::secrets::FileSecretStore;

const SERVER: &str = "https://vc.example.com/api";
const SM: &str = "com.vmware.cis.session";

/// Temp home with a config pointing at a private credentials store.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            "interactive = false\n\n[credstore]\nprovider = \"file\"\npath = \"{}\"\n",
            dir.path().join("credstore.toml").display()
        );
        std::fs::write(dir.path().join("config.toml"), config).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn store(&self) -> SecretCredentialStore {
        SecretCredentialStore::new(Box::new(FileSecretStore::with_path(
            self.dir.path().join("credstore.toml"),
        )))
    }

    fn seed(&self) {
        let store = self.store();
        store
            .add(CredentialEntry::session_manager(
                SERVER,
                "admin",
                SM,
                Some(Secret::Password("hunter2".into())),
                Some(SessionToken::SessionId("sid-secret".into())),
            ))
            .unwrap();
        store
            .add(CredentialEntry::session_manager(
                SERVER,
                "root",
                SM,
                Some(Secret::Password("toor".into())),
                None,
            ))
            .unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("vsession").unwrap();
        cmd.env("HOME", self.dir.path())
            .env_remove("VSESSION_CONFIG")
            .env_remove("VSESSION_VMC_SERVER")
            .env_remove("VSESSION_CSP_URL")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config_path());
        cmd
    }
}

fn no_secrets(output: &[u8]) -> bool {
    let text = String::from_utf8_lossy(output);
    !text.contains("hunter2") && !text.contains("toor") && !text.contains("sid-secret")
}

#[test]
fn help_flag_works() {
    Command::cargo_bin("vsession")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("credstore"))
        .stdout(predicate::str::contains("token"));
}

#[test]
fn version_flag_works() {
    Command::cargo_bin("vsession")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vsession"));
}

mod credstore {
    use super::*;

    #[test]
    fn list_empty_store() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["credstore", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No credentials stored."));
    }

    #[test]
    fn list_shows_entries_without_secrets() {
        let fixture = Fixture::new();
        fixture.seed();

        let assert = fixture
            .cmd()
            .args(["credstore", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("admin"))
            .stdout(predicate::str::contains("root"))
            .stdout(predicate::str::contains("session id"));
        assert!(no_secrets(&assert.get_output().stdout));
    }

    #[test]
    fn remove_one_user() {
        let fixture = Fixture::new();
        fixture.seed();

        fixture
            .cmd()
            .args(["credstore", "remove", "--server", SERVER, "--user", "admin"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 credstore entry."));

        let entries = fixture.store().list(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user.as_deref(), Some("root"));
    }

    #[test]
    fn remove_tolerates_trailing_slash() {
        let fixture = Fixture::new();
        fixture.seed();

        fixture
            .cmd()
            .args(["credstore", "remove", "--server", &format!("{}/", SERVER)])
            .args(["--session-manager", SM])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 credstore entries."));

        assert!(fixture.store().list(None).unwrap().is_empty());
    }

    #[test]
    fn remove_unknown_server_fails() {
        let fixture = Fixture::new();
        fixture.seed();

        fixture
            .cmd()
            .args(["credstore", "remove", "--server", "https://other/api"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Couldn't find credstore entry"));
    }

    #[test]
    fn clear_sessions_keeps_credentials() {
        let fixture = Fixture::new();
        fixture.seed();

        fixture
            .cmd()
            .args(["credstore", "clear-sessions", "--server", SERVER])
            .assert()
            .success();

        let entries = fixture.store().list(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.session.is_none()));
        assert!(entries.iter().all(|e| e.secret.is_some()));
    }

    #[test]
    fn quiet_suppresses_success_output() {
        let fixture = Fixture::new();
        fixture.seed();

        fixture
            .cmd()
            .args(["-q", "credstore", "clear-sessions"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}

mod token {
    use super::*;

    #[test]
    fn non_interactive_without_stored_token_fails() {
        let fixture = Fixture::new();
        let assert = fixture
            .cmd()
            .args(["token", "--server-type", "vmc"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not in interactive mode"));
        assert!(no_secrets(&assert.get_output().stderr));
    }

    #[test]
    fn nsx_needs_an_organization() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args([
                "token",
                "--server-type",
                "nsx",
                "--server",
                "https://nsx.example.com",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("organization id"));
    }

    #[test]
    fn invalid_org_id_is_an_argument_error() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["token", "--server-type", "vmc", "--org", "not-a-guid"])
            .assert()
            .code(2);
    }
}

#[test]
fn invalid_config_is_an_environment_error() {
    let dir = TempDir::new().unwrap();
    let path: &Path = &dir.path().join("config.toml");
    std::fs::write(path, "[credstore]\nprovider = \"keychain\"\n").unwrap();

    Command::cargo_bin("vsession")
        .unwrap()
        .env("HOME", dir.path())
        .arg("--config")
        .arg(path)
        .args(["credstore", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid credstore provider"));
}
