#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `fleetdesk` pointed at a fresh database and a config file that does not
/// exist yet, with no ambient overrides leaking in from the environment.
fn fleetdesk(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fleetdesk").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("FLEETDESK_PORT")
        .env_remove("FLEETDESK_JWT_SECRET")
        .env_remove("FLEETDESK_USER_PASSWORD")
        .env_remove("FLEETDESK_DELIVERYMAN_PASSWORD")
        .env("FLEETDESK_CONFIG", dir.path().join("fleetdesk.yaml"))
        .env("FLEETDESK_DB", dir.path().join("desk.db"));
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// fleetdesk migrate
// ---------------------------------------------------------------------------

#[test]
fn migrate_creates_database() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema version 1"));
    assert!(dir.path().join("desk.db").exists());
}

#[test]
fn migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir).arg("migrate").assert().success();
    fleetdesk(&dir).arg("migrate").assert().success();
}

#[test]
fn db_flag_overrides_env() {
    let dir = TempDir::new().unwrap();
    let other = dir.path().join("nested/other.db");
    fleetdesk(&dir)
        .args(["migrate", "--db"])
        .arg(&other)
        .assert()
        .success();
    assert!(other.exists());
    assert!(!dir.path().join("desk.db").exists());
}

// ---------------------------------------------------------------------------
// fleetdesk company / user
// ---------------------------------------------------------------------------

#[test]
fn company_create_then_list() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args(["company", "create", "Acme Couriers", "--email", "hq@acme.test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created company #1: Acme Couriers"));

    fleetdesk(&dir)
        .args(["company", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme Couriers"))
        .stdout(predicate::str::contains("hq@acme.test"));
}

#[test]
fn company_list_json() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir).args(["company", "create", "Acme"]).assert().success();
    let value = json_stdout(fleetdesk(&dir).args(["company", "list"]));
    assert_eq!(value[0]["name"], "Acme");
    assert_eq!(value[0]["is_active"], true);
}

#[test]
fn company_without_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args(["company", "create", "  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("name field is required"));
}

#[test]
fn deactivate_company() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir).args(["company", "create", "Acme"]).assert().success();
    fleetdesk(&dir)
        .args(["company", "deactivate", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deactivated"));
    let value = json_stdout(fleetdesk(&dir).args(["company", "list"]));
    assert_eq!(value[0]["is_active"], false);

    fleetdesk(&dir)
        .args(["company", "activate", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Company not found"));
}

#[test]
fn user_create_for_company() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir).args(["company", "create", "Acme"]).assert().success();
    let user = json_stdout(fleetdesk(&dir).args([
        "user",
        "create",
        "--company",
        "1",
        "--name",
        "Ops Lead",
        "--email",
        "Ops@Acme.test",
        "--password",
        "long-enough-password",
    ]));
    assert_eq!(user["email"], "ops@acme.test");
    assert_eq!(user["role"], "admin");
    assert!(user.get("password_hash").is_none());

    fleetdesk(&dir)
        .args(["user", "list", "--company", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ops@acme.test"));
}

#[test]
fn user_create_rejects_short_password() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir).args(["company", "create", "Acme"]).assert().success();
    fleetdesk(&dir)
        .args([
            "user", "create", "--company", "1", "--name", "Ops", "--email", "ops@acme.test",
            "--password", "short",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8 characters"));
}

#[test]
fn user_create_for_unknown_company_fails() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args([
            "user", "create", "--company", "42", "--name", "Ops", "--email", "ops@acme.test",
        ])
        .env("FLEETDESK_USER_PASSWORD", "long-enough-password")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Company not found"));
}

// ---------------------------------------------------------------------------
// fleetdesk deliveryman
// ---------------------------------------------------------------------------

#[test]
fn set_password_for_unknown_delivery_man_fails() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args(["deliveryman", "set-password", "5", "--password", "long-enough-password"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Delivery man not found"));
}

// ---------------------------------------------------------------------------
// fleetdesk config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_warns_about_default_secret() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning]"));
}

#[test]
fn config_validate_fails_on_short_secret() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("fleetdesk.yaml"),
        "auth:\n  jwt_secret: tiny\n",
    )
    .unwrap();
    fleetdesk(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("at least 16 characters"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_show_masks_secret() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("fleetdesk.yaml"),
        "auth:\n  jwt_secret: super-secret-value-123456\nserver:\n  port: 9090\n",
    )
    .unwrap();
    let value = json_stdout(fleetdesk(&dir).args(["config", "show"]));
    assert_eq!(value["server"]["port"], 9090);
    assert_eq!(value["auth"]["jwt_secret"], "********");
}

#[test]
fn serve_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    fleetdesk(&dir)
        .args(["serve", "--port", "0"])
        .env("FLEETDESK_JWT_SECRET", "tiny")
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to start"));
}
