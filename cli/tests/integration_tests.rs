use std::fs;
use std::path::PathBuf;
use std::process::Output;

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("schema_tick_cli_test_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Two-version schema for the `Origin` entity.
fn write_schema(dir: &TempDir, mode: &str) -> PathBuf {
    let yaml = format!(
        r#"versions: [VersionOrigin, Version_1]
mode: {mode}
entities:
  - name: Origin
    columns:
      - {{ name: Id, sql_type: INTEGER, primary_key: true, nullable: false }}
      - {{ name: Item1, sql_type: TEXT }}
      - {{ name: Item2, sql_type: TEXT }}
      - {{ name: Item3, sql_type: TEXT, since: Version_1 }}
plans:
  - {{ version: VersionOrigin, entity: Origin, step: create }}
  - {{ version: Version_1, entity: Origin, step: migrate }}
"#
    );
    let path = dir.join("schema.yaml");
    fs::write(&path, yaml).expect("failed to write schema");
    path
}

fn run(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_schema-tick"))
        .args(args)
        .output()
        .expect("failed to run schema-tick")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn table_names(db: &PathBuf) -> Vec<String> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

// ---------------------------------------------------------------------------
// upgrade
// ---------------------------------------------------------------------------

#[test]
fn upgrade_creates_tables_then_is_a_no_op() {
    let dir = TempDir::new("upgrade_noop");
    let config = write_schema(&dir, "BY_TICK");
    let db = dir.join("app.db");
    let args = ["upgrade", "--config", config.to_str().unwrap(), "--db", db.to_str().unwrap()];

    let first = run(&args);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let text = stdout(&first);
    assert!(text.contains("ran VersionOrigin"));
    assert!(text.contains("ran Version_1"));
    assert_eq!(table_names(&db), vec!["Origin", "Origin_1"]);

    let second = run(&args);
    assert!(second.status.success());
    assert!(stdout(&second).contains("Already up to date."));
}

#[test]
fn upgrade_honors_drop_casted_off_mode() {
    let dir = TempDir::new("upgrade_drop");
    let config = write_schema(&dir, "BY_TICK | DROP_TABLE_CASTED_OFF");
    let db = dir.join("app.db");

    let output = run(&["upgrade", "--config", config.to_str().unwrap(), "--db", db.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(table_names(&db), vec!["Origin_1"]);
}

// ---------------------------------------------------------------------------
// plan / status
// ---------------------------------------------------------------------------

#[test]
fn plan_reports_pending_without_running() {
    let dir = TempDir::new("plan_json");
    let config = write_schema(&dir, "BY_TICK");
    let db = dir.join("app.db");

    let output = run(&["plan", "--config", config.to_str().unwrap(), "--db", db.to_str().unwrap(), "--json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["pending"], serde_json::json!(["VersionOrigin", "Version_1"]));
    assert_eq!(report["baselines"], serde_json::json!([]));
    assert!(table_names(&db).is_empty());
}

#[test]
fn status_shows_baseline_after_upgrade() {
    let dir = TempDir::new("status");
    let config = write_schema(&dir, "BY_TICK");
    let db = dir.join("app.db");
    let schema_args = ["--config", config.to_str().unwrap(), "--db", db.to_str().unwrap()];

    let mut upgrade = vec!["upgrade"];
    upgrade.extend(schema_args);
    assert!(run(&upgrade).status.success());

    let mut status = vec!["status"];
    status.extend(schema_args);
    let output = run(&status);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Strategy: by-tick"));
    assert!(text.contains("Registered plans: 2"));
    assert!(text.contains("Baseline: Version_1"));
    assert!(text.contains("Up to date."));
}

// ---------------------------------------------------------------------------
// downgrade / tables
// ---------------------------------------------------------------------------

#[test]
fn downgrade_drops_version_table() {
    let dir = TempDir::new("downgrade");
    let config = write_schema(&dir, "BY_TICK");
    let db = dir.join("app.db");
    let config = config.to_str().unwrap();
    let db_arg = db.to_str().unwrap();

    assert!(run(&["upgrade", "--config", config, "--db", db_arg]).status.success());
    let output = run(&["downgrade", "--config", config, "--db", db_arg, "--to", "Version_1"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(table_names(&db), vec!["Origin"]);
}

#[test]
fn tables_lists_columns() {
    let dir = TempDir::new("tables");
    let config = write_schema(&dir, "BY_ALTER_TABLE");
    let db = dir.join("app.db");
    assert!(run(&["upgrade", "--config", config.to_str().unwrap(), "--db", db.to_str().unwrap()]).status.success());

    let output = run(&["tables", "--db", db.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "Origin (Id, Item1, Item2, Item3)");
}

#[test]
fn missing_config_fails_with_error() {
    let dir = TempDir::new("missing_config");
    let output = run(&[
        "status",
        "--config",
        dir.join("nope.yaml").to_str().unwrap(),
        "--db",
        dir.join("app.db").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error: Failed to load schema config"));
}

#[test]
fn invalid_mode_is_rejected() {
    let dir = TempDir::new("invalid_mode");
    let config = write_schema(&dir, "BY_TICK | BY_TABLE");
    let db = dir.join("app.db");
    let output = run(&["upgrade", "--config", config.to_str().unwrap(), "--db", db.to_str().unwrap()]);
    assert!(!output.status.success());
}
