use assert_cmd::cargo;
use rstest::{fixture, rstest};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn script(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).expect("Failed to write script");
        path
    }

    fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn livejs(&self) -> assert_cmd::Command {
        let mut cmd = cargo::cargo_bin_cmd!("livejs");
        cmd.env("LIVEJS_CACHE_DIR", self.cache_dir())
            .env("NO_COLOR", "1")
            .env_remove("LIVEJS_LOG_LEVEL")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn stdout(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}

#[fixture]
fn workspace() -> Workspace {
    Workspace {
        dir: tempfile::tempdir().expect("Failed to create temp dir"),
    }
}

#[rstest]
#[case::values(
    vec![],
    "5 + 3\nconsole.log(\"hi\")",
    "   1 │ 8\n   2 │ \"hi\"\n"
)]
#[case::object(
    vec![],
    "({ a: [1] })",
    "   1 │ {\n     │   \"a\": [\n     │     1\n     │   ]\n     │ }\n"
)]
#[case::no_top_level_results(
    vec!["--no-top-level-results"],
    "1\nconsole.log(2)",
    "   2 │ 2\n"
)]
#[case::magic_comments(
    vec!["--magic-comments", "--no-top-level-results"],
    "const x = 4\nx //?\nx",
    "   2 │ 4\n"
)]
#[case::show_undefined(vec!["--show-undefined"], "undefined", "   1 │ undefined\n")]
#[case::timeout(vec!["--timeout", "5000"], "setTimeout(() => console.log(\"late\"), 5)\n1", "   2 │ 1\n   1 │ \"late\"\n")]
fn test_run(
    workspace: Workspace,
    #[case] flags: Vec<&str>,
    #[case] source: &str,
    #[case] expected: &str,
) {
    let script = workspace.script("script.js", source);

    let assert = workspace
        .livejs()
        .arg("run")
        .args(flags)
        .arg(&script)
        .assert()
        .success();

    assert_eq!(stdout(&assert), expected);
}

#[rstest]
fn test_run_with_stdin(workspace: Workspace) {
    workspace
        .livejs()
        .args(["run", "-"])
        .write_stdin("\"a\" + \"b\"")
        .assert()
        .success()
        .stdout("   1 │ \"ab\"\n");
}

#[rstest]
#[case::runaway_loop(vec!["--loop-protection"], "while (true) {}", "     │ Loop limit exceeded\n")]
#[case::uncaught(vec![], "1\nthrow new TypeError(\"bad\")\n2", "   1 │ 1\n     │ TypeError: bad\n")]
fn test_run_failure(
    workspace: Workspace,
    #[case] flags: Vec<&str>,
    #[case] source: &str,
    #[case] expected: &str,
) {
    let script = workspace.script("script.js", source);

    let assert = workspace
        .livejs()
        .arg("run")
        .args(flags)
        .arg(&script)
        .assert()
        .failure()
        .code(1);

    assert_eq!(stdout(&assert), expected);
}

#[rstest]
fn test_run_syntax_error(workspace: Workspace) {
    let script = workspace.script("broken.js", "1 +");
    let assert = workspace.livejs().arg("run").arg(&script).assert().failure();

    let output = stdout(&assert);
    assert!(output.contains("SyntaxError"), "unexpected output: {}", output);
}

#[rstest]
fn test_run_missing_file(workspace: Workspace) {
    workspace
        .livejs()
        .args(["run", "does-not-exist.js"])
        .assert()
        .failure();
}

#[rstest]
#[case::plain(vec![], "5 + 3", "__livejs_debug(1, 5 + 3);\n")]
#[case::console(vec!["--no-top-level-results"], "console.log(1)", "__livejs_debug(1, 1);\n")]
fn test_transform(
    workspace: Workspace,
    #[case] flags: Vec<&str>,
    #[case] source: &str,
    #[case] expected: &str,
) {
    let script = workspace.script("script.js", source);

    let assert = workspace
        .livejs()
        .arg("transform")
        .args(flags)
        .arg(&script)
        .assert()
        .success();

    assert_eq!(stdout(&assert), expected);
}

#[rstest]
fn test_cache_persists_and_clears(workspace: Workspace) {
    let script = workspace.script("script.js", "1 + 1");

    workspace.livejs().arg("run").arg(&script).assert().success();
    workspace.livejs().arg("run").arg(&script).assert().success();

    let assert = workspace
        .livejs()
        .args(["cache", "stats", "--json"])
        .assert()
        .success();
    let stats: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(stats["size"], 1);
    assert_eq!(stats["misses"], 1);

    workspace.livejs().args(["cache", "clear"]).assert().success();

    let assert = workspace
        .livejs()
        .args(["cache", "stats", "--json"])
        .assert()
        .success();
    let stats: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(stats["size"], 0);
}

#[rstest]
fn test_no_cache_leaves_store_untouched(workspace: Workspace) {
    let script = workspace.script("script.js", "1 + 1");

    workspace
        .livejs()
        .args(["run", "--no-cache"])
        .arg(&script)
        .assert()
        .success();

    assert!(!workspace.cache_dir().exists());
}

#[rstest]
fn test_invalid_config_warns_and_falls_back(workspace: Workspace) {
    let script = workspace.script("script.js", "2 * 2");
    let assert = workspace
        .livejs()
        .env("LIVEJS_CACHE_MAX_SIZE", "lots")
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout("   1 │ 4\n");

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("LIVEJS_CACHE_MAX_SIZE"), "unexpected stderr: {}", stderr);
}

#[rstest]
fn test_json_log_format(workspace: Workspace) {
    let script = workspace.script("script.js", "1");
    let assert = workspace
        .livejs()
        .env("LIVEJS_LOG_FORMAT", "json")
        .env("LIVEJS_CACHE_TTL_SECONDS", "never")
        .arg("run")
        .arg(&script)
        .assert()
        .success();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    let line = stderr.lines().next().unwrap_or_default();
    let log: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(log["level"], "WARN");
}
