//! Integration tests for CLI commands
//!
//! Everything here runs against local packages: no cluster or registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A scratch directory holding a config file the binary is pointed at
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "registry: http://127.0.0.1:9\nnamespace: staging\n",
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kpm"));
        cmd.env("KPM_CONFIG", self.path().join("config.yaml"))
            .env_remove("KPM_REGISTRY")
            .env_remove("KPM_NAMESPACE")
            .env_remove("RUST_LOG");
        cmd
    }

    fn kpm(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("Failed to execute kpm")
    }

    /// Scaffold `acme/web` and return its directory
    fn scaffold(&self) -> PathBuf {
        let output = self.kpm(&["new", "acme/web", "--directory", path_str(self.path())]);
        assert!(output.status.success(), "{}", stderr(&output));
        self.path().join("web")
    }

    /// A package with one ConfigMap template
    fn package(&self, template: &str) -> PathBuf {
        let root = self.path().join("pkg");
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(
            root.join("manifest.yaml"),
            "package:\n  name: acme/cfg\n  version: 1.0.0\nvariables:\n  color: blue\nresources:\n  - name: cfg\n    file: cfg.yaml\n",
        )
        .unwrap();
        fs::write(root.join("templates/cfg.yaml"), template).unwrap();
        root
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn names(json: &str) -> Vec<String> {
    let docs: Vec<serde_json::Value> = serde_json::from_str(json).expect("valid JSON");
    docs.iter()
        .map(|d| d["metadata"]["name"].as_str().unwrap().to_string())
        .collect()
}

const CONFIG_MAP: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
data:
  color: ${color}
  namespace: ${namespace}
";

mod new_command {
    use super::*;

    #[test]
    fn test_new_creates_loadable_package() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        assert!(root.join("manifest.yaml").is_file());
        assert!(root.join("templates/deployment.yaml").is_file());
        assert!(root.join("templates/service.yaml").is_file());
    }

    #[test]
    fn test_new_with_comments() {
        let ws = Workspace::new();
        let output = ws.kpm(&[
            "new",
            "acme/api",
            "--directory",
            path_str(ws.path()),
            "--with-comments",
        ]);
        assert!(output.status.success());
        let manifest = fs::read_to_string(ws.path().join("api/manifest.yaml")).unwrap();
        assert!(manifest.contains("help: Container image"));
    }

    #[test]
    fn test_new_rejects_bad_name() {
        let ws = Workspace::new();
        let output = ws.kpm(&["new", "NotValid", "--directory", path_str(ws.path())]);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("namespace/name"));
    }
}

mod generate_command {
    use super::*;

    #[test]
    fn test_generate_sharded_json() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&["generate", "--local", path_str(&root), "--shards", "3"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert_eq!(
            names(&stdout(&output)),
            vec!["web-0", "web-svc-0", "web-1", "web-svc-1", "web-2", "web-svc-2"]
        );
    }

    #[test]
    fn test_generate_unsharded_keeps_names() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&["generate", "--local", path_str(&root)]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert_eq!(names(&stdout(&output)), vec!["web", "web-svc"]);
    }

    #[test]
    fn test_generate_yaml_with_overrides() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&[
            "generate",
            "--local",
            path_str(&root),
            "-x",
            "replicas=3",
            "-o",
            "yaml",
        ]);
        assert!(output.status.success(), "{}", stderr(&output));
        let out = stdout(&output);
        assert!(out.starts_with("---"));
        assert!(out.contains("replicas: 3"));
        assert!(out.contains("nginx:1.25"));
    }

    #[test]
    fn test_generate_explicit_shards_override_variables() {
        let ws = Workspace::new();
        let root = ws.package(CONFIG_MAP);

        let output = ws.kpm(&[
            "generate",
            "--local",
            path_str(&root),
            "--shards",
            r#"[{"name": "eu", "color": "red"}, {"name": "us"}]"#,
        ]);
        assert!(output.status.success(), "{}", stderr(&output));
        let docs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(docs[0]["metadata"]["name"], "cfg-eu");
        assert_eq!(docs[0]["data"]["color"], "red");
        assert_eq!(docs[1]["metadata"]["name"], "cfg-us");
        assert_eq!(docs[1]["data"]["color"], "blue");
    }

    #[test]
    fn test_variables_file_then_flags() {
        let ws = Workspace::new();
        let root = ws.package(CONFIG_MAP);
        let vars = ws.path().join("vars.yaml");
        fs::write(&vars, "color: green\n").unwrap();

        let output = ws.kpm(&[
            "generate",
            "--local",
            path_str(&root),
            "--variables-file",
            path_str(&vars),
        ]);
        let docs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(docs[0]["data"]["color"], "green");

        let output = ws.kpm(&[
            "generate",
            "--local",
            path_str(&root),
            "--variables-file",
            path_str(&vars),
            "-x",
            r#"{"color": "black"}"#,
        ]);
        let docs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(docs[0]["data"]["color"], "black");
    }

    #[test]
    fn test_namespace_precedence() {
        let ws = Workspace::new();
        let root = ws.package(CONFIG_MAP);
        let namespace = |output: Output| -> String {
            let docs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
            docs[0]["data"]["namespace"].as_str().unwrap().to_string()
        };

        let from_file = ws.kpm(&["generate", "--local", path_str(&root)]);
        assert_eq!(namespace(from_file), "staging");

        let from_env = ws
            .command()
            .env("KPM_NAMESPACE", "qa")
            .args(["generate", "--local", path_str(&root)])
            .output()
            .unwrap();
        assert_eq!(namespace(from_env), "qa");

        let from_flag = ws
            .command()
            .env("KPM_NAMESPACE", "qa")
            .args(["generate", "--local", path_str(&root), "--namespace", "prod"])
            .output()
            .unwrap();
        assert_eq!(namespace(from_flag), "prod");
    }

    #[test]
    fn test_extract_to_tmpdir() {
        let ws = Workspace::new();
        let root = ws.scaffold();
        let dest = ws.path().join("out");

        let args = ["generate", "--local", path_str(&root), "--tmpdir", path_str(&dest)];
        let output = ws.kpm(&args);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(dest.join("acme_web_0.1.0/manifest.yaml").is_file());

        // Second extraction needs --overwrite
        let output = ws.kpm(&args);
        assert_eq!(output.status.code(), Some(5));

        let mut with_overwrite = args.to_vec();
        with_overwrite.push("--overwrite");
        assert!(ws.kpm(&with_overwrite).status.success());
    }
}

mod render_command {
    use super::*;

    #[test]
    fn test_render_single_file_with_shards() {
        let ws = Workspace::new();
        let file = ws.path().join("cfg.yaml");
        fs::write(&file, CONFIG_MAP).unwrap();

        let output = ws.kpm(&[
            "render",
            path_str(&file),
            "-x",
            "color=teal",
            "--shards",
            "2",
            "--namespace",
            "prod",
        ]);
        assert!(output.status.success(), "{}", stderr(&output));
        let docs: Vec<serde_json::Value> = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(names(&stdout(&output)), vec!["cfg-0", "cfg-1"]);
        assert_eq!(docs[1]["data"]["color"], "teal");
        assert_eq!(docs[1]["data"]["namespace"], "prod");
    }

    #[test]
    fn test_render_needs_every_variable() {
        let ws = Workspace::new();
        let file = ws.path().join("cfg.yaml");
        fs::write(&file, CONFIG_MAP).unwrap();

        let output = ws.kpm(&["render", path_str(&file)]);
        assert_eq!(output.status.code(), Some(3));
        assert!(stderr(&output).contains("color"));
    }

    #[test]
    fn test_render_missing_file() {
        let ws = Workspace::new();
        let output = ws.kpm(&["render", path_str(&ws.path().join("nope.yaml"))]);
        assert_eq!(output.status.code(), Some(5));
    }
}

mod version_command {
    use super::*;

    #[test]
    fn test_unreachable_registry() {
        let ws = Workspace::new();
        let output = ws.kpm(&["version"]);
        assert_eq!(output.status.code(), Some(7));
        assert!(stderr(&output).contains("try again"));
    }
}

mod error_exit_codes {
    use super::*;

    #[test]
    fn test_invalid_shards() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&["generate", "--local", path_str(&root), "--shards", "-1"]);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("shard"));

        let output = ws.kpm(&[
            "generate",
            "--local",
            path_str(&root),
            "--shards",
            r#"[{"name": "a"}, {"name": "a"}]"#,
        ]);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("duplicate shard id"));
    }

    #[test]
    fn test_undefined_variable() {
        let ws = Workspace::new();
        let root = ws.package("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\ndata:\n  size: ${colour}\n");

        let output = ws.kpm(&["generate", "--local", path_str(&root)]);
        assert_eq!(output.status.code(), Some(3));
        assert!(stderr(&output).contains("colour"));
        assert!(stdout(&output).is_empty());
    }

    #[test]
    fn test_missing_manifest() {
        let ws = Workspace::new();
        let output = ws.kpm(&["generate", "--local", path_str(ws.path())]);
        assert_eq!(output.status.code(), Some(4));
        assert!(stderr(&output).contains("manifest.yaml"));
    }

    #[test]
    fn test_bad_config_file() {
        let ws = Workspace::new();
        let root = ws.scaffold();
        fs::write(ws.path().join("config.yaml"), "retry:\n  maxAttempts: 0\n").unwrap();

        let output = ws.kpm(&["generate", "--local", path_str(&root)]);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("maxAttempts"));
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn test_deploy_dry_run_needs_no_cluster() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&["deploy", "--local", path_str(&root), "--shards", "2", "--dry-run"]);
        assert!(output.status.success(), "{}", stderr(&output));
        let err = stderr(&output);
        assert!(err.contains("Deployment/web-1 (staging)"));
        assert!(err.contains("4 planned"));
    }

    #[test]
    fn test_remove_dry_run() {
        let ws = Workspace::new();
        let root = ws.scaffold();

        let output = ws.kpm(&["remove", "--local", path_str(&root), "--dry-run"]);
        assert!(output.status.success(), "{}", stderr(&output));
        assert!(stderr(&output).contains("2 planned"));
    }
}
