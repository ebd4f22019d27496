//! New command - scaffold a package

use console::style;
use kpm_core::PackageName;
use kpm_core::package::{MANIFEST_FILE, TEMPLATES_DIR};
use std::fs;
use std::path::{Path, PathBuf};

use crate::display;
use crate::error::{CliError, Result};

/// Create `directory/<name>` with a manifest and two plain templates
pub fn run(package: &str, directory: &Path, with_comments: bool) -> Result<PathBuf> {
    let name = PackageName::parse(package)?;
    let root = directory.join(name.name());

    if root.exists() {
        return Err(CliError::input(format!(
            "Directory {} already exists",
            root.display()
        )));
    }
    fs::create_dir_all(root.join(TEMPLATES_DIR))?;

    fs::write(root.join(MANIFEST_FILE), manifest(&name, with_comments))?;
    fs::write(
        root.join(TEMPLATES_DIR).join("deployment.yaml"),
        deployment(name.name()),
    )?;
    fs::write(
        root.join(TEMPLATES_DIR).join("service.yaml"),
        service(name.name()),
    )?;

    display::success(format!(
        "Created package {} in {}",
        style(&name).cyan(),
        root.display()
    ));
    eprintln!();
    eprintln!("Next steps:");
    eprintln!("  kpm generate --local {} --shards 2", root.display());
    eprintln!("  kpm push {}", root.display());

    Ok(root)
}

fn manifest(name: &PackageName, with_comments: bool) -> String {
    if !with_comments {
        return format!(
            r#"package:
  name: {name}
  version: 0.1.0

variables:
  image: nginx:1.25
  replicas: 1
  port: 80

resources:
  - name: {short}
    file: deployment.yaml
  - name: {short}-svc
    file: service.yaml
"#,
            short = name.name()
        );
    }

    format!(
        r#"# Package identity; `kpm push` publishes under this name and version
package:
  name: {name}
  version: 0.1.0
  description: A kpm package for {short}

# Variables and their defaults. Templates reference them as ${{name}};
# override with `-x name=value` or `--variables-file`.
variables:
  image:
    default: nginx:1.25
    help: Container image
  replicas:
    default: 1
    help: Pods per shard
  port:
    default: 80
    help: Container and service port

# Templates under templates/, applied in this order. With several shards
# every resource name gets the shard id appended.
resources:
  - name: {short}
    file: deployment.yaml
  - name: {short}-svc
    file: service.yaml

# Default shard topology: a count or a list of shard objects.
# shards: 3
"#,
        short = name.name()
    )
}

fn deployment(name: &str) -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {name}
  labels:
    app: {name}
spec:
  replicas: ${{replicas}}
  selector:
    matchLabels:
      app: {name}
  template:
    metadata:
      labels:
        app: {name}
    spec:
      containers:
        - name: {name}
          image: ${{image}}
          ports:
            - containerPort: ${{port}}
"#
    )
}

fn service(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Service
metadata:
  name: {name}
spec:
  selector:
    app: {name}
  ports:
    - port: ${{port}}
      targetPort: ${{port}}
"#
    )
}
