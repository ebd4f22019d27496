//! Package definition and loading

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::shard::ShardSpec;
use crate::values::Variables;

/// File name of the package manifest at the package root
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Directory holding resource templates, relative to the package root
pub const TEMPLATES_DIR: &str = "templates";

/// Package identity given to a lone template file
const STANDALONE_PACKAGE: &str = "local/template";

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+/[a-z0-9_-]+$").expect("valid package name regex"));
static LOOSE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+?/.+?$").expect("valid loose package name regex"));

/// A package name in `namespace/name` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName {
    namespace: String,
    name: String,
}

impl PackageName {
    /// Parse and validate a `namespace/name` string
    pub fn parse(s: &str) -> Result<Self> {
        if !NAME_RE.is_match(s) {
            let reason = if LOOSE_NAME_RE.is_match(s) {
                "package names are restricted to [a-z0-9_-]".to_string()
            } else {
                "does not match format 'namespace/name'".to_string()
            };
            return Err(CoreError::InvalidPackageName {
                name: s.to_string(),
                reason,
            });
        }

        // The regex guarantees exactly one slash
        let (namespace, name) = s.split_once('/').unwrap_or_default();
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// The organization/user segment
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The short package name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl TryFrom<String> for PackageName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for PackageName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Package metadata (`package:` section of the manifest)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name (required, `namespace/name`)
    pub name: PackageName,

    /// Package version (required, SemVer)
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// Declaration of a package variable
///
/// In YAML either the long form `{default: ..., help: ...}` or a bare default
/// value is accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawVariableSpec")]
pub struct VariableSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VariableSpecForm {
    #[serde(default)]
    default: Option<JsonValue>,
    #[serde(default)]
    help: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariableSpec {
    Spec(VariableSpecForm),
    Value(JsonValue),
}

impl From<RawVariableSpec> for VariableSpec {
    fn from(raw: RawVariableSpec) -> Self {
        match raw {
            RawVariableSpec::Spec(form) => Self {
                default: form.default,
                help: form.help,
            },
            RawVariableSpec::Value(JsonValue::Null) => Self::default(),
            RawVariableSpec::Value(value) => Self {
                default: Some(value),
                help: None,
            },
        }
    }
}

/// A resource template declared in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// Logical name; used as the resource name when the body has none
    pub name: String,

    /// Template file, relative to `templates/`
    pub file: String,

    /// Kind hint when the rendered body carries no `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Template source text, loaded from `file`
    #[serde(skip)]
    pub source: String,
}

/// The package manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package metadata
    pub package: PackageInfo,

    /// Variable schema, in declaration order
    #[serde(default)]
    pub variables: IndexMap<String, VariableSpec>,

    /// Resource templates, in declaration (and apply) order
    #[serde(default)]
    pub resources: Vec<ResourceTemplate>,

    /// Default shard topology when the caller gives none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<ShardSpec>,
}

impl Manifest {
    /// Parse a manifest from YAML (template sources are left empty)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest and its templates from a package source tree
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(CoreError::ManifestNotFound {
                path: manifest_path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&manifest_path)?;
        let mut manifest = Self::from_yaml(&content)?;

        for template in &mut manifest.resources {
            let path = root.join(TEMPLATES_DIR).join(&template.file);
            if !path.is_file() {
                return Err(CoreError::TemplateNotFound {
                    name: template.name.clone(),
                    path: path.display().to_string(),
                });
            }
            template.source = std::fs::read_to_string(&path)?;
        }

        tracing::debug!(
            package = %manifest.package.name,
            version = %manifest.package.version,
            templates = manifest.resources.len(),
            "loaded package from {}",
            root.display()
        );

        Ok(manifest)
    }

    /// Build a manifest from in-memory files keyed by archive path
    pub fn from_files(files: &BTreeMap<String, Vec<u8>>) -> Result<Self> {
        let raw = files
            .get(MANIFEST_FILE)
            .ok_or_else(|| CoreError::ManifestNotFound {
                path: MANIFEST_FILE.to_string(),
            })?;
        let mut manifest = Self::from_yaml(&utf8(raw, MANIFEST_FILE)?)?;

        for template in &mut manifest.resources {
            let key = format!("{}/{}", TEMPLATES_DIR, template.file);
            let data = files.get(&key).ok_or_else(|| CoreError::TemplateNotFound {
                name: template.name.clone(),
                path: key.clone(),
            })?;
            template.source = utf8(data, &key)?;
        }

        Ok(manifest)
    }

    /// Check structural invariants not expressible in serde
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for template in &self.resources {
            if template.name.trim().is_empty() {
                return Err(CoreError::InvalidManifest {
                    message: "resource template with an empty name".to_string(),
                });
            }
            if template.file.trim().is_empty() {
                return Err(CoreError::InvalidManifest {
                    message: format!("resource '{}' has no file", template.name),
                });
            }
            if Path::new(&template.file).is_absolute() || template.file.contains("..") {
                return Err(CoreError::InvalidManifest {
                    message: format!(
                        "resource '{}' must reference a file inside {}/",
                        template.name, TEMPLATES_DIR
                    ),
                });
            }
            if !seen.insert(template.name.as_str()) {
                return Err(CoreError::InvalidManifest {
                    message: format!("duplicate resource name '{}'", template.name),
                });
            }
        }
        Ok(())
    }

    /// Default values from the variable schema
    pub fn defaults(&self) -> Variables {
        let mut vars = Variables::new();
        for (name, spec) in &self.variables {
            if let Some(default) = &spec.default {
                vars.insert(name, default.clone());
            }
        }
        vars
    }

    /// A manifest around one template file outside any package
    ///
    /// The template is named after the file stem and declares no variables,
    /// so every placeholder must come from the caller.
    pub fn standalone(file: &str, source: String) -> Result<Self> {
        let file_name = Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::InvalidManifest {
                message: format!("'{}' is not a template file", file),
            })?;
        let stem = file_name.split('.').next().unwrap_or(file_name);

        let manifest = Self {
            package: PackageInfo {
                name: PackageName::parse(STANDALONE_PACKAGE)?,
                version: Version::new(0, 0, 0),
                description: None,
                author: None,
                license: None,
            },
            variables: IndexMap::new(),
            resources: vec![ResourceTemplate {
                name: stem.to_string(),
                file: file_name.to_string(),
                kind: None,
                source,
            }],
            shards: None,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize the manifest back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Directory name used when extracting this package (`ns_name_version`)
    pub fn package_dir_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.package.name.namespace(),
            self.package.name.name(),
            self.package.version
        )
    }
}

fn utf8(data: &[u8], path: &str) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|e| CoreError::Archive {
        message: format!("invalid UTF-8 in {}: {}", path, e),
    })
}

/// A fetched package: identity, opaque blob and its unpacked manifest
#[derive(Debug, Clone)]
pub struct Package {
    pub name: PackageName,
    pub version: Version,
    pub blob: Vec<u8>,
    pub manifest: Manifest,
}

impl Package {
    /// Unpack a blob and take the package identity from its manifest
    pub fn from_blob(blob: Vec<u8>) -> Result<Self> {
        let manifest = crate::archive::unpack_manifest(&blob)?;
        Ok(Self {
            name: manifest.package.name.clone(),
            version: manifest.package.version.clone(),
            blob,
            manifest,
        })
    }

    /// Pack a local source tree
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let manifest = Manifest::load(root.as_ref())?;
        let blob = crate::archive::pack_dir(root.as_ref())?;
        Ok(Self {
            name: manifest.package.name.clone(),
            version: manifest.package.version.clone(),
            blob,
            manifest,
        })
    }

    /// SHA256 digest of the blob
    pub fn digest(&self) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(&self.blob)))
    }

    /// Extract the package tree below `dest`, returning the package directory
    pub fn extract_to(&self, dest: &Path, overwrite: bool) -> Result<PathBuf> {
        let target = dest.join(self.manifest.package_dir_name());
        crate::archive::extract(&self.blob, &target, overwrite)?;
        Ok(target)
    }
}
