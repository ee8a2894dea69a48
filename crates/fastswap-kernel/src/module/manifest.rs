//! Module manifest (`module.yml`) model and parsing.
//!
//! ```yaml
//! name: Alpha
//! version: 1.2.0
//! entry: alpha::AlphaModule
//! api-version: 1
//! provides: [AlphaApi]
//! depend: [beta]
//! commands:
//!   greet:
//!     description: Say hello
//!     aliases: [hi, hello]
//!     permission: alpha.greet
//! permissions:
//!   alpha.greet:
//!     default: op
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ManifestError;
use crate::registry::{Permission, PermissionDefault};

/// API version assumed when a manifest does not declare one.
pub const DEFAULT_API_VERSION: u32 = 1;

/// A command declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Usage string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    /// Alternative labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Permission required to run the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

/// A permission declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default-access level
    #[serde(default)]
    pub default: PermissionDefault,
    /// Child permissions and the value they inherit
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, bool>,
}

/// Parsed module descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleManifest {
    /// Declared, host-unique module name
    pub name: String,
    /// Version string (free form)
    pub version: String,
    /// Entry point the host instantiates
    pub entry: String,
    /// Host API version the module targets
    pub api_version: u32,
    /// Description
    pub description: Option<String>,
    /// Declared commands keyed by label
    pub commands: BTreeMap<String, CommandSpec>,
    /// Extra lookup names this module answers to
    pub provides: Vec<String>,
    /// Declared permissions keyed by node
    pub permissions: BTreeMap<String, PermissionSpec>,
    /// Hard dependencies
    pub depend: Vec<String>,
    /// Soft dependencies
    pub soft_depend: Vec<String>,
}

/// Wire shape of `module.yml` before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    api_version: Option<u32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    commands: BTreeMap<String, Option<RawCommand>>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    permissions: BTreeMap<String, Option<RawPermission>>,
    #[serde(default)]
    depend: Vec<String>,
    #[serde(default)]
    soft_depend: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCommand {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    usage: Option<String>,
    #[serde(default)]
    aliases: Option<OneOrMany>,
    #[serde(default)]
    permission: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPermission {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
    #[serde(default)]
    children: BTreeMap<String, bool>,
}

/// `aliases: hi` and `aliases: [hi, hello]` are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl ModuleManifest {
    /// Parse and validate a manifest from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_yaml::from_str(content)?;
        Self::try_from(raw)
    }

    /// Serialize back to YAML (used when packaging archives).
    pub fn to_yaml_string(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Minimal manifest with a name and entry point.
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "0.0.0".to_string(),
            entry: entry.into(),
            api_version: DEFAULT_API_VERSION,
            description: None,
            commands: BTreeMap::new(),
            provides: Vec::new(),
            permissions: BTreeMap::new(),
            depend: Vec::new(),
            soft_depend: Vec::new(),
        }
    }

    /// Add a command with aliases
    pub fn with_command(mut self, label: &str, aliases: &[&str]) -> Self {
        self.commands.insert(
            label.to_string(),
            CommandSpec {
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
                ..CommandSpec::default()
            },
        );
        self
    }

    /// Add a provided lookup name
    pub fn with_provides(mut self, alias: &str) -> Self {
        self.provides.push(alias.to_string());
        self
    }

    /// Add a permission
    pub fn with_permission(mut self, node: &str, default: PermissionDefault) -> Self {
        self.permissions.insert(
            node.to_string(),
            PermissionSpec {
                description: None,
                default,
                children: BTreeMap::new(),
            },
        );
        self
    }

    /// Add a hard dependency
    pub fn with_dependency(mut self, dependency: &str) -> Self {
        self.depend.push(dependency.to_string());
        self
    }

    /// Set the version string
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the targeted API version
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Declared permissions as registry [`Permission`] objects.
    pub fn declared_permissions(&self) -> Vec<Permission> {
        self.permissions
            .iter()
            .map(|(node, spec)| Permission {
                name: node.clone(),
                description: spec.description.clone(),
                default: spec.default,
            })
            .collect()
    }

    /// Declared command labels.
    pub fn command_labels(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

impl TryFrom<RawManifest> for ModuleManifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ManifestError::MissingAttribute("name"))?;

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-'))
        {
            return Err(ManifestError::InvalidName(name));
        }

        // `version: 1.0` arrives as a float
        let version = match raw.version {
            Some(serde_yaml::Value::String(s)) => s,
            Some(serde_yaml::Value::Number(n)) => n.to_string(),
            Some(_) | None => return Err(ManifestError::MissingAttribute("version")),
        };

        let commands = raw
            .commands
            .into_iter()
            .map(|(label, cmd)| {
                let cmd = cmd.unwrap_or_default();
                let spec = CommandSpec {
                    description: cmd.description,
                    usage: cmd.usage,
                    aliases: cmd.aliases.map(OneOrMany::into_vec).unwrap_or_default(),
                    permission: cmd.permission,
                };
                (label, spec)
            })
            .collect();

        let mut permissions = BTreeMap::new();
        for (node, perm) in raw.permissions {
            let perm = perm.unwrap_or_default();
            let default = match perm.default {
                None | Some(serde_yaml::Value::Null) => PermissionDefault::default(),
                Some(serde_yaml::Value::Bool(true)) => PermissionDefault::True,
                Some(serde_yaml::Value::Bool(false)) => PermissionDefault::False,
                Some(serde_yaml::Value::String(s)) => PermissionDefault::from_name(&s).ok_or_else(
                    || ManifestError::InvalidPermissionDefault {
                        permission: node.clone(),
                        value: s.clone(),
                    },
                )?,
                Some(other) => {
                    return Err(ManifestError::InvalidPermissionDefault {
                        permission: node,
                        value: format!("{:?}", other),
                    });
                }
            };
            permissions.insert(
                node,
                PermissionSpec {
                    description: perm.description,
                    default,
                    children: perm.children,
                },
            );
        }

        Ok(Self {
            name,
            version,
            entry: raw.entry.unwrap_or_default(),
            api_version: raw.api_version.unwrap_or(DEFAULT_API_VERSION),
            description: raw.description,
            commands,
            provides: raw.provides,
            permissions,
            depend: raw.depend,
            soft_depend: raw.soft_depend,
        })
    }
}
