//! Entity records stored by the registry and catalog.
//!
//! Metadata is a tagged union: each [`EntityKind`] carries only the fields
//! that make sense for it. Required fields are still optional at the type
//! level so that incomplete registrations can be reported as validation
//! errors instead of failing deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four kinds of artifacts tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Component,
    Service,
    Hook,
    Type,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Component,
        EntityKind::Service,
        EntityKind::Hook,
        EntityKind::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Component => "component",
            EntityKind::Service => "service",
            EntityKind::Hook => "hook",
            EntityKind::Type => "type",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "component" => Ok(EntityKind::Component),
            "service" => Ok(EntityKind::Service),
            "hook" => Ok(EntityKind::Hook),
            "type" => Ok(EntityKind::Type),
            other => Err(format!(
                "unknown entity kind '{}': expected component, service, hook, or type",
                other
            )),
        }
    }
}

/// Metadata for a UI component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMeta {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub functionality: Vec<String>,
    #[serde(default)]
    pub props: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Metadata for a service class or module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMeta {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub functionality: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Metadata for a hook (`useSomething`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookMeta {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub functionality: Vec<String>,
    /// Names of the values the hook returns.
    #[serde(default)]
    pub returns: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Metadata for a shared type or interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeMeta {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Kind-tagged entity metadata.
///
/// Serialized with an internal `kind` tag:
///
/// ```json
/// { "kind": "component", "file_path": "src/components/ui/UserCard.tsx", "category": "ui" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityMetadata {
    Component(ComponentMeta),
    Service(ServiceMeta),
    Hook(HookMeta),
    Type(TypeMeta),
}

impl EntityMetadata {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityMetadata::Component(_) => EntityKind::Component,
            EntityMetadata::Service(_) => EntityKind::Service,
            EntityMetadata::Hook(_) => EntityKind::Hook,
            EntityMetadata::Type(_) => EntityKind::Type,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            EntityMetadata::Component(m) => m.file_path.as_deref(),
            EntityMetadata::Service(m) => m.file_path.as_deref(),
            EntityMetadata::Hook(m) => m.file_path.as_deref(),
            EntityMetadata::Type(m) => m.file_path.as_deref(),
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            EntityMetadata::Component(m) => m.category.as_deref(),
            EntityMetadata::Service(m) => m.category.as_deref(),
            EntityMetadata::Hook(m) => m.category.as_deref(),
            EntityMetadata::Type(m) => m.category.as_deref(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            EntityMetadata::Component(m) => m.description.as_deref(),
            EntityMetadata::Service(m) => m.description.as_deref(),
            EntityMetadata::Hook(m) => m.description.as_deref(),
            EntityMetadata::Type(m) => m.description.as_deref(),
        }
    }

    /// Free-text phrases describing behavior. Types have none.
    pub fn functionality(&self) -> &[String] {
        match self {
            EntityMetadata::Component(m) => &m.functionality,
            EntityMetadata::Service(m) => &m.functionality,
            EntityMetadata::Hook(m) => &m.functionality,
            EntityMetadata::Type(_) => &[],
        }
    }

    /// The kind's identifier list: props, methods, returns, or fields.
    pub fn members(&self) -> &[String] {
        match self {
            EntityMetadata::Component(m) => &m.props,
            EntityMetadata::Service(m) => &m.methods,
            EntityMetadata::Hook(m) => &m.returns,
            EntityMetadata::Type(m) => &m.fields,
        }
    }

    /// Names of required fields that are missing or empty for this kind.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.file_path()) {
            missing.push("file_path");
        }
        match self {
            EntityMetadata::Component(m) => {
                if is_blank(m.category.as_deref()) {
                    missing.push("category");
                }
            }
            EntityMetadata::Service(m) => {
                if m.methods.is_empty() {
                    missing.push("methods");
                }
            }
            EntityMetadata::Hook(m) => {
                if m.functionality.is_empty() {
                    missing.push("functionality");
                }
            }
            EntityMetadata::Type(_) => {}
        }
        missing
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// A registered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub metadata: EntityMetadata,
    pub registered_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(name: impl Into<String>, metadata: EntityMetadata) -> Self {
        Self {
            name: name.into(),
            metadata,
            registered_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.metadata.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_metadata_tagged_json() {
        let json = r#"{"kind":"service","file_path":"src/services/auth.ts","methods":["login"]}"#;
        let meta: EntityMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.kind(), EntityKind::Service);
        assert_eq!(meta.members(), &["login".to_string()]);
        assert!(meta.missing_required().is_empty());
    }

    #[test]
    fn test_missing_required_per_kind() {
        let component = EntityMetadata::Component(ComponentMeta::default());
        assert_eq!(component.missing_required(), vec!["file_path", "category"]);

        let service = EntityMetadata::Service(ServiceMeta {
            file_path: Some("src/services/a.ts".into()),
            ..Default::default()
        });
        assert_eq!(service.missing_required(), vec!["methods"]);

        let hook = EntityMetadata::Hook(HookMeta {
            file_path: Some("  ".into()),
            functionality: vec!["fetch users".into()],
            ..Default::default()
        });
        assert_eq!(hook.missing_required(), vec!["file_path"]);

        let ty = EntityMetadata::Type(TypeMeta {
            file_path: Some("src/types/user.ts".into()),
            ..Default::default()
        });
        assert!(ty.missing_required().is_empty());
    }
}
