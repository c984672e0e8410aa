//! Shallow, regex-based extraction of exported declarations.
//!
//! This is not a parser. It reads one file's text and recognises the
//! common export shapes of a React/TypeScript codebase:
//!
//! ```text
//! export function UserCard({ user, onClick }) { … }      → component (props)
//! export const useUsers = () => { … return { users } }   → hook (returns)
//! export class AuthService { login() { … } }             → service (methods)
//! export const authService = { login: async () => … }    → service (methods)
//! export interface User { id: string; email: string }    → type (fields)
//! ```
//!
//! Lower-case functions that are neither hooks nor services are treated
//! as utilities and skipped. Category is the name of the file's parent
//! directory (`src/components/ui/UserCard.tsx` → `ui`), falling back to
//! the kind name when the file sits directly under `src/` or the root.

use regex::Regex;

use crate::catalog::split_identifier;
use crate::models::{
    ComponentMeta, EntityKind, EntityMetadata, EntityRecord, HookMeta, ServiceMeta, TypeMeta,
};

const SERVICE_SUFFIXES: &[&str] = &["Service", "Client", "Repository", "Manager"];
const NON_METHODS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "constructor",
];

/// A declaration found in source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub kind: EntityKind,
    /// 1-based line of the `export`.
    pub line: usize,
    pub metadata: EntityMetadata,
}

impl Declaration {
    pub fn into_record(self) -> EntityRecord {
        EntityRecord::new(self.name, self.metadata)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Function,
    Const,
    Class,
    Interface,
}

pub struct DeclarationScanner {
    function: Regex,
    constant: Regex,
    class: Regex,
    interface: Regex,
    method: Regex,
    object_method: Regex,
    field: Regex,
    returns: Regex,
}

impl DeclarationScanner {
    pub fn new() -> Self {
        let compile = |re: &str| Regex::new(re).expect("built-in declaration pattern must compile");
        Self {
            function: compile(
                r"(?m)^[ \t]*export\s+(?:default\s+)?(?:async\s+)?function\s*\*?\s+([A-Za-z_$][\w$]*)",
            ),
            constant: compile(r"(?m)^[ \t]*export\s+const\s+([A-Za-z_$][\w$]*)"),
            class: compile(r"(?m)^[ \t]*export\s+(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)"),
            interface: compile(r"(?m)^[ \t]*export\s+(?:interface|type)\s+([A-Za-z_$][\w$]*)"),
            method: compile(
                r"^\s*(?:public\s+|static\s+|async\s+|readonly\s+)*([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\([^)]*\)?\s*(?::[^{]*)?\{",
            ),
            object_method: compile(
                r"^\s*(?:async\s+)?([A-Za-z_$][\w$]*)\s*(?::\s*(?:async\s*)?(?:\(|function\b|[A-Za-z_$][\w$]*\s*=>)|\()",
            ),
            field: compile(r"^\s*(?:readonly\s+)?([A-Za-z_$][\w$]*)\??\s*:"),
            returns: compile(r"return\s*[\{\[]([^}\]]*)[\}\]]"),
        }
    }

    /// Extract every recognised declaration from one file.
    pub fn scan(&self, path: &str, text: &str) -> Vec<Declaration> {
        let mut found: Vec<(usize, Shape, String)> = Vec::new();
        for (re, shape) in [
            (&self.function, Shape::Function),
            (&self.constant, Shape::Const),
            (&self.class, Shape::Class),
            (&self.interface, Shape::Interface),
        ] {
            for caps in re.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    found.push((m.start(), shape, m.as_str().to_string()));
                }
            }
        }
        found.sort_by_key(|(pos, _, _)| *pos);

        found
            .into_iter()
            .filter_map(|(pos, shape, name)| self.declaration(path, text, pos, shape, name))
            .collect()
    }

    fn declaration(
        &self,
        path: &str,
        text: &str,
        pos: usize,
        shape: Shape,
        name: String,
    ) -> Option<Declaration> {
        let rest = &text[pos + name.len()..];
        let header_end = rest.find('\n').unwrap_or(rest.len());
        let header = &rest[..header_end];
        let kind = classify(&name, shape, header)?;
        let block = block_after(rest);
        let category = category_for(path, kind);
        let file_path = Some(path.to_string());
        let functionality = vec![describe(&name, kind)];

        let metadata = match kind {
            EntityKind::Component => EntityMetadata::Component(ComponentMeta {
                file_path,
                category: Some(category),
                functionality,
                props: destructured_params(rest),
                description: None,
            }),
            EntityKind::Hook => EntityMetadata::Hook(HookMeta {
                file_path,
                category: Some(category),
                functionality,
                returns: self.hook_returns(block),
                description: None,
            }),
            EntityKind::Service => EntityMetadata::Service(ServiceMeta {
                file_path,
                category: Some(category),
                functionality,
                methods: self.members_at_depth_one(block, |line| {
                    self.method
                        .captures(line)
                        .or_else(|| self.object_method.captures(line))
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().to_string())
                        .filter(|m| !NON_METHODS.contains(&m.as_str()) && !m.starts_with('_'))
                }),
                description: None,
            }),
            EntityKind::Type => EntityMetadata::Type(TypeMeta {
                file_path,
                category: Some(category),
                fields: self.members_at_depth_one(block, |line| {
                    self.field
                        .captures(line)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().to_string())
                }),
                description: None,
            }),
        };

        Some(Declaration {
            name,
            kind,
            line: text[..pos].matches('\n').count() + 1,
            metadata,
        })
    }

    fn members_at_depth_one<F>(&self, block: &str, extract: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut members: Vec<String> = Vec::new();
        let mut depth: i32 = 0;
        for line in block.lines() {
            if depth == 1 {
                if let Some(member) = extract(line) {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
            }
            depth += line.matches('{').count() as i32 - line.matches('}').count() as i32;
        }
        members
    }

    fn hook_returns(&self, block: &str) -> Vec<String> {
        self.returns
            .captures_iter(block)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| identifiers(m.as_str()))
            .unwrap_or_default()
    }
}

impl Default for DeclarationScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(name: &str, shape: Shape, header: &str) -> Option<EntityKind> {
    if shape == Shape::Interface {
        return Some(EntityKind::Type);
    }
    if is_hook_name(name) {
        return Some(EntityKind::Hook);
    }
    if SERVICE_SUFFIXES
        .iter()
        .any(|s| name.ends_with(s) || name.ends_with(&s.to_lowercase()))
    {
        return Some(EntityKind::Service);
    }
    let pascal = name.chars().next().map(char::is_uppercase).unwrap_or(false);
    match shape {
        Shape::Class if header.contains("Component") => Some(EntityKind::Component),
        Shape::Class => Some(EntityKind::Service),
        Shape::Function | Shape::Const if pascal && !is_constant_case(name) => {
            Some(EntityKind::Component)
        }
        _ => None,
    }
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .map(char::is_uppercase)
        .unwrap_or(false)
}

fn is_constant_case(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Parent directory name, or the kind name for top-level files.
pub fn category_for(path: &str, kind: EntityKind) -> String {
    let normalized = path.replace('\\', "/");
    let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    match segments.last() {
        Some(&dir) if dir != "src" && dir != "." => dir.to_string(),
        _ => kind.as_str().to_string(),
    }
}

fn describe(name: &str, kind: EntityKind) -> String {
    let mut words = split_identifier(name);
    if kind == EntityKind::Hook && words.first().map(String::as_str) == Some("use") {
        words.remove(0);
    }
    if words.is_empty() {
        name.to_lowercase()
    } else {
        words.join(" ")
    }
}

/// Text from `rest` through the end of its first balanced `{ … }` block,
/// or through the first line when no block opens on it.
fn block_after(rest: &str) -> &str {
    let mut depth = 0usize;
    let mut opened = false;
    for (i, c) in rest.char_indices() {
        match c {
            '{' => {
                depth += 1;
                opened = true;
            }
            '}' if opened => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &rest[..=i];
                }
            }
            '\n' if !opened => return &rest[..i],
            _ => {}
        }
    }
    rest
}

/// Names destructured in the first parameter list: `({ user, onClick = noop })`.
/// The list must open on the declaration's own line.
fn destructured_params(rest: &str) -> Vec<String> {
    let header_end = rest.find(['\n', ';']).unwrap_or(rest.len());
    let Some(open) = rest[..header_end].find('(') else {
        return Vec::new();
    };
    let after = &rest[open + 1..];
    let trimmed = after.trim_start();
    if !trimmed.starts_with('{') {
        return Vec::new();
    }
    let Some(close) = trimmed.find('}') else {
        return Vec::new();
    };
    identifiers(&trimmed[1..close])
}

/// Leading identifiers of comma-separated items, skipping spreads.
fn identifiers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.starts_with("..."))
        .filter_map(|item| {
            let ident: String = item
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                .collect();
            (!ident.is_empty()).then_some(ident)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = r#"import React from 'react';

export function UserCard({ user, onClick = () => {}, ...rest }: Props) {
  return <div onClick={onClick}>{user.name}</div>;
}

export const ConnectorList = ({ connectors }) => {
  return null;
};

export const MAX_ITEMS = 10;
export function formatDate(d) { return d; }
"#;

    #[test]
    fn test_components_and_props() {
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/components/ui/UserCard.tsx", COMPONENT);
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["UserCard", "ConnectorList"]);

        let card = &found[0];
        assert_eq!(card.kind, EntityKind::Component);
        assert_eq!(card.line, 3);
        assert_eq!(card.metadata.category(), Some("ui"));
        assert_eq!(card.metadata.members(), &["user".to_string(), "onClick".to_string()]);
        assert_eq!(card.metadata.functionality(), &["user card".to_string()]);
        assert!(card.metadata.missing_required().is_empty());
    }

    #[test]
    fn test_const_component_does_not_borrow_next_props() {
        let text = "export const Title = 'Dashboard';\n\nexport function Header({ title, subtitle }) {\n  return null;\n}\n";
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/layout/Header.tsx", text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Title");
        assert!(found[0].metadata.members().is_empty());
        assert_eq!(
            found[1].metadata.members(),
            &["title".to_string(), "subtitle".to_string()]
        );
    }

    #[test]
    fn test_hook_returns() {
        let text = r#"export const useUsers = () => {
  const [users, setUsers] = useState([]);
  return { users, refresh: load, loading };
};
"#;
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/hooks/useUsers.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EntityKind::Hook);
        assert_eq!(found[0].metadata.functionality(), &["users".to_string()]);
        assert_eq!(
            found[0].metadata.members(),
            &["users".to_string(), "refresh".to_string(), "loading".to_string()]
        );
    }

    #[test]
    fn test_service_class_methods() {
        let text = r#"export class ConnectorService {
  private cache = new Map();

  async listConnectors(): Promise<Connector[]> {
    if (this.cache.size) {
      return [];
    }
    return [];
  }

  static create() {
    return new ConnectorService();
  }

  _internal() {}
}
"#;
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/services/connectorService.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EntityKind::Service);
        assert_eq!(found[0].metadata.category(), Some("services"));
        assert_eq!(
            found[0].metadata.members(),
            &["listConnectors".to_string(), "create".to_string()]
        );
    }

    #[test]
    fn test_object_service_methods() {
        let text = r#"export const authService = {
  login: async (email, password) => {
    return null;
  },
  logout() {
    return null;
  },
};
"#;
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/services/auth.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EntityKind::Service);
        assert_eq!(
            found[0].metadata.members(),
            &["login".to_string(), "logout".to_string()]
        );
    }

    #[test]
    fn test_interface_fields() {
        let text = "export interface User {\n  id: string;\n  email?: string;\n  readonly createdAt: Date;\n}\n";
        let scanner = DeclarationScanner::new();
        let found = scanner.scan("src/types.ts", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, EntityKind::Type);
        assert_eq!(found[0].metadata.category(), Some("type"));
        assert_eq!(
            found[0].metadata.members(),
            &["id".to_string(), "email".to_string(), "createdAt".to_string()]
        );
    }

    #[test]
    fn test_category_for() {
        assert_eq!(category_for("src/components/ui/Button.tsx", EntityKind::Component), "ui");
        assert_eq!(category_for("src/Button.tsx", EntityKind::Component), "component");
        assert_eq!(category_for("Button.tsx", EntityKind::Component), "component");
        assert_eq!(category_for("src\\hooks\\useX.ts", EntityKind::Hook), "hooks");
    }
}
