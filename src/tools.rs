//! The analysis tool surface.
//!
//! Every capability of the guard is exposed as a [`Tool`]: a name, a
//! description, a JSON Schema for its parameters and an async `execute`.
//! The HTTP server lists and dispatches them; the CLI reuses the same
//! guard operations directly.
//!
//! | Tool | Operation |
//! |------|-----------|
//! | `analyze_component` | full gateway decision plus audit write |
//! | `register_component` | registry registration, mirrored into the catalog |
//! | `validate_component` | dry-run registration checks |
//! | `search_catalog` | ranked catalog search |
//! | `get_statistics` | registry and catalog counts |
//! | `run_analysis` | filesystem scan of a source tree |
//! | `validate_code` | mock-data and type-safety checks on a snippet |
//! | `get_similar_components` | catalog neighbours of a named entry |
//!
//! Results use the text-content envelope:
//!
//! ```json
//! { "content": [ { "type": "text", "text": "<pretty JSON>" } ] }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use stability_guard_core::catalog::SearchOptions;
use stability_guard_core::gateway::CreationRequest;
use stability_guard_core::models::{EntityKind, EntityMetadata};

use crate::config::Config;
use crate::guard::StabilityGuard;
use crate::scan;

/// A callable analysis tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name: `POST /tools/{name}`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run with parameters already checked by [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Shared state handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub guard: Arc<StabilityGuard>,
    pub config: Arc<Config>,
}

impl ToolContext {
    pub fn new(guard: Arc<StabilityGuard>, config: Arc<Config>) -> Self {
        Self { guard, config }
    }
}

/// Serializable tool info for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Wrap a JSON value in the text-content envelope.
pub fn text_content(value: &Value) -> Result<Value> {
    Ok(json!({
        "content": [
            { "type": "text", "text": serde_json::to_string_pretty(value)? }
        ]
    }))
}

fn respond<T: Serialize>(value: &T) -> Result<Value> {
    text_content(&serde_json::to_value(value)?)
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| anyhow::anyhow!("invalid parameters: {}", e))
}

/// Build kind-tagged metadata from a plain object.
fn metadata_from(kind: EntityKind, metadata: Value) -> Result<EntityMetadata> {
    let mut object = match metadata {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => bail!("invalid metadata: expected object, got {}", json_type_name(&other)),
    };
    object.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
    serde_json::from_value(Value::Object(object))
        .map_err(|e| anyhow::anyhow!("invalid metadata: {}", e))
}

const KIND_ENUM: [&str; 4] = ["component", "service", "hook", "type"];

#[derive(Deserialize)]
struct EntityParams {
    name: String,
    kind: EntityKind,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    tags: Vec<String>,
}

fn entity_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Entity name, e.g. UserCard" },
            "kind": { "type": "string", "enum": KIND_ENUM },
            "metadata": {
                "type": "object",
                "description": "file_path, category, functionality, description and one of props / methods / returns / fields"
            },
            "tags": { "type": "array", "description": "Catalog tags" }
        },
        "required": ["name", "kind"]
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct AnalyzeComponentTool;

#[async_trait]
impl Tool for AnalyzeComponentTool {
    fn name(&self) -> &str {
        "analyze_component"
    }

    fn description(&self) -> &str {
        "Decide whether a proposed component, service, hook, type, table or column may be created"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["component", "service", "hook", "type", "module", "utility", "table", "column"]
                },
                "name": { "type": "string" },
                "table_name": { "type": "string", "description": "Owning table for column requests" },
                "functionality": { "type": "array" },
                "description": { "type": "string" },
                "required_fields": { "type": "array", "description": "Columns a table request defines" },
                "category": { "type": "string" },
                "members": { "type": "array", "description": "Props, methods, returns or fields" },
                "source": { "type": "string", "description": "Proposed source text" }
            },
            "required": ["kind", "name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: CreationRequest = parse_params(params)?;
        if request.name.trim().is_empty() {
            bail!("name must not be empty");
        }
        let result = ctx.guard.analyze(&request).await;
        respond(&result)
    }
}

pub struct RegisterComponentTool;

#[async_trait]
impl Tool for RegisterComponentTool {
    fn name(&self) -> &str {
        "register_component"
    }

    fn description(&self) -> &str {
        "Register an entity; rejects name clashes and functional duplicates"
    }

    fn parameters_schema(&self) -> Value {
        entity_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: EntityParams = parse_params(params)?;
        let metadata = metadata_from(p.kind, p.metadata)?;
        let registration = ctx.guard.register(&p.name, metadata, p.tags)?;
        respond(&json!({
            "registered": registration.record,
            "warnings": registration.warnings,
        }))
    }
}

pub struct ValidateComponentTool;

#[async_trait]
impl Tool for ValidateComponentTool {
    fn name(&self) -> &str {
        "validate_component"
    }

    fn description(&self) -> &str {
        "Check whether an entity could be registered without registering it"
    }

    fn parameters_schema(&self) -> Value {
        entity_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: EntityParams = parse_params(params)?;
        let metadata = metadata_from(p.kind, p.metadata)?;
        respond(&ctx.guard.check_registration(&p.name, &metadata))
    }
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(flatten)]
    options: SearchOptions,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

pub struct SearchCatalogTool;

#[async_trait]
impl Tool for SearchCatalogTool {
    fn name(&self) -> &str {
        "search_catalog"
    }

    fn description(&self) -> &str {
        "Search the component catalog by name, description, tags and functionality"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Empty matches everything" },
                "category": { "type": "string" },
                "tags": { "type": "array" },
                "type": { "type": "string", "enum": KIND_ENUM },
                "fuzzy": { "type": "boolean", "default": false },
                "limit": { "type": "integer", "default": 20 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: SearchParams = parse_params(params)?;
        let hits = ctx.guard.search(&p.query, &p.options);
        let total = hits.len();
        let results: Vec<_> = hits.into_iter().take(p.limit).collect();
        respond(&json!({ "total": total, "results": results }))
    }
}

pub struct GetStatisticsTool;

#[async_trait]
impl Tool for GetStatisticsTool {
    fn name(&self) -> &str {
        "get_statistics"
    }

    fn description(&self) -> &str {
        "Registry and catalog counts by kind and category"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        respond(&ctx.guard.stats())
    }
}

pub struct RunAnalysisTool;

#[async_trait]
impl Tool for RunAnalysisTool {
    fn name(&self) -> &str {
        "run_analysis"
    }

    fn description(&self) -> &str {
        "Scan a source tree for duplicate declarations and mock data"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Scan root; defaults to [scan].root" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let root = params["path"].as_str().map(PathBuf::from);
        let guard = ctx.guard.clone();
        let config = ctx.config.clone();
        let report = tokio::task::spawn_blocking(move || {
            scan::run_scan(&guard, &config.scan, root.as_deref())
        })
        .await??;
        respond(&report)
    }
}

pub struct ValidateCodeTool;

#[async_trait]
impl Tool for ValidateCodeTool {
    fn name(&self) -> &str {
        "validate_code"
    }

    fn description(&self) -> &str {
        "Check a code snippet for mock data and unsafe TypeScript"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string" },
                "path": { "type": "string", "default": "snippet.tsx" }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let code = params["code"].as_str().unwrap_or("");
        if code.trim().is_empty() {
            bail!("code must not be empty");
        }
        let path = params["path"].as_str().unwrap_or("snippet.tsx");
        respond(&ctx.guard.validate_code(path, code))
    }
}

pub struct GetSimilarComponentsTool;

#[async_trait]
impl Tool for GetSimilarComponentsTool {
    fn name(&self) -> &str {
        "get_similar_components"
    }

    fn description(&self) -> &str {
        "Catalog entries similar to a named entry"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "threshold": { "type": "number", "description": "Defaults to [catalog].similar_threshold" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = params["name"].as_str().unwrap_or("");
        if name.trim().is_empty() {
            bail!("name must not be empty");
        }
        let threshold = params["threshold"].as_f64();
        let similar = ctx.guard.similar(name, threshold);
        respond(&json!({
            "name": name,
            "threshold": threshold.unwrap_or(ctx.guard.similar_threshold()),
            "similar": similar,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// All eight analysis tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AnalyzeComponentTool));
        registry.register(Box::new(RegisterComponentTool));
        registry.register(Box::new(ValidateComponentTool));
        registry.register(Box::new(SearchCatalogTool));
        registry.register(Box::new(GetStatisticsTool));
        registry.register(Box::new(RunAnalysisTool));
        registry.register(Box::new(ValidateCodeTool));
        registry.register(Box::new(GetSimilarComponentsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Validate parameters against the tool's schema, then execute it.
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| anyhow::anyhow!("tool not found: {}", name))?;
        let params = validate_params(&tool.parameters_schema(), &params)?;
        tool.execute(params, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check required fields, JSON types and enums; inject schema defaults.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("invalid parameters: expected object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(*field) {
            bail!("invalid parameters: missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();
    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "invalid parameters: '{}' must be of type '{}', got {}",
                    prop_name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "invalid parameters: '{}' must be one of [{}], got {}",
                    prop_name,
                    names.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stability_guard_core::registry::RegistryError;

    fn ctx() -> ToolContext {
        let config = Arc::new(Config::minimal());
        ToolContext::new(Arc::new(StabilityGuard::in_memory(&config)), config)
    }

    fn text_json(result: &Value) -> Value {
        let text = result["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    fn user_card() -> Value {
        json!({
            "name": "UserCard",
            "kind": "component",
            "metadata": {
                "file_path": "src/components/UserCard.tsx",
                "category": "ui",
                "functionality": ["display user info"],
                "props": ["user", "onClick"]
            },
            "tags": ["card"]
        })
    }

    #[test]
    fn test_builtins_are_registered() {
        let tools = ToolRegistry::with_builtins();
        assert_eq!(tools.len(), 8);
        for name in [
            "analyze_component",
            "register_component",
            "validate_component",
            "search_catalog",
            "get_statistics",
            "run_analysis",
            "validate_code",
            "get_similar_components",
        ] {
            assert!(tools.find(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_validate_params_defaults_and_types() {
        let schema = SearchCatalogTool.parameters_schema();
        let out = validate_params(&schema, &json!({ "query": "card" })).unwrap();
        assert_eq!(out["limit"], 20);
        assert_eq!(out["fuzzy"], false);

        let err = validate_params(&schema, &json!({ "query": 3 })).unwrap_err();
        assert!(err.to_string().contains("must be of type 'string'"));

        let err = validate_params(&schema, &json!({ "type": "widget" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));

        let schema = ValidateCodeTool.parameters_schema();
        assert!(validate_params(&schema, &json!({})).is_err());
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let tools = ToolRegistry::with_builtins();
        let ctx = ctx();
        let out = tools
            .call("register_component", user_card(), &ctx)
            .await
            .unwrap();
        assert_eq!(text_json(&out)["registered"]["name"], "UserCard");

        let err = tools
            .call("register_component", user_card(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::DuplicateName { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_metadata_is_validation_error() {
        let tools = ToolRegistry::with_builtins();
        let err = tools
            .call(
                "register_component",
                json!({ "name": "Orphan", "kind": "component" }),
                &ctx(),
            )
            .await
            .unwrap_err();
        match err.downcast_ref::<RegistryError>() {
            Some(RegistryError::Validation { missing, .. }) => {
                assert_eq!(missing, &vec!["file_path", "category"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_analyze_and_search() {
        let tools = ToolRegistry::with_builtins();
        let ctx = ctx();
        tools
            .call("register_component", user_card(), &ctx)
            .await
            .unwrap();

        let out = tools
            .call(
                "analyze_component",
                json!({ "kind": "component", "name": "UserCard" }),
                &ctx,
            )
            .await
            .unwrap();
        let decision = text_json(&out);
        assert_eq!(decision["can_proceed"], false);
        assert_eq!(decision["audit"]["status"], "skipped");

        let out = tools
            .call("search_catalog", json!({ "query": "card" }), &ctx)
            .await
            .unwrap();
        let found = text_json(&out);
        assert_eq!(found["total"], 1);
        assert_eq!(found["results"][0]["entry"]["name"], "UserCard");
    }

    #[tokio::test]
    async fn test_validate_code_reports_mock_data() {
        let tools = ToolRegistry::with_builtins();
        let out = tools
            .call(
                "validate_code",
                json!({ "code": "const mockUsers = [];\nlet x: any = 1;\n" }),
                &ctx(),
            )
            .await
            .unwrap();
        let report = text_json(&out);
        assert_eq!(report["mock_data"]["violations"][0]["pattern"], "mock-variable");
        assert_eq!(report["type_safety"]["any_types"], 1);
        assert_eq!(report["type_safety"]["score"], 90);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = ToolRegistry::with_builtins()
            .call("nope", json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
