//! Decorator registry
//!
//! Classifies every `@decorator` by kind and carries its parameter schema
//! (and, for pattern decorators, its pattern schema). The parser depends on
//! this interface only; concrete decorator behavior lives with external
//! collaborators. The process-wide registry is populated with the builtin
//! set during initialization and is append-only afterwards: registrations
//! happen at program boot, lookups during parsing are read-only.

use std::sync::{RwLock, RwLockReadGuard};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::Serialize;

use crate::decorator::builtins;

/// The four decorator shapes the parser dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecoratorKind {
    /// Inline, yields a value (e.g. `@var`, `@env`)
    Value,
    /// Standalone statement (e.g. `@cmd`)
    Action,
    /// Wraps a `{ ... }` body (e.g. `@timeout`)
    Block,
    /// Dispatches across named branches (e.g. `@when`)
    Pattern,
}

impl DecoratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Action => "action",
            Self::Block => "block",
            Self::Pattern => "pattern",
        }
    }
}

/// Argument type accepted by a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamType {
    String,
    Number,
    Duration,
    Boolean,
    Identifier,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Duration => "duration",
            Self::Boolean => "boolean",
            Self::Identifier => "identifier",
        }
    }
}

/// One entry of a decorator's ordered parameter list. Positional arguments
/// bind to entries in order; named arguments bind by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSchema {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParamSchema {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            description: description.to_string(),
        }
    }
}

/// Branch rules for a pattern decorator. The branch named `default` denotes
/// the wildcard.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PatternSchema {
    pub allowed_patterns: Vec<String>,
    pub required_patterns: Vec<String>,
    pub allows_wildcard: bool,
    pub allows_any_identifier: bool,
}

impl PatternSchema {
    /// Whether a branch with the given name is acceptable.
    pub fn allows(&self, name: &str) -> bool {
        if name == "default" {
            return self.allows_wildcard;
        }
        self.allows_any_identifier || self.allowed_patterns.iter().any(|p| p == name)
    }
}

/// A registered decorator: its kind plus schemas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoratorDef {
    pub name: String,
    pub kind: DecoratorKind,
    pub params: Vec<ParamSchema>,
    pub pattern_schema: Option<PatternSchema>,
    pub description: String,
}

impl DecoratorDef {
    pub fn new(name: &str, kind: DecoratorKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            params: Vec::new(),
            pattern_schema: None,
            description: description.to_string(),
        }
    }

    pub fn with_params(mut self, params: Vec<ParamSchema>) -> Self {
        self.params = params;
        self
    }

    pub fn with_pattern_schema(mut self, schema: PatternSchema) -> Self {
        self.pattern_schema = Some(schema);
        self
    }
}

/// Append-only decorator registry
pub struct DecoratorRegistry {
    decorators: IndexMap<String, DecoratorDef>,
}

impl DecoratorRegistry {
    /// An empty registry with no decorators registered.
    pub fn new() -> Self {
        Self {
            decorators: IndexMap::new(),
        }
    }

    /// A registry pre-populated with the builtin decorator set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_builtins(&mut registry);
        registry
    }

    /// Register a decorator definition. Re-registering an existing name is
    /// ignored; the registry is append-only.
    pub fn register(&mut self, def: DecoratorDef) {
        self.decorators.entry(def.name.clone()).or_insert(def);
    }

    pub fn lookup(&self, name: &str) -> Option<&DecoratorDef> {
        self.decorators.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.decorators.contains_key(name)
    }

    pub fn is_value(&self, name: &str) -> bool {
        self.kind_of(name) == Some(DecoratorKind::Value)
    }

    pub fn is_action(&self, name: &str) -> bool {
        self.kind_of(name) == Some(DecoratorKind::Action)
    }

    pub fn is_block(&self, name: &str) -> bool {
        self.kind_of(name) == Some(DecoratorKind::Block)
    }

    pub fn is_pattern(&self, name: &str) -> bool {
        self.kind_of(name) == Some(DecoratorKind::Pattern)
    }

    pub fn kind_of(&self, name: &str) -> Option<DecoratorKind> {
        self.decorators.get(name).map(|d| d.kind)
    }

    pub fn param_schema(&self, name: &str) -> Option<&[ParamSchema]> {
        self.decorators.get(name).map(|d| d.params.as_slice())
    }

    pub fn pattern_schema(&self, name: &str) -> Option<&PatternSchema> {
        self.decorators.get(name).and_then(|d| d.pattern_schema.as_ref())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.decorators.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for DecoratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: RwLock<DecoratorRegistry> =
        RwLock::new(DecoratorRegistry::with_builtins());
}

/// Read access to the process-wide registry.
pub fn global() -> RwLockReadGuard<'static, DecoratorRegistry> {
    GLOBAL_REGISTRY.read().unwrap_or_else(|e| e.into_inner())
}

/// Register a decorator in the process-wide registry. Intended for program
/// initialization, before any parsing starts.
pub fn register_global(def: DecoratorDef) {
    GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .register(def);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = DecoratorRegistry::with_builtins();
        assert!(registry.exists("var"));
        assert!(registry.exists("env"));
        assert!(registry.exists("timeout"));
        assert!(registry.exists("when"));
        assert!(!registry.exists("nosuch"));
    }

    #[test]
    fn test_kind_predicates() {
        let registry = DecoratorRegistry::with_builtins();
        assert!(registry.is_value("var"));
        assert!(registry.is_action("cmd"));
        assert!(registry.is_block("timeout"));
        assert!(registry.is_pattern("when"));
        assert!(!registry.is_block("var"));
        assert!(!registry.is_pattern("nosuch"));
    }

    #[test]
    fn test_register_is_append_only() {
        let mut registry = DecoratorRegistry::new();
        registry.register(DecoratorDef::new("x", DecoratorKind::Block, "first"));
        registry.register(DecoratorDef::new("x", DecoratorKind::Value, "second"));
        let def = registry.lookup("x").unwrap();
        assert_eq!(def.kind, DecoratorKind::Block);
        assert_eq!(def.description, "first");
    }

    #[test]
    fn test_param_schema_lookup() {
        let registry = DecoratorRegistry::with_builtins();
        let params = registry.param_schema("timeout").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "duration");
        assert_eq!(params[0].param_type, ParamType::Duration);
        assert!(params[0].required);
    }

    #[test]
    fn test_pattern_schema_rules() {
        let registry = DecoratorRegistry::with_builtins();

        let when = registry.pattern_schema("when").unwrap();
        assert!(when.allows("prod"));
        assert!(when.allows("default"));

        let try_schema = registry.pattern_schema("try").unwrap();
        assert!(try_schema.allows("main"));
        assert!(try_schema.allows("finally"));
        assert!(!try_schema.allows("default"));
        assert!(!try_schema.allows("whatever"));
        assert_eq!(try_schema.required_patterns, vec!["main".to_string()]);
    }

    #[test]
    fn test_global_registry_reads() {
        assert!(global().exists("retry"));
        assert!(global().is_pattern("try"));
    }

    #[test]
    fn test_names_preserve_registration_order() {
        let mut registry = DecoratorRegistry::new();
        registry.register(DecoratorDef::new("b", DecoratorKind::Value, ""));
        registry.register(DecoratorDef::new("a", DecoratorKind::Value, ""));
        assert_eq!(registry.names(), vec!["b", "a"]);
    }
}
