//! Builtin decorator definitions
//!
//! The standard decorator set wired into every registry at construction.
//! Only the shapes live here; behavior belongs to the runtime collaborators.

use crate::decorator::registry::{
    DecoratorDef, DecoratorKind, DecoratorRegistry, ParamSchema, ParamType, PatternSchema,
};

/// Register the standard decorator set into `registry`.
pub fn register_builtins(registry: &mut DecoratorRegistry) {
    registry.register(
        DecoratorDef::new("var", DecoratorKind::Value, "Expands a declared variable")
            .with_params(vec![ParamSchema::required(
                "name",
                ParamType::Identifier,
                "Variable to expand",
            )]),
    );

    registry.register(
        DecoratorDef::new("env", DecoratorKind::Value, "Expands an environment variable")
            .with_params(vec![
                ParamSchema::required("name", ParamType::Identifier, "Environment variable name"),
                ParamSchema::optional("default", ParamType::String, "Fallback when unset"),
            ]),
    );

    registry.register(
        DecoratorDef::new("cmd", DecoratorKind::Action, "Invokes another declared command")
            .with_params(vec![ParamSchema::required(
                "name",
                ParamType::Identifier,
                "Command to invoke",
            )]),
    );

    registry.register(
        DecoratorDef::new("timeout", DecoratorKind::Block, "Bounds body execution time")
            .with_params(vec![ParamSchema::required(
                "duration",
                ParamType::Duration,
                "Maximum run time",
            )]),
    );

    registry.register(
        DecoratorDef::new("retry", DecoratorKind::Block, "Re-runs the body on failure")
            .with_params(vec![
                ParamSchema::required("attempts", ParamType::Number, "Maximum attempts"),
                ParamSchema::optional("delay", ParamType::Duration, "Pause between attempts"),
            ]),
    );

    registry.register(
        DecoratorDef::new("parallel", DecoratorKind::Block, "Runs body items concurrently")
            .with_params(vec![
                ParamSchema::optional("concurrency", ParamType::Number, "Concurrent item limit"),
                ParamSchema::optional("failfast", ParamType::Boolean, "Stop on first failure"),
            ]),
    );

    registry.register(
        DecoratorDef::new("workdir", DecoratorKind::Block, "Runs the body in a directory")
            .with_params(vec![ParamSchema::required(
                "path",
                ParamType::String,
                "Working directory",
            )]),
    );

    registry.register(
        DecoratorDef::new("when", DecoratorKind::Pattern, "Dispatches on a variable's value")
            .with_params(vec![ParamSchema::required(
                "variable",
                ParamType::Identifier,
                "Variable to match on",
            )])
            .with_pattern_schema(PatternSchema {
                allowed_patterns: vec![],
                required_patterns: vec![],
                allows_wildcard: true,
                allows_any_identifier: true,
            }),
    );

    registry.register(
        DecoratorDef::new("try", DecoratorKind::Pattern, "Structured error handling")
            .with_pattern_schema(PatternSchema {
                allowed_patterns: vec!["main".into(), "error".into(), "finally".into()],
                required_patterns: vec!["main".into()],
                allows_wildcard: false,
                allows_any_identifier: false,
            }),
    );
}
