//! Decorator registry and builtin decorator shapes
//!
//! The parser consults the registry to classify `@name` decorators and to
//! validate their arguments and pattern branches.

pub mod builtins;
pub mod registry;

pub use registry::{
    global, register_global, DecoratorDef, DecoratorKind, DecoratorRegistry, ParamSchema,
    ParamType, PatternSchema,
};
