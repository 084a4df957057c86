//! Attaches instances of script-defined classes to entities of a native
//! component registry and keeps the two object worlds consistent across
//! creation, serialization, hot reload and destruction.
//!
//! A script "assembly" is a single rhai source file. A script class is a
//! top-level constant object map whose `base` entry names its direct parent;
//! classes whose direct parent is `"Component"` are discovered and can be
//! attached to entities by class-name hash. Hooks (`start_game`, `update`)
//! are map entries holding function pointers and are discovered by presence,
//! never declared through an interface.

pub mod domain;
pub mod handles;
pub mod registry;
pub mod scene;
pub mod world;

pub use domain::ScriptDomain;
pub use handles::ObjectHandle;
pub use registry::class_name_hash;
pub use scene::{ScriptComponentData, ScriptScene, DEFAULT_ASSEMBLY_PATH, SCRIPT_COMPONENT_TYPE_NAME};
pub use world::{ComponentHandle, ComponentType, Entity, World};
