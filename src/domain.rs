use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, FuncArgs, Map, Scope, AST};

use crate::handles::{ObjectHandle, ObjectHeap};
use crate::world::Entity;

/// Marker value a class map must carry in its `base` entry to be discovered.
/// Only the direct parent counts; subclassing a discovered class does not
/// make the subclass discoverable.
const BASE_CLASS_NAME: &str = "Component";

/// Mutations requested by script code, applied to the native world after the
/// invocation batch that queued them returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorldCommand {
    SetPosition { entity: Entity, position: Vec3 },
}

/// Host API visible to scripts through the entity mirror's `universe` field.
/// Set once at mirror construction.
#[derive(Clone)]
pub struct WorldApi {
    commands: Rc<RefCell<Vec<WorldCommand>>>,
}

impl WorldApi {
    fn set_position(&mut self, entity: i64, x: f64, y: f64, z: f64) {
        self.commands.borrow_mut().push(WorldCommand::SetPosition {
            entity: Entity(entity as i32),
            position: Vec3::new(x as f32, y as f32, z as f32),
        });
    }
}

/// The isolated execution context hosting the loaded assembly and every live
/// script object. Teardown (`reset`) invalidates every outstanding handle.
pub struct ScriptDomain {
    engine: Engine,
    ast: Option<AST>,
    globals: Scope<'static>,
    heap: ObjectHeap,
    commands: Rc<RefCell<Vec<WorldCommand>>>,
}

impl Default for ScriptDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptDomain {
    pub fn new() -> Self {
        Self {
            engine: build_engine(),
            ast: None,
            globals: Scope::new(),
            heap: ObjectHeap::new(),
            commands: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn loaded(&self) -> bool {
        self.ast.is_some()
    }

    /// Compiles the assembly source and evaluates its top level, replacing any
    /// previously loaded assembly. On failure the domain is left loaded with
    /// nothing; live objects are not touched.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.ast = None;
        self.globals = Scope::new();

        let source = fs::read_to_string(path)
            .with_context(|| format!("reading script assembly '{}'", path.display()))?;
        let ast = self
            .engine
            .compile(&source)
            .with_context(|| format!("compiling script assembly '{}'", path.display()))?;
        let mut globals = Scope::new();
        self.engine
            .run_ast_with_scope(&mut globals, &ast)
            .map_err(|err| anyhow!("evaluating top level of '{}': {err}", path.display()))?;

        self.globals = globals;
        self.ast = Some(ast);
        Ok(())
    }

    /// Hard reset: drops every live object, forgets the assembly and rebuilds
    /// the engine. Every handle handed out before this call is invalid after.
    pub fn reset(&mut self) {
        self.heap.clear();
        self.ast = None;
        self.globals = Scope::new();
        self.commands.borrow_mut().clear();
        self.engine = build_engine();
    }

    /// Names of every class in the loaded assembly whose direct parent is the
    /// base component class, in declaration order.
    pub fn component_classes(&self) -> Vec<String> {
        self.globals
            .iter()
            .filter_map(|(name, _, value)| {
                let map = value.try_cast::<Map>()?;
                let base = map.get("base")?.clone().into_immutable_string().ok()?;
                (base == BASE_CLASS_NAME).then(|| name.to_string())
            })
            .collect()
    }

    /// Instantiates a class by cloning its template map. Returns `None` when
    /// the class is absent from the loaded assembly.
    pub fn create_object(&mut self, class_name: &str) -> Option<ObjectHandle> {
        let template = self.globals.get_value::<Map>(class_name)?;
        Some(self.heap.acquire(Dynamic::from_map(template)))
    }

    /// Builds the script-side representation of a native entity: a shared map
    /// carrying the entity index and the host API, both bound exactly once.
    pub fn create_entity_mirror(&mut self, entity: Entity) -> ObjectHandle {
        let mut mirror = Map::new();
        mirror.insert("native".into(), Dynamic::from(i64::from(entity.0)));
        mirror.insert("universe".into(), Dynamic::from(WorldApi { commands: self.commands.clone() }));
        self.heap.acquire(Dynamic::from_map(mirror).into_shared())
    }

    /// Stores the (shared) entity mirror in the instance's `entity` entry so
    /// every script attached to the same entity sees the same mirror object.
    pub fn bind_entity(&mut self, instance: ObjectHandle, mirror: ObjectHandle) {
        let mirror_ref = self.heap.resolve(mirror).clone();
        let object = self.heap.resolve_mut(instance);
        let mut map = object.write_lock::<Map>().expect("script instance is not an object map");
        map.insert("entity".into(), mirror_ref);
    }

    /// Whether the object's class exposes a hook with this name and exact
    /// argument count. Absence is a valid state, not an error.
    pub fn has_method(&self, handle: ObjectHandle, method: &str, arity: usize) -> bool {
        let Some(ast) = self.ast.as_ref() else { return false };
        let Some(fn_name) = self.method_target(handle, method) else { return false };
        ast.iter_functions().any(|f| f.name == fn_name && f.params.len() == arity)
    }

    /// Looks up a hook by name and argument count and invokes it with `this`
    /// bound to the instance. Returns `false` when the hook is absent (no side
    /// effect, nothing logged) or when the call raised an error (logged under
    /// the script channel). Mutations of `this` persist on the instance.
    pub fn try_call(&mut self, handle: ObjectHandle, method: &str, args: impl FuncArgs) -> bool {
        let Some(ast) = self.ast.as_ref() else { return false };
        let Some(fn_name) = self.method_target(handle, method) else { return false };

        let mut values: Vec<Dynamic> = Vec::new();
        args.parse(&mut values);
        if !ast.iter_functions().any(|f| f.name == fn_name && f.params.len() == values.len()) {
            return false;
        }

        let mut scope = Scope::new();
        let this = self.heap.resolve_mut(handle);
        let options = CallFnOptions::new().eval_ast(false).bind_this_ptr(this);
        match self.engine.call_fn_with_options::<Dynamic>(options, &mut scope, ast, &fn_name, values) {
            Ok(_) => true,
            Err(err) => {
                if !matches!(err.as_ref(), EvalAltResult::ErrorFunctionNotFound(..)) {
                    eprintln!("[rhai] '{fn_name}' raised: {err}");
                }
                false
            }
        }
    }

    /// Resolves the function-pointer entry a hook name points at, if any.
    fn method_target(&self, handle: ObjectHandle, method: &str) -> Option<String> {
        let object = self.heap.resolve(handle);
        let map = object.read_lock::<Map>().expect("script instance is not an object map");
        let ptr = map.get(method)?.clone().try_cast::<FnPtr>()?;
        Some(ptr.fn_name().to_string())
    }

    pub fn release_object(&mut self, handle: ObjectHandle) {
        self.heap.release(handle);
    }

    pub fn live_objects(&self) -> usize {
        self.heap.len()
    }

    pub fn drain_commands(&mut self) -> Vec<WorldCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_fast_operators(true);
    engine.register_type_with_name::<WorldApi>("World");
    engine.register_fn("set_position", WorldApi::set_position);
    engine.register_fn("log", |message: &str| eprintln!("[rhai] {message}"));
    engine
}
