use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::domain::{ScriptDomain, WorldCommand};
use crate::handles::ObjectHandle;
use crate::registry::ClassRegistry;
use crate::world::{ComponentHandle, ComponentType, Entity, World};

pub const SCRIPT_COMPONENT_TYPE_NAME: &str = "rhai_script";
pub const DEFAULT_ASSEMBLY_PATH: &str = "scripts/main.rhai";

const UPDATE_HOOK: &str = "update";
const START_GAME_HOOK: &str = "start_game";

/// One slot in a component's ordered script list. An unassigned slot has hash
/// 0 and no live object; the pair only ever changes together.
#[derive(Clone, Copy)]
struct Script {
    name_hash: u32,
    handle: ObjectHandle,
}

impl Default for Script {
    fn default() -> Self {
        Self { name_hash: 0, handle: ObjectHandle::INVALID }
    }
}

struct ScriptComponent {
    entity: Entity,
    scripts: Vec<Script>,
    entity_handle: ObjectHandle,
}

/// Named-field form of one component, for the host's structured scene files.
/// Only class-name hashes are persisted, never script object state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptComponentData {
    pub entity: i32,
    #[serde(default)]
    pub scripts: Vec<u32>,
}

/// Entity-indexed store of script components, driving assembly load/reload,
/// per-tick dispatch and persistence.
pub struct ScriptScene {
    domain: ScriptDomain,
    registry: ClassRegistry,
    components: BTreeMap<Entity, ScriptComponent>,
    updates: Vec<ObjectHandle>,
    component_type: ComponentType,
    assembly_path: PathBuf,
    last_modified: Option<SystemTime>,
    game_running: bool,
}

impl Default for ScriptScene {
    fn default() -> Self {
        Self::new(DEFAULT_ASSEMBLY_PATH)
    }
}

impl ScriptScene {
    pub fn new(assembly_path: impl AsRef<Path>) -> Self {
        Self {
            domain: ScriptDomain::new(),
            registry: ClassRegistry::new(),
            components: BTreeMap::new(),
            updates: Vec::new(),
            component_type: ComponentType::named(SCRIPT_COMPONENT_TYPE_NAME),
            assembly_path: assembly_path.as_ref().to_path_buf(),
            last_modified: None,
            game_running: false,
        }
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn assembly_path(&self) -> &Path {
        &self.assembly_path
    }

    pub fn is_running(&self) -> bool {
        self.game_running
    }

    // ---------- assembly load / reload ----------

    /// Loads (or reloads) the assembly, then re-resolves every slot's stored
    /// class hash against the rebuilt registry. Slots whose class no longer
    /// exists become unassigned. Returns `false` on a missing or broken file,
    /// leaving the scene usable but scriptless; slots are still re-resolved
    /// (against an empty registry), so a failed reload unbinds every script.
    pub fn load_assembly(&mut self) -> bool {
        let loaded = self.load();
        let entities: Vec<Entity> = self.components.keys().copied().collect();
        for entity in entities {
            if !self.components[&entity].entity_handle.is_valid() {
                let mirror = self.domain.create_entity_mirror(entity);
                self.components
                    .get_mut(&entity)
                    .expect("component vanished during reload")
                    .entity_handle = mirror;
            }
            let count = self.components[&entity].scripts.len();
            for index in 0..count {
                let hash = self.components[&entity].scripts[index].name_hash;
                self.set_slot_class(entity, index, hash);
            }
        }
        loaded
    }

    /// Reloads the assembly when the file on disk is newer than the one
    /// currently loaded. Returns `true` when a reload was performed.
    pub fn reload_if_changed(&mut self) -> bool {
        let Ok(metadata) = fs::metadata(&self.assembly_path) else { return false };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if self.last_modified.map_or(true, |prev| modified > prev) {
            return self.load_assembly();
        }
        false
    }

    /// Hard reset of the script world: every slot and mirror handle is
    /// released, every slot hash zeroed, the update set emptied and the
    /// domain torn down and recreated. Nothing survives to resolve afterward.
    pub fn unload_assembly(&mut self) {
        if !self.domain.loaded() {
            return;
        }
        self.updates.clear();
        for component in self.components.values_mut() {
            for slot in component.scripts.iter_mut() {
                if slot.handle.is_valid() {
                    self.domain.release_object(slot.handle);
                }
                slot.handle = ObjectHandle::INVALID;
                slot.name_hash = 0;
            }
            if component.entity_handle.is_valid() {
                self.domain.release_object(component.entity_handle);
                component.entity_handle = ObjectHandle::INVALID;
            }
        }
        self.registry.clear();
        self.domain.reset();
        self.last_modified = None;
    }

    fn load(&mut self) -> bool {
        match self.domain.load(&self.assembly_path) {
            Ok(()) => {
                self.registry.rebuild(self.domain.component_classes());
                self.last_modified =
                    fs::metadata(&self.assembly_path).ok().and_then(|meta| meta.modified().ok());
                true
            }
            Err(err) => {
                eprintln!("[rhai] assembly load failed: {err:#}");
                self.registry.clear();
                self.last_modified = None;
                false
            }
        }
    }

    // ---------- component store ----------

    pub fn create_component(
        &mut self,
        world: &mut World,
        ty: ComponentType,
        entity: Entity,
    ) -> ComponentHandle {
        if ty != self.component_type {
            return ComponentHandle::INVALID;
        }
        let entity_handle = self.domain.create_entity_mirror(entity);
        self.components.insert(entity, ScriptComponent { entity, scripts: Vec::new(), entity_handle });
        world.add_component(entity, ty);
        ComponentHandle(entity.0)
    }

    pub fn destroy_component(&mut self, world: &mut World, cmp: ComponentHandle, ty: ComponentType) {
        if ty != self.component_type || !cmp.is_valid() {
            return;
        }
        let Some(component) = self.components.remove(&cmp.entity()) else { return };
        for slot in &component.scripts {
            if slot.handle.is_valid() {
                self.updates.retain(|h| *h != slot.handle);
                self.domain.release_object(slot.handle);
            }
        }
        if component.entity_handle.is_valid() {
            self.domain.release_object(component.entity_handle);
        }
        world.destroy_component(component.entity, ty);
    }

    pub fn get_component(&self, entity: Entity, ty: ComponentType) -> ComponentHandle {
        if ty != self.component_type {
            return ComponentHandle::INVALID;
        }
        if self.components.contains_key(&entity) {
            ComponentHandle(entity.0)
        } else {
            ComponentHandle::INVALID
        }
    }

    /// Appends an unassigned slot, returning its index. Indices stay stable
    /// until a later removal shifts them.
    pub fn add_script(&mut self, cmp: ComponentHandle) -> Option<usize> {
        let component = self.components.get_mut(&cmp.entity())?;
        component.scripts.push(Script::default());
        Some(component.scripts.len() - 1)
    }

    pub fn insert_script(&mut self, cmp: ComponentHandle, index: usize) {
        let Some(component) = self.components.get_mut(&cmp.entity()) else { return };
        if index > component.scripts.len() {
            return;
        }
        component.scripts.insert(index, Script::default());
    }

    /// Unassigns the slot, then removes it; later indices shift down by one.
    pub fn remove_script(&mut self, cmp: ComponentHandle, index: usize) {
        let entity = cmp.entity();
        let Some(component) = self.components.get(&entity) else { return };
        if index >= component.scripts.len() {
            return;
        }
        self.set_slot_class(entity, index, 0);
        self.components
            .get_mut(&entity)
            .expect("component vanished during script removal")
            .scripts
            .remove(index);
    }

    /// The central slot mutation: tears down any existing object, then (if the
    /// hash resolves) instantiates the class, links the entity mirror into the
    /// new instance and schedules it for updates when its class has the hook.
    pub fn set_script_class(&mut self, cmp: ComponentHandle, index: usize, name_hash: u32) {
        self.set_slot_class(cmp.entity(), index, name_hash);
    }

    fn set_slot_class(&mut self, entity: Entity, index: usize, name_hash: u32) {
        let Some(component) = self.components.get_mut(&entity) else { return };
        let mirror = component.entity_handle;
        let Some(slot) = component.scripts.get_mut(index) else { return };

        if slot.handle.is_valid() {
            let stale = slot.handle;
            self.updates.retain(|h| *h != stale);
            self.domain.release_object(stale);
            slot.handle = ObjectHandle::INVALID;
        }
        slot.name_hash = 0;
        if name_hash == 0 {
            return;
        }

        let Some(class_name) = self.registry.resolve(name_hash).map(str::to_string) else {
            return;
        };
        let Some(handle) = self.domain.create_object(&class_name) else { return };
        self.domain.bind_entity(handle, mirror);
        slot.handle = handle;
        slot.name_hash = name_hash;
        if self.domain.has_method(handle, UPDATE_HOOK, 1) {
            self.updates.push(handle);
        }
    }

    /// Scene removal: drops every component and releases everything it held.
    pub fn clear(&mut self) {
        let entities: Vec<Entity> = self.components.keys().copied().collect();
        for entity in entities {
            let count = self.components[&entity].scripts.len();
            for index in 0..count {
                self.set_slot_class(entity, index, 0);
            }
            let component =
                self.components.remove(&entity).expect("component vanished during scene clear");
            if component.entity_handle.is_valid() {
                self.domain.release_object(component.entity_handle);
            }
        }
    }

    // ---------- read accessors ----------

    pub fn script_count(&self, cmp: ComponentHandle) -> usize {
        self.components.get(&cmp.entity()).map_or(0, |component| component.scripts.len())
    }

    pub fn script_name_hash(&self, cmp: ComponentHandle, index: usize) -> u32 {
        self.components
            .get(&cmp.entity())
            .and_then(|component| component.scripts.get(index))
            .map_or(0, |slot| slot.name_hash)
    }

    pub fn script_name(&self, cmp: ComponentHandle, index: usize) -> &str {
        self.resolve_class(self.script_name_hash(cmp, index)).unwrap_or("")
    }

    pub fn resolve_class(&self, name_hash: u32) -> Option<&str> {
        self.registry.resolve(name_hash)
    }

    /// Discovered class listing, for host pickers.
    pub fn class_count(&self) -> usize {
        self.registry.len()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.registry.names()
    }

    pub fn update_hook_count(&self) -> usize {
        self.updates.len()
    }

    pub fn live_object_count(&self) -> usize {
        self.domain.live_objects()
    }

    // ---------- game lifecycle and dispatch ----------

    /// Invokes the `start_game` hook on every bound slot, then marks the
    /// session running.
    pub fn start_game(&mut self, world: &mut World) {
        let bound: Vec<ObjectHandle> = self
            .components
            .values()
            .flat_map(|component| component.scripts.iter())
            .filter(|slot| slot.handle.is_valid())
            .map(|slot| slot.handle)
            .collect();
        for handle in bound {
            self.domain.try_call(handle, START_GAME_HOOK, ());
        }
        self.apply_commands(world);
        self.game_running = true;
    }

    /// No script-side teardown hook is invoked; the session flag just flips.
    pub fn stop_game(&mut self) {
        self.game_running = false;
    }

    pub fn update(&mut self, world: &mut World, dt: f32, paused: bool) {
        if paused || !self.game_running {
            return;
        }
        let scheduled = self.updates.clone();
        for handle in scheduled {
            self.domain.try_call(handle, UPDATE_HOOK, (f64::from(dt),));
        }
        self.apply_commands(world);
    }

    pub fn late_update(&mut self, _world: &mut World, _dt: f32, _paused: bool) {}

    fn apply_commands(&mut self, world: &mut World) {
        for command in self.domain.drain_commands() {
            match command {
                WorldCommand::SetPosition { entity, position } => world.set_position(entity, position),
            }
        }
    }

    // ---------- persistence ----------

    /// Writes the minimal reconstruction state: component count, then per
    /// component entity index, slot count and each slot's class-name hash,
    /// all little-endian.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        bincode_options().serialize_into(&mut *out, &(self.components.len() as i32))?;
        for (entity, component) in &self.components {
            bincode_options().serialize_into(&mut *out, &entity.0)?;
            bincode_options().serialize_into(&mut *out, &(component.scripts.len() as i32))?;
            for slot in &component.scripts {
                bincode_options().serialize_into(&mut *out, &slot.name_hash)?;
            }
        }
        Ok(())
    }

    /// Rebuilds components from a saved snapshot, reinstantiating script
    /// objects through the registry. Zero hashes round-trip as unassigned
    /// slots.
    pub fn deserialize(&mut self, world: &mut World, bytes: &[u8]) -> Result<()> {
        let ty = self.component_type;
        let mut reader = bytes;
        let count: i32 = bincode_options()
            .deserialize_from(&mut reader)
            .context("reading script component count")?;
        for _ in 0..count {
            let index: i32 =
                bincode_options().deserialize_from(&mut reader).context("reading entity index")?;
            let cmp = self.create_component(world, ty, Entity(index));
            let slot_count: i32 =
                bincode_options().deserialize_from(&mut reader).context("reading slot count")?;
            for slot_index in 0..slot_count as usize {
                let hash: u32 = bincode_options()
                    .deserialize_from(&mut reader)
                    .context("reading class name hash")?;
                self.add_script(cmp);
                self.set_script_class(cmp, slot_index, hash);
            }
        }
        Ok(())
    }

    /// Single-slot snapshot, for host-side slot copy/paste.
    pub fn serialize_script(&self, cmp: ComponentHandle, index: usize, out: &mut Vec<u8>) -> Result<()> {
        bincode_options().serialize_into(&mut *out, &self.script_name_hash(cmp, index))?;
        Ok(())
    }

    pub fn deserialize_script(&mut self, cmp: ComponentHandle, index: usize, bytes: &[u8]) -> Result<()> {
        let mut reader = bytes;
        let hash: u32 =
            bincode_options().deserialize_from(&mut reader).context("reading class name hash")?;
        self.set_script_class(cmp, index, hash);
        Ok(())
    }

    pub fn export_component(&self, cmp: ComponentHandle) -> Option<ScriptComponentData> {
        let component = self.components.get(&cmp.entity())?;
        Some(ScriptComponentData {
            entity: component.entity.0,
            scripts: component.scripts.iter().map(|slot| slot.name_hash).collect(),
        })
    }

    pub fn import_component(&mut self, world: &mut World, data: &ScriptComponentData) -> ComponentHandle {
        let ty = self.component_type;
        let cmp = self.create_component(world, ty, Entity(data.entity));
        for (index, hash) in data.scripts.iter().enumerate() {
            self.add_script(cmp);
            self.set_script_class(cmp, index, *hash);
        }
        cmp
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}
