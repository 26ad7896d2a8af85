//! The entity store engine.
//!
//! The engine owns the authoritative `(type, id) -> entity` mapping, the
//! per-field index structures, the per-type auto-increment counters, and
//! the WAL hook. All mutations take the engine's write lock; queries take
//! the read lock for their whole execution and therefore see a consistent
//! snapshot. WAL appends happen while the write lock is held so log order
//! equals apply order.

use crate::config::EngineConfig;
use crate::entity::{is_internal_field, Entity, UPDATED_AT};
use crate::error::{EngineError, EngineResult};
use crate::id::IdStrategy;
use crate::schema::{EntityDefinition, SchemaRegistry, SchemaUpdate};
use crate::value::FieldValue;
use crate::wal::{CompressionCodec, WalManager, WalRecord, WalStats};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use syncopate_storage::{FileLog, LogStore, MemoryLog};
use tracing::{debug, info};

/// Index slot: (entity type, field name).
pub(crate) type Slot = (String, String);

pub(crate) fn slot(entity_type: &str, field: &str) -> Slot {
    (entity_type.to_string(), field.to_string())
}

/// All mutable store state, guarded by one lock (no finer striping).
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    /// type -> id -> entity.
    pub(crate) entities: HashMap<String, HashMap<String, Entity>>,
    /// (type, field) -> value key -> ids holding that value.
    pub(crate) indexes: HashMap<Slot, HashMap<String, HashSet<String>>>,
    /// (type, field) -> value key -> the single id holding that value.
    pub(crate) uniques: HashMap<Slot, HashMap<String, String>>,
    /// Last allocated auto-increment id per type. Never rewound.
    counters: HashMap<String, u64>,
}

impl StoreState {
    pub(crate) fn members(&self, entity_type: &str) -> Option<&HashMap<String, Entity>> {
        self.entities.get(entity_type)
    }
}

/// The storage engine.
pub struct Engine {
    registry: Arc<SchemaRegistry>,
    pub(crate) state: RwLock<StoreState>,
    wal: Option<WalManager>,
    config: EngineConfig,
}

impl Engine {
    /// Opens an engine with the given configuration, replaying the WAL
    /// when one is configured and present.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let wal = if config.enable_wal {
            let store: Box<dyn LogStore> = match &config.wal_path {
                Some(path) => Box::new(FileLog::open(path)?),
                None => Box::new(MemoryLog::new()),
            };
            let codec = config
                .enable_compression
                .then(|| CompressionCodec::new(config.compression_level));
            Some(WalManager::new(store, codec, config.sync_on_write))
        } else {
            None
        };

        let engine = Self {
            registry: Arc::new(SchemaRegistry::new()),
            state: RwLock::new(StoreState::default()),
            wal,
            config,
        };
        engine.recover()?;
        Ok(engine)
    }

    /// Opens an engine over an explicit WAL store.
    ///
    /// Used by tests and embedders that manage their own storage.
    pub fn with_wal_store(config: EngineConfig, store: Box<dyn LogStore>) -> EngineResult<Self> {
        let codec = config
            .enable_compression
            .then(|| CompressionCodec::new(config.compression_level));
        let engine = Self {
            wal: Some(WalManager::new(store, codec, config.sync_on_write)),
            registry: Arc::new(SchemaRegistry::new()),
            state: RwLock::new(StoreState::default()),
            config,
        };
        engine.recover()?;
        Ok(engine)
    }

    /// An ephemeral engine without a WAL.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            registry: Arc::new(SchemaRegistry::new()),
            state: RwLock::new(StoreState::default()),
            wal: None,
            config: EngineConfig::default(),
        }
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// WAL totals, when a WAL is configured.
    #[must_use]
    pub fn wal_stats(&self) -> Option<WalStats> {
        self.wal.as_ref().map(WalManager::stats)
    }

    // ---- schema operations -------------------------------------------------

    /// Registers an entity type and builds its indexes over any entities
    /// recovered from the WAL.
    ///
    /// Validate first, commit second: if recovered data violates a unique
    /// constraint in the definition, nothing is registered.
    pub fn register_entity_type(&self, def: EntityDefinition) -> EngineResult<EntityDefinition> {
        let mut state = self.state.write();

        let mut candidate = def;
        if candidate.id_generator.is_none() {
            candidate.id_generator = Some(IdStrategy::default());
        }
        let (indexes, uniques) = Self::build_type_indexes(&state, &candidate)?;

        let stored = self.registry.register(candidate)?;
        Self::install_type_indexes(&mut state, &stored.name, indexes, uniques);
        Ok(stored)
    }

    /// Updates an entity type definition.
    ///
    /// The id generator is immutable; newly added unique constraints are
    /// verified against live data before the schema is committed. On any
    /// failure the schema (and all indexes) are left unchanged.
    pub fn update_entity_type(&self, def: EntityDefinition) -> EngineResult<SchemaUpdate> {
        let mut state = self.state.write();

        let update = self.registry.prepare_update(def)?;
        let (indexes, uniques) = Self::build_type_indexes(&state, &update.definition)?;

        self.registry.commit(update.definition.clone());
        Self::install_type_indexes(&mut state, &update.definition.name, indexes, uniques);

        if !update.unique_added.is_empty() {
            debug!(
                entity_type = %update.definition.name,
                added = ?update.unique_added,
                "unique constraints added"
            );
        }
        Ok(update)
    }

    /// Sorted list of registered type names.
    #[must_use]
    pub fn list_entity_types(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Fetches a type definition.
    pub fn get_entity_definition(&self, name: &str) -> EngineResult<EntityDefinition> {
        self.registry.get(name)
    }

    /// Number of live entities of a type.
    pub fn entity_count(&self, entity_type: &str) -> EngineResult<usize> {
        self.registry.get(entity_type)?;
        Ok(self
            .state
            .read()
            .members(entity_type)
            .map_or(0, HashMap::len))
    }

    // ---- entity operations -------------------------------------------------

    /// Inserts an entity, returning its canonical id.
    ///
    /// An empty or absent `supplied_id` asks the type's generator for one;
    /// explicit ids are validated against the generator's canonical form
    /// (and rejected outright under `auto_increment`).
    pub fn insert(
        &self,
        entity_type: &str,
        supplied_id: Option<&str>,
        raw_fields: &serde_json::Map<String, serde_json::Value>,
    ) -> EngineResult<String> {
        let def = self.registry.get(entity_type)?;
        let typed = Self::validate_fields(&def, raw_fields, false)?;
        let generator = def.generator();

        let mut state = self.state.write();

        let id = match supplied_id {
            Some(raw) if !raw.is_empty() => generator.canonicalize_supplied(raw)?,
            _ => match generator {
                IdStrategy::AutoIncrement => {
                    let next = state.counters.get(entity_type).copied().unwrap_or(0) + 1;
                    IdStrategy::format_auto(next)
                }
                IdStrategy::Custom => {
                    return Err(EngineError::RequiredFieldMissing(
                        "entity ID is required for custom ID generation".into(),
                    ))
                }
                other => other
                    .generate()
                    .ok_or_else(|| EngineError::internal("id generator produced nothing"))?,
            },
        };

        if state
            .members(entity_type)
            .is_some_and(|m| m.contains_key(&id))
        {
            return Err(EngineError::unique_constraint(entity_type, "id"));
        }

        Self::check_uniques(&state, &def, &typed, None)?;

        let now = Utc::now();
        let entity = Entity::new(id.clone(), entity_type.to_string(), typed, now);

        self.wal_append(&WalRecord::Insert {
            entity_type: entity_type.to_string(),
            id: id.clone(),
            fields: entity.fields.clone(),
        })?;

        if generator == IdStrategy::AutoIncrement {
            if let Ok(n) = id.parse::<u64>() {
                let counter = state.counters.entry(entity_type.to_string()).or_insert(0);
                *counter = (*counter).max(n);
            }
        }
        Self::index_entity(&mut state, &def, &entity);
        state
            .entities
            .entry(entity_type.to_string())
            .or_default()
            .insert(id.clone(), entity);

        Ok(id)
    }

    /// Patches an entity: only keys present in `raw_fields` change.
    ///
    /// Returns the canonical id. `_created_at` is preserved and
    /// `_updated_at` refreshed.
    pub fn update(
        &self,
        entity_type: &str,
        raw_id: &str,
        raw_fields: &serde_json::Map<String, serde_json::Value>,
    ) -> EngineResult<String> {
        let def = self.registry.get(entity_type)?;
        let id = def.generator().normalize(raw_id)?;
        let mut patch = Self::validate_fields(&def, raw_fields, true)?;

        let mut state = self.state.write();

        let current = state
            .members(entity_type)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or_else(|| EngineError::entity_not_found(entity_type, &id))?;

        Self::check_uniques(&state, &def, &patch, Some(&id))?;

        patch.insert(
            UPDATED_AT.to_string(),
            FieldValue::DateTime(Utc::now()),
        );

        self.wal_append(&WalRecord::Update {
            entity_type: entity_type.to_string(),
            id: id.clone(),
            fields: patch.clone(),
        })?;

        let mut updated = current.clone();
        for (name, value) in patch {
            updated.fields.insert(name, value);
        }

        Self::unindex_entity(&mut state, &def, &current);
        Self::index_entity(&mut state, &def, &updated);
        if let Some(members) = state.entities.get_mut(entity_type) {
            members.insert(id.clone(), updated);
        }

        Ok(id)
    }

    /// Deletes an entity and every index entry referencing it.
    ///
    /// The auto-increment counter is not rewound: ids are never reused.
    pub fn delete(&self, entity_type: &str, raw_id: &str) -> EngineResult<String> {
        let def = self.registry.get(entity_type)?;
        let id = def.generator().normalize(raw_id)?;

        let mut state = self.state.write();

        let entity = state
            .members(entity_type)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or_else(|| EngineError::entity_not_found(entity_type, &id))?;

        self.wal_append(&WalRecord::Delete {
            entity_type: entity_type.to_string(),
            id: id.clone(),
        })?;

        Self::unindex_entity(&mut state, &def, &entity);
        if let Some(members) = state.entities.get_mut(entity_type) {
            members.remove(&id);
        }

        Ok(id)
    }

    /// Fetches an entity by bare id, scanning types in name order.
    ///
    /// Prefer [`Engine::get_by_type`]: a bare id is ambiguous across
    /// types whose generators can collide (auto-increment in particular).
    pub fn get(&self, id: &str) -> EngineResult<Entity> {
        let state = self.state.read();
        let mut names: Vec<&String> = state.entities.keys().collect();
        names.sort();
        for name in names {
            if let Some(entity) = state.entities[name].get(id) {
                return Ok(entity.clone());
            }
        }
        Err(EngineError::entity_not_found("", id))
    }

    /// Fetches an entity by normalized id and type.
    pub fn get_by_type(&self, raw_id: &str, entity_type: &str) -> EngineResult<Entity> {
        let def = self.registry.get(entity_type)?;
        let id = def.generator().normalize(raw_id)?;

        self.state
            .read()
            .members(entity_type)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or_else(|| EngineError::entity_not_found(entity_type, &id))
    }

    /// All live entities of a type, in canonical id order.
    pub fn list_by_type(&self, entity_type: &str) -> EngineResult<Vec<Entity>> {
        self.registry.get(entity_type)?;
        let state = self.state.read();
        let mut entities: Vec<Entity> = state
            .members(entity_type)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        entities.sort_by(|a, b| crate::entity::id_cmp(&a.id, &b.id));
        Ok(entities)
    }

    /// Visits every live entity under the read lock.
    pub fn inspect_all<F>(&self, mut visitor: F)
    where
        F: FnMut(&Entity),
    {
        let state = self.state.read();
        for members in state.entities.values() {
            for entity in members.values() {
                visitor(entity);
            }
        }
    }

    // ---- internals ---------------------------------------------------------

    fn wal_append(&self, record: &WalRecord) -> EngineResult<()> {
        if let Some(wal) = &self.wal {
            wal.append(record)?;
        }
        Ok(())
    }

    fn recover(&self) -> EngineResult<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };

        let mut state = self.state.write();
        let count = wal.replay(|record| {
            Self::apply_replayed(&mut state, record);
            Ok(())
        })?;

        if count > 0 {
            info!(records = count, "recovered state from WAL");
        }
        Ok(())
    }

    /// Applies a replayed record to raw state. Indexes are rebuilt later,
    /// when the type's schema is registered.
    fn apply_replayed(state: &mut StoreState, record: WalRecord) {
        match record {
            WalRecord::Insert {
                entity_type,
                id,
                fields,
            } => {
                if let Ok(n) = id.parse::<u64>() {
                    let counter = state.counters.entry(entity_type.clone()).or_insert(0);
                    *counter = (*counter).max(n);
                }
                let entity = Entity {
                    id: id.clone(),
                    entity_type: entity_type.clone(),
                    fields,
                };
                state.entities.entry(entity_type).or_default().insert(id, entity);
            }
            WalRecord::Update {
                entity_type,
                id,
                fields,
            } => {
                if let Some(entity) = state
                    .entities
                    .get_mut(&entity_type)
                    .and_then(|m| m.get_mut(&id))
                {
                    for (name, value) in fields {
                        entity.fields.insert(name, value);
                    }
                }
            }
            WalRecord::Delete { entity_type, id } => {
                if let Some(members) = state.entities.get_mut(&entity_type) {
                    members.remove(&id);
                }
            }
        }
    }

    /// Coerces and validates raw JSON fields against a schema.
    ///
    /// With `patch` set, only the supplied keys are checked (update
    /// semantics); otherwise missing non-nullable fields fail and missing
    /// required nullable fields default to null.
    fn validate_fields(
        def: &EntityDefinition,
        raw: &serde_json::Map<String, serde_json::Value>,
        patch: bool,
    ) -> EngineResult<BTreeMap<String, FieldValue>> {
        let mut typed = BTreeMap::new();

        for (name, value) in raw {
            if name == "id" {
                return Err(EngineError::malformed(
                    "field 'id' is not allowed inside fields; the ID lives at the top level",
                ));
            }
            if is_internal_field(name) {
                return Err(EngineError::malformed(format!(
                    "field '{name}' is store-managed and cannot be set"
                )));
            }
            let field = def.field(name).ok_or_else(|| {
                EngineError::malformed(format!(
                    "unknown field '{name}' for entity type '{}'",
                    def.name
                ))
            })?;

            let coerced = FieldValue::from_json(field.field_type, value)?;
            if coerced.is_null() && !field.nullable {
                return Err(EngineError::malformed(format!(
                    "field '{name}' is not nullable"
                )));
            }
            typed.insert(name.clone(), coerced);
        }

        if !patch {
            for field in &def.fields {
                if field.internal || typed.contains_key(&field.name) {
                    continue;
                }
                if !field.nullable {
                    return Err(EngineError::RequiredFieldMissing(field.name.clone()));
                }
                if field.required {
                    typed.insert(field.name.clone(), FieldValue::Null);
                }
            }
        }

        Ok(typed)
    }

    /// Rejects values that would collide in a unique index.
    ///
    /// `exclude` names the entity being updated, whose own current value
    /// is not a collision.
    fn check_uniques(
        state: &StoreState,
        def: &EntityDefinition,
        values: &BTreeMap<String, FieldValue>,
        exclude: Option<&str>,
    ) -> EngineResult<()> {
        for field in def.fields.iter().filter(|f| f.unique) {
            let Some(key) = values.get(&field.name).and_then(FieldValue::index_key) else {
                continue;
            };
            if let Some(owner) = state
                .uniques
                .get(&slot(&def.name, &field.name))
                .and_then(|m| m.get(&key))
            {
                if exclude != Some(owner.as_str()) {
                    return Err(EngineError::unique_constraint(&def.name, &field.name));
                }
            }
        }
        Ok(())
    }

    fn index_entity(state: &mut StoreState, def: &EntityDefinition, entity: &Entity) {
        for field in &def.fields {
            let Some(key) = entity.fields.get(&field.name).and_then(FieldValue::index_key)
            else {
                continue;
            };
            if field.indexed {
                state
                    .indexes
                    .entry(slot(&def.name, &field.name))
                    .or_default()
                    .entry(key.clone())
                    .or_default()
                    .insert(entity.id.clone());
            }
            if field.unique {
                state
                    .uniques
                    .entry(slot(&def.name, &field.name))
                    .or_default()
                    .insert(key, entity.id.clone());
            }
        }
    }

    fn unindex_entity(state: &mut StoreState, def: &EntityDefinition, entity: &Entity) {
        for field in &def.fields {
            let Some(key) = entity.fields.get(&field.name).and_then(FieldValue::index_key)
            else {
                continue;
            };
            if field.indexed {
                if let Some(by_value) = state.indexes.get_mut(&slot(&def.name, &field.name)) {
                    if let Some(ids) = by_value.get_mut(&key) {
                        ids.remove(&entity.id);
                        if ids.is_empty() {
                            by_value.remove(&key);
                        }
                    }
                }
            }
            if field.unique {
                if let Some(by_value) = state.uniques.get_mut(&slot(&def.name, &field.name)) {
                    if by_value.get(&key).map(String::as_str) == Some(entity.id.as_str()) {
                        by_value.remove(&key);
                    }
                }
            }
        }
    }

    /// Builds fresh index maps for one type from live data.
    ///
    /// Fails with `UniqueConstraint` when existing data collides under a
    /// unique field of `def` — nothing is installed in that case.
    #[allow(clippy::type_complexity)]
    fn build_type_indexes(
        state: &StoreState,
        def: &EntityDefinition,
    ) -> EngineResult<(
        HashMap<Slot, HashMap<String, HashSet<String>>>,
        HashMap<Slot, HashMap<String, String>>,
    )> {
        let mut indexes: HashMap<Slot, HashMap<String, HashSet<String>>> = HashMap::new();
        let mut uniques: HashMap<Slot, HashMap<String, String>> = HashMap::new();

        for field in &def.fields {
            if field.indexed {
                indexes.insert(slot(&def.name, &field.name), HashMap::new());
            }
            if field.unique {
                uniques.insert(slot(&def.name, &field.name), HashMap::new());
            }
        }

        if let Some(members) = state.members(&def.name) {
            for entity in members.values() {
                for field in &def.fields {
                    let Some(key) =
                        entity.fields.get(&field.name).and_then(FieldValue::index_key)
                    else {
                        continue;
                    };
                    if field.indexed {
                        if let Some(by_value) = indexes.get_mut(&slot(&def.name, &field.name)) {
                            by_value.entry(key.clone()).or_default().insert(entity.id.clone());
                        }
                    }
                    if field.unique {
                        if let Some(by_value) = uniques.get_mut(&slot(&def.name, &field.name)) {
                            if by_value
                                .insert(key, entity.id.clone())
                                .is_some_and(|prev| prev != entity.id)
                            {
                                return Err(EngineError::unique_constraint(
                                    &def.name,
                                    &field.name,
                                ));
                            }
                        }
                    }
                }
            }
        }

        Ok((indexes, uniques))
    }

    /// Replaces every index slot of `entity_type` with freshly built maps.
    fn install_type_indexes(
        state: &mut StoreState,
        entity_type: &str,
        indexes: HashMap<Slot, HashMap<String, HashSet<String>>>,
        uniques: HashMap<Slot, HashMap<String, String>>,
    ) {
        state.indexes.retain(|(t, _), _| t != entity_type);
        state.uniques.retain(|(t, _), _| t != entity_type);
        state.indexes.extend(indexes);
        state.uniques.extend(uniques);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("types", &self.registry.len())
            .field("wal", &self.wal.is_some())
            .finish_non_exhaustive()
    }
}
