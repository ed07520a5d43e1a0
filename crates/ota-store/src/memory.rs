use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::entity::Entity;
use crate::fault::{BackendFault, BackendResult};
use crate::keys::Address;
use crate::traits::{BatchOp, BlobStore, ContainerAccess, KeyFilter, TableStore, UpdateMode};

/// Largest serialized entity accepted.
pub const MAX_ENTITY_BYTES: usize = 1024 * 1024;
/// Largest string property accepted.
pub const MAX_PROPERTY_BYTES: usize = 64 * 1024;

/// Queue of native fault codes returned by the next calls, for tests.
#[derive(Default)]
struct FaultQueue(Mutex<VecDeque<String>>);

impl FaultQueue {
    fn push(&self, count: usize, code: &str) {
        let mut queue = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        queue.extend(std::iter::repeat(code.to_string()).take(count));
    }

    fn check(&self) -> BackendResult<()> {
        let mut queue = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.pop_front() {
            Some(code) => Err(BackendFault::native(code, "injected fault")),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct TableState {
    created: bool,
    rows: BTreeMap<(String, String), Entity>,
    version: u64,
}

impl TableState {
    fn ensure_created(&self, table: &str) -> BackendResult<()> {
        if self.created {
            Ok(())
        } else {
            Err(BackendFault::native(
                "TableNotFound",
                format!("table '{table}' does not exist"),
            ))
        }
    }

    fn stamp(&mut self, entity: &mut Entity) {
        self.version += 1;
        entity.etag = Some(format!("W/\"{}\"", self.version));
        entity.timestamp = Some(ota_types::now_ms());
    }
}

/// In-memory partitioned table, ordered by partition key then row key.
///
/// Intended for tests and the CLI. Honours the full [`TableStore`] contract,
/// including entity size limits, and can be told to fail upcoming calls.
pub struct InMemoryTableStore {
    name: String,
    state: RwLock<TableState>,
    faults: FaultQueue,
}

impl InMemoryTableStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(TableState::default()),
            faults: FaultQueue::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make the next `count` calls fail with the native `code`.
    pub fn fail_next(&self, count: usize, code: &str) {
        self.faults.push(count, code);
    }

    /// Number of rows across all partitions.
    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.read()
            .rows
            .contains_key(&(address.partition_key.clone(), address.row_key.clone()))
    }

    /// Every stored address, in key order.
    pub fn addresses(&self) -> Vec<Address> {
        self.read()
            .rows
            .keys()
            .map(|(pk, rk)| Address::new(pk.clone(), rk.clone()))
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TableState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new("storagev2")
    }
}

impl std::fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTableStore")
            .field("name", &self.name)
            .field("row_count", &self.len())
            .finish()
    }
}

fn row_key_of(address: &Address) -> (String, String) {
    (address.partition_key.clone(), address.row_key.clone())
}

fn not_found(address: &Address) -> BackendFault {
    BackendFault::native("EntityNotFound", format!("no entity at {address}"))
}

fn check_size(entity: &Entity) -> BackendResult<()> {
    for (name, value) in &entity.properties {
        if let Value::String(text) = value {
            if text.len() > MAX_PROPERTY_BYTES {
                return Err(BackendFault::native(
                    "PropertyValueTooLarge",
                    format!("property '{name}' exceeds {MAX_PROPERTY_BYTES} bytes"),
                ));
            }
        }
    }
    let size = serde_json::to_vec(&entity.properties)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX);
    if size > MAX_ENTITY_BYTES {
        return Err(BackendFault::native(
            "EntityTooLarge",
            format!("entity at {} is {size} bytes", entity.address()),
        ));
    }
    Ok(())
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table(&self) -> BackendResult<()> {
        self.faults.check()?;
        let mut state = self.write();
        if state.created {
            return Err(BackendFault::native(
                "TableAlreadyExists",
                format!("table '{}' already exists", self.name),
            ));
        }
        state.created = true;
        Ok(())
    }

    async fn get(&self, address: &Address) -> BackendResult<Entity> {
        self.faults.check()?;
        let state = self.read();
        state.ensure_created(&self.name)?;
        state
            .rows
            .get(&row_key_of(address))
            .cloned()
            .ok_or_else(|| not_found(address))
    }

    async fn create(&self, mut entity: Entity) -> BackendResult<()> {
        self.faults.check()?;
        check_size(&entity)?;
        let mut state = self.write();
        state.ensure_created(&self.name)?;
        let key = row_key_of(&entity.address());
        if state.rows.contains_key(&key) {
            return Err(BackendFault::native(
                "EntityAlreadyExists",
                format!("entity at {} already exists", entity.address()),
            ));
        }
        state.stamp(&mut entity);
        state.rows.insert(key, entity);
        Ok(())
    }

    async fn update(&self, mut entity: Entity, mode: UpdateMode) -> BackendResult<()> {
        self.faults.check()?;
        let mut state = self.write();
        state.ensure_created(&self.name)?;
        let key = row_key_of(&entity.address());
        let existing = state
            .rows
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(&entity.address()))?;
        if mode == UpdateMode::Merge {
            let mut merged = existing.properties;
            merged.extend(entity.properties);
            entity.properties = merged;
        }
        check_size(&entity)?;
        state.stamp(&mut entity);
        state.rows.insert(key, entity);
        Ok(())
    }

    async fn delete(&self, address: &Address) -> BackendResult<()> {
        self.faults.check()?;
        let mut state = self.write();
        state.ensure_created(&self.name)?;
        state
            .rows
            .remove(&row_key_of(address))
            .map(|_| ())
            .ok_or_else(|| not_found(address))
    }

    async fn list(&self, filter: &KeyFilter) -> BackendResult<Vec<Entity>> {
        self.faults.check()?;
        let state = self.read();
        state.ensure_created(&self.name)?;
        let start = (filter.partition_key.clone(), String::new());
        Ok(state
            .rows
            .range(start..)
            .take_while(|((pk, _), _)| *pk == filter.partition_key)
            .filter(|((pk, rk), _)| filter.matches(pk, rk))
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    async fn submit_batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        self.faults.check()?;
        let Some(first) = ops.first() else {
            return Ok(());
        };
        let partition = first.partition_key().to_string();
        if ops.iter().any(|op| op.partition_key() != partition) {
            return Err(BackendFault::native(
                "InvalidInput",
                "batch operations must target a single partition",
            ));
        }
        for op in &ops {
            if let BatchOp::Upsert(entity) = op {
                check_size(entity)?;
            }
        }

        let mut state = self.write();
        state.ensure_created(&self.name)?;
        for op in &ops {
            if let BatchOp::Delete(address) = op {
                if !state.rows.contains_key(&row_key_of(address)) {
                    return Err(not_found(address));
                }
            }
        }
        for op in ops {
            match op {
                BatchOp::Delete(address) => {
                    state.rows.remove(&row_key_of(&address));
                }
                BatchOp::Upsert(mut entity) => {
                    state.stamp(&mut entity);
                    state.rows.insert(row_key_of(&entity.address()), entity);
                }
            }
        }
        Ok(())
    }
}

struct Container {
    access: ContainerAccess,
    blobs: HashMap<String, Vec<u8>>,
}

/// In-memory blob service.
pub struct InMemoryBlobStore {
    base_url: String,
    containers: RwLock<HashMap<String, Container>>,
    faults: FaultQueue,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            containers: RwLock::new(HashMap::new()),
            faults: FaultQueue::default(),
        }
    }

    /// Make the next `count` calls fail with the native `code`.
    pub fn fail_next(&self, count: usize, code: &str) {
        self.faults.push(count, code);
    }

    pub fn contains(&self, container: &str, blob_id: &str) -> bool {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(container)
            .is_some_and(|c| c.blobs.contains_key(blob_id))
    }

    /// Number of blobs in a container (0 if it does not exist).
    pub fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(container)
            .map_or(0, |c| c.blobs.len())
    }

    pub fn access(&self, container: &str) -> Option<ContainerAccess> {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(container)
            .map(|c| c.access)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn container_not_found(container: &str) -> BackendFault {
    BackendFault::native(
        "ContainerNotFound",
        format!("container '{container}' does not exist"),
    )
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn create_container(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> BackendResult<()> {
        self.faults.check()?;
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if containers.contains_key(container) {
            return Err(BackendFault::native(
                "ContainerAlreadyExists",
                format!("container '{container}' already exists"),
            ));
        }
        containers.insert(
            container.to_string(),
            Container {
                access,
                blobs: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn put(&self, container: &str, blob_id: &str, content: Vec<u8>) -> BackendResult<()> {
        self.faults.check()?;
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let target = containers
            .get_mut(container)
            .ok_or_else(|| container_not_found(container))?;
        target.blobs.insert(blob_id.to_string(), content);
        Ok(())
    }

    async fn get(&self, container: &str, blob_id: &str) -> BackendResult<Vec<u8>> {
        self.faults.check()?;
        let containers = self
            .containers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let target = containers
            .get(container)
            .ok_or_else(|| container_not_found(container))?;
        target.blobs.get(blob_id).cloned().ok_or_else(|| {
            BackendFault::native("BlobNotFound", format!("blob '{blob_id}' does not exist"))
        })
    }

    async fn delete(&self, container: &str, blob_id: &str) -> BackendResult<()> {
        self.faults.check()?;
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let target = containers
            .get_mut(container)
            .ok_or_else(|| container_not_found(container))?;
        target.blobs.remove(blob_id).map(|_| ()).ok_or_else(|| {
            BackendFault::native("BlobNotFound", format!("blob '{blob_id}' does not exist"))
        })
    }

    fn url(&self, container: &str, blob_id: &str) -> String {
        format!("{}/{container}/{blob_id}", self.base_url)
    }
}
