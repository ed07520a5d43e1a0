use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::fault::BackendResult;
use crate::keys::{self, Address};

/// Row-key range inside one partition. The upper bound is always exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub lower: Bound<String>,
    pub upper: String,
}

impl RowRange {
    /// Rows strictly after a children search key (see [`keys`]).
    pub fn children_of(search_key: &str) -> Self {
        Self {
            lower: Bound::Excluded(search_key.to_string()),
            upper: keys::range_end(search_key),
        }
    }

    /// Rows at or after an unmarked hierarchical key.
    pub fn descendants_of(key: &str) -> Self {
        Self {
            lower: Bound::Included(key.to_string()),
            upper: keys::range_end(key),
        }
    }

    pub fn contains(&self, row_key: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(lo) => row_key >= lo.as_str(),
            Bound::Excluded(lo) => row_key > lo.as_str(),
            Bound::Unbounded => true,
        };
        above && row_key < self.upper.as_str()
    }
}

/// Query over one partition: `row = R or row in range`.
///
/// With neither a row nor a range, every row of the partition matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyFilter {
    pub partition_key: String,
    pub row_key: Option<String>,
    pub range: Option<RowRange>,
}

impl KeyFilter {
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: None,
            range: None,
        }
    }

    pub fn with_row(mut self, row_key: impl Into<String>) -> Self {
        self.row_key = Some(row_key.into());
        self
    }

    pub fn with_range(mut self, range: RowRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn matches(&self, partition_key: &str, row_key: &str) -> bool {
        if partition_key != self.partition_key {
            return false;
        }
        if self.row_key.is_none() && self.range.is_none() {
            return true;
        }
        self.row_key.as_deref() == Some(row_key)
            || self.range.as_ref().is_some_and(|r| r.contains(row_key))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Overwrite every property.
    Replace,
    /// Overwrite supplied properties, keep the rest.
    Merge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BatchOp {
    Delete(Address),
    Upsert(Entity),
}

impl BatchOp {
    pub fn partition_key(&self) -> &str {
        match self {
            Self::Delete(address) => &address.partition_key,
            Self::Upsert(entity) => &entity.partition_key,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerAccess {
    Private,
    /// Blobs are readable anonymously through their URL.
    PublicRead,
}

/// A partitioned key-value table.
///
/// Implementations must satisfy:
/// - `create` is the only compare-and-set: it fails with an
///   already-exists fault when the exact address is occupied.
/// - `update` fails with a not-found fault when the row is absent.
/// - `list` returns rows in row-key order.
/// - `submit_batch` is atomic and only accepts operations on a single
///   partition.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create the table; fails with an already-exists fault if present.
    async fn create_table(&self) -> BackendResult<()>;

    async fn get(&self, address: &Address) -> BackendResult<Entity>;

    async fn create(&self, entity: Entity) -> BackendResult<()>;

    async fn update(&self, entity: Entity, mode: UpdateMode) -> BackendResult<()>;

    async fn delete(&self, address: &Address) -> BackendResult<()>;

    async fn list(&self, filter: &KeyFilter) -> BackendResult<Vec<Entity>>;

    async fn submit_batch(&self, ops: Vec<BatchOp>) -> BackendResult<()>;
}

/// A container-organized blob service.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create a container; fails with an already-exists fault if present.
    async fn create_container(&self, container: &str, access: ContainerAccess)
        -> BackendResult<()>;

    /// Write a blob, replacing any previous content.
    async fn put(&self, container: &str, blob_id: &str, content: Vec<u8>) -> BackendResult<()>;

    async fn get(&self, container: &str, blob_id: &str) -> BackendResult<Vec<u8>>;

    async fn delete(&self, container: &str, blob_id: &str) -> BackendResult<()>;

    /// Public URL of a blob. Does not check that the blob exists.
    fn url(&self, container: &str, blob_id: &str) -> String;
}

#[async_trait]
impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    async fn create_table(&self) -> BackendResult<()> {
        (**self).create_table().await
    }

    async fn get(&self, address: &Address) -> BackendResult<Entity> {
        (**self).get(address).await
    }

    async fn create(&self, entity: Entity) -> BackendResult<()> {
        (**self).create(entity).await
    }

    async fn update(&self, entity: Entity, mode: UpdateMode) -> BackendResult<()> {
        (**self).update(entity, mode).await
    }

    async fn delete(&self, address: &Address) -> BackendResult<()> {
        (**self).delete(address).await
    }

    async fn list(&self, filter: &KeyFilter) -> BackendResult<Vec<Entity>> {
        (**self).list(filter).await
    }

    async fn submit_batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        (**self).submit_batch(ops).await
    }
}

#[async_trait]
impl<B: BlobStore + ?Sized> BlobStore for Arc<B> {
    async fn create_container(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> BackendResult<()> {
        (**self).create_container(container, access).await
    }

    async fn put(&self, container: &str, blob_id: &str, content: Vec<u8>) -> BackendResult<()> {
        (**self).put(container, blob_id, content).await
    }

    async fn get(&self, container: &str, blob_id: &str) -> BackendResult<Vec<u8>> {
        (**self).get(container, blob_id).await
    }

    async fn delete(&self, container: &str, blob_id: &str) -> BackendResult<()> {
        (**self).delete(container, blob_id).await
    }

    fn url(&self, container: &str, blob_id: &str) -> String {
        (**self).url(container, blob_id)
    }
}
