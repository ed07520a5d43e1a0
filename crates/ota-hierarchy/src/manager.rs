use futures::stream::{self, StreamExt};
use ota_store::{
    Address, BatchOp, Entity, ErrorKind, KeyFilter, RowRange, StorageError, StoreResult,
    TableStore,
};
use tokio_util::sync::CancellationToken;

/// Tuning for descendant fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Lookups in flight at once while resolving pointers.
    pub concurrency: usize,
    /// Longest pointer chain followed before giving up.
    pub max_pointer_hops: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 16,
            max_pointer_hops: 4,
        }
    }
}

/// A pending lookup: output slot, address to read, hops taken so far.
struct Pending {
    slot: usize,
    address: Address,
    hops: u32,
}

fn cancelled() -> StorageError {
    StorageError::other("operation cancelled")
}

/// Parent/child operations over a hierarchically keyed table.
///
/// A node is identified by its own row address plus the key that scopes its
/// children: a children search key for fetches, an unmarked hierarchical key
/// for subtree deletes (see `ota_store::keys`).
pub struct HierarchyManager<'a, T: ?Sized> {
    table: &'a T,
    options: FetchOptions,
}

impl<'a, T: TableStore + ?Sized> HierarchyManager<'a, T> {
    pub fn new(table: &'a T, options: FetchOptions) -> Self {
        Self { table, options }
    }

    /// Insert `entity` only if `parent` currently exists.
    ///
    /// The check is advisory: a concurrent delete of the parent can still
    /// leave an orphan behind.
    pub async fn insert_checked(&self, parent: &Address, entity: Entity) -> StoreResult<()> {
        self.table
            .get(parent)
            .await
            .map_err(|fault| {
                StorageError::from(fault)
                    .with_message_if(ErrorKind::NotFound, format!("parent {parent} does not exist"))
            })?;
        self.table.create(entity).await?;
        Ok(())
    }

    /// Direct children of `node`, with pointer rows replaced by their
    /// targets. Results keep the table's row-key order.
    ///
    /// Fails with `NotFound` when neither the node nor any child exists.
    /// Dangling pointers are skipped.
    pub async fn fetch_children(
        &self,
        node: &Address,
        children_search_key: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Entity>> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let filter = KeyFilter::partition(node.partition_key.clone())
            .with_row(node.row_key.clone())
            .with_range(RowRange::children_of(children_search_key));
        let rows = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            rows = self.table.list(&filter) => rows?,
        };
        if rows.is_empty() {
            return Err(StorageError::not_found(format!("{node} does not exist")));
        }

        let children: Vec<Entity> = rows
            .into_iter()
            .filter(|row| row.row_key != node.row_key)
            .collect();
        self.resolve_all(children, cancel).await
    }

    /// Replace pointer rows with the rows they reference, level by level.
    pub async fn resolve_all(
        &self,
        rows: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<Entity>> {
        let mut slots: Vec<Option<Entity>> = Vec::with_capacity(rows.len());
        let mut worklist = Vec::new();
        for (slot, row) in rows.into_iter().enumerate() {
            match row.pointer() {
                Some(address) => {
                    worklist.push(Pending {
                        slot,
                        address,
                        hops: 1,
                    });
                    slots.push(None);
                }
                None => slots.push(Some(row)),
            }
        }

        while !worklist.is_empty() {
            let lookups = stream::iter(std::mem::take(&mut worklist))
                .map(|pending| async move {
                    let result = self.table.get(&pending.address).await;
                    (pending, result)
                })
                .buffered(self.options.concurrency.max(1))
                .collect::<Vec<_>>();

            let results = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                results = lookups => results,
            };

            for (pending, result) in results {
                let entity = match result.map_err(StorageError::from) {
                    Ok(entity) => entity,
                    Err(err) if err.is(ErrorKind::NotFound) => {
                        tracing::warn!(target_address = %pending.address, "skipping dangling pointer");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                match entity.pointer() {
                    Some(next) if pending.hops < self.options.max_pointer_hops => {
                        worklist.push(Pending {
                            slot: pending.slot,
                            address: next,
                            hops: pending.hops + 1,
                        });
                    }
                    Some(_) => {
                        return Err(StorageError::other(format!(
                            "pointer chain through {} exceeds {} hops",
                            pending.address, self.options.max_pointer_hops
                        )));
                    }
                    None => slots[pending.slot] = Some(entity),
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Every row at or below `node`: its own row plus everything in
    /// `[descendants_key, descendants_key~)` in the same partition.
    pub async fn list_subtree(&self, node: &Address, descendants_key: &str) -> StoreResult<Vec<Entity>> {
        let filter = KeyFilter::partition(node.partition_key.clone())
            .with_row(node.row_key.clone())
            .with_range(RowRange::descendants_of(descendants_key));
        Ok(self.table.list(&filter).await?)
    }

    /// Delete `node` and everything below it in one batch.
    ///
    /// Atomic for the node's partition only; rows in other partitions that
    /// reference the subtree must be retracted first. Returns the number of
    /// rows removed.
    pub async fn delete_subtree(&self, node: &Address, descendants_key: &str) -> StoreResult<usize> {
        let rows = self.list_subtree(node, descendants_key).await?;
        let count = rows.len();
        if count == 0 {
            return Ok(0);
        }
        let ops = rows
            .into_iter()
            .map(|row| BatchOp::Delete(row.address()))
            .collect();
        self.table.submit_batch(ops).await?;
        tracing::debug!(node = %node, rows = count, "deleted subtree");
        Ok(count)
    }
}
