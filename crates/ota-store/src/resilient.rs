//! Timeout and retry decorator for table and blob backends.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};

use crate::entity::Entity;
use crate::error::StorageError;
use crate::fault::{BackendFault, BackendResult};
use crate::keys::Address;
use crate::traits::{BatchOp, BlobStore, ContainerAccess, KeyFilter, TableStore, UpdateMode};

/// Capped exponential backoff for transient backend faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        // backon counts retries, not attempts.
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Wraps a backend so every call is bounded by a timeout and retried on
/// `ConnectionFailed`.
///
/// Faults leave the decorator already translated, so callers see the same
/// taxonomy whether or not a retry happened.
#[derive(Clone, Debug)]
pub struct ResilientStore<S> {
    inner: S,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<S> ResilientStore<S> {
    pub fn new(inner: S, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut f: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let timeout = self.timeout;
        let attempt = move || {
            let fut = f();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result.map_err(StorageError::from),
                    Err(_) => Err(StorageError::connection_failed(format!(
                        "{operation} timed out after {}ms",
                        timeout.as_millis()
                    ))),
                }
            }
        };

        let mut retries = 0u32;
        attempt
            .retry(self.policy.backoff())
            .sleep(tokio::time::sleep)
            .when(StorageError::is_retryable)
            .notify(|err: &StorageError, delay: Duration| {
                retries += 1;
                tracing::warn!(
                    operation,
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying backend call"
                );
            })
            .await
            .map_err(BackendFault::Translated)
    }
}

#[async_trait]
impl<S: TableStore> TableStore for ResilientStore<S> {
    async fn create_table(&self) -> BackendResult<()> {
        self.call("create_table", || self.inner.create_table()).await
    }

    async fn get(&self, address: &Address) -> BackendResult<Entity> {
        self.call("get", || self.inner.get(address)).await
    }

    async fn create(&self, entity: Entity) -> BackendResult<()> {
        self.call("create", || self.inner.create(entity.clone()))
            .await
    }

    async fn update(&self, entity: Entity, mode: UpdateMode) -> BackendResult<()> {
        self.call("update", || self.inner.update(entity.clone(), mode))
            .await
    }

    async fn delete(&self, address: &Address) -> BackendResult<()> {
        self.call("delete", || self.inner.delete(address)).await
    }

    async fn list(&self, filter: &KeyFilter) -> BackendResult<Vec<Entity>> {
        self.call("list", || self.inner.list(filter)).await
    }

    async fn submit_batch(&self, ops: Vec<BatchOp>) -> BackendResult<()> {
        self.call("submit_batch", || self.inner.submit_batch(ops.clone()))
            .await
    }
}

#[async_trait]
impl<S: BlobStore> BlobStore for ResilientStore<S> {
    async fn create_container(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> BackendResult<()> {
        self.call("create_container", || {
            self.inner.create_container(container, access)
        })
        .await
    }

    async fn put(&self, container: &str, blob_id: &str, content: Vec<u8>) -> BackendResult<()> {
        self.call("put_blob", || {
            self.inner.put(container, blob_id, content.clone())
        })
        .await
    }

    async fn get(&self, container: &str, blob_id: &str) -> BackendResult<Vec<u8>> {
        self.call("get_blob", || self.inner.get(container, blob_id))
            .await
    }

    async fn delete(&self, container: &str, blob_id: &str) -> BackendResult<()> {
        self.call("delete_blob", || self.inner.delete(container, blob_id))
            .await
    }

    fn url(&self, container: &str, blob_id: &str) -> String {
        self.inner.url(container, blob_id)
    }
}
