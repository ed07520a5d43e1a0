//! Backend provisioning and health probing.
//!
//! Bootstrap creates the table and the blob containers, then writes a
//! sentinel row and a sentinel blob per container. The health check reads
//! the sentinels back.

use serde::{Deserialize, Serialize};

use crate::entity::{unwrap, wrap};
use crate::error::{ErrorKind, StorageError, StoreResult};
use crate::keys::Address;
use crate::traits::{BlobStore, ContainerAccess, TableStore};

pub const HEALTH_SENTINEL: &str = "health";

#[derive(Debug, Serialize, Deserialize)]
struct HealthRow {
    health: String,
}

fn sentinel_address() -> Address {
    Address::new(HEALTH_SENTINEL, HEALTH_SENTINEL)
}

/// Treat "already exists" as success; everything else propagates.
fn tolerate_existing(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(err) if err.is(ErrorKind::AlreadyExists) => Ok(()),
        other => other,
    }
}

/// Provision the table and the given containers and write the sentinels.
///
/// Safe to run repeatedly.
pub async fn bootstrap<T, B>(
    table: &T,
    blobs: &B,
    containers: &[(&str, ContainerAccess)],
) -> StoreResult<()>
where
    T: TableStore + ?Sized,
    B: BlobStore + ?Sized,
{
    tolerate_existing(table.create_table().await.map_err(StorageError::from))?;
    for (container, access) in containers {
        tolerate_existing(
            blobs
                .create_container(container, *access)
                .await
                .map_err(StorageError::from),
        )?;
    }

    let row = wrap(
        &HealthRow {
            health: HEALTH_SENTINEL.into(),
        },
        sentinel_address(),
    )?;
    tolerate_existing(table.create(row).await.map_err(StorageError::from))?;

    for (container, _) in containers {
        blobs
            .put(container, HEALTH_SENTINEL, HEALTH_SENTINEL.as_bytes().to_vec())
            .await?;
    }
    tracing::info!(containers = containers.len(), "storage provisioned");
    Ok(())
}

/// Read back every sentinel; any absence or mismatch is `ConnectionFailed`.
pub async fn check_health<T, B>(table: &T, blobs: &B, containers: &[&str]) -> StoreResult<()>
where
    T: TableStore + ?Sized,
    B: BlobStore + ?Sized,
{
    let row = table
        .get(&sentinel_address())
        .await
        .map_err(|e| unhealthy("table", StorageError::from(e)))?;
    let row: HealthRow = unwrap(row).map_err(|e| unhealthy("table", e))?;
    if row.health != HEALTH_SENTINEL {
        return Err(StorageError::connection_failed(
            "The table service failed the health check",
        ));
    }

    for container in containers {
        let content = blobs
            .get(container, HEALTH_SENTINEL)
            .await
            .map_err(|e| unhealthy("blob", StorageError::from(e)))?;
        if content != HEALTH_SENTINEL.as_bytes() {
            return Err(StorageError::connection_failed(format!(
                "The blob service failed the health check for container '{container}'"
            )));
        }
    }
    Ok(())
}

fn unhealthy(service: &str, cause: StorageError) -> StorageError {
    StorageError::connection_failed(format!(
        "The {service} service failed the health check: {cause}"
    ))
}
