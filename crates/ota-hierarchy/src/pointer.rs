use ota_store::{
    unwrap, wrap, Address, Entity, ErrorKind, Pointer, StorageError, StoreResult, TableStore,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Pointer row with extra payload fields stored alongside it.
#[derive(Serialize)]
struct PointerWith<'p, P> {
    #[serde(flatten)]
    pointer: Pointer,
    #[serde(flatten)]
    payload: &'p P,
}

/// Secondary index of `Address → Address` redirects.
///
/// Pointers live in partitions other than the rows they reference, so they
/// cannot share a batch with them. Writers add pointers after the primary
/// row exists and retract them before the primary row is deleted. Readers
/// may therefore see a dangling pointer for a short window, but once a
/// write sequence completes every reachable entity has its pointers and no
/// pointer outlives its target.
pub struct PointerIndex<'a, T: ?Sized> {
    table: &'a T,
}

impl<'a, T: TableStore + ?Sized> PointerIndex<'a, T> {
    pub fn new(table: &'a T) -> Self {
        Self { table }
    }

    /// Store a pointer at `at`; fails with `AlreadyExists` when occupied.
    pub async fn add(&self, at: Address, target: &Address) -> StoreResult<()> {
        let entity = wrap(&Pointer::to(target), at)?;
        self.table.create(entity).await?;
        Ok(())
    }

    /// Store a pointer carrying additional fields.
    pub async fn add_with<P: Serialize + Sync>(
        &self,
        at: Address,
        target: &Address,
        payload: &P,
    ) -> StoreResult<()> {
        let entity = wrap(
            &PointerWith {
                pointer: Pointer::to(target),
                payload,
            },
            at,
        )?;
        self.table.create(entity).await?;
        Ok(())
    }

    pub async fn remove(&self, at: &Address) -> StoreResult<()> {
        self.table.delete(at).await?;
        Ok(())
    }

    /// Remove a pointer, treating an already missing one as removed.
    ///
    /// Any other failure propagates.
    pub async fn retract(&self, at: &Address) -> StoreResult<bool> {
        match self.remove(at).await {
            Ok(()) => Ok(true),
            Err(err) if err.is(ErrorKind::NotFound) => {
                tracing::debug!(address = %at, "pointer already absent");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// The address stored at `at`.
    pub async fn resolve(&self, at: &Address) -> StoreResult<Address> {
        let row = self.table.get(at).await?;
        row.pointer()
            .ok_or_else(|| StorageError::invalid(format!("row at {at} is not a pointer")))
    }

    /// The row a pointer references.
    pub async fn follow(&self, at: &Address) -> StoreResult<Entity> {
        let target = self.resolve(at).await?;
        Ok(self.table.get(&target).await?)
    }

    /// Decode the payload stored with a pointer.
    pub async fn payload<P: DeserializeOwned>(&self, at: &Address) -> StoreResult<P> {
        let row = self.table.get(at).await?;
        unwrap(row)
    }
}
