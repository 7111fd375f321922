//! A cloneable, lock-guarded handle for stores with several callers.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use vendor_storage_block::BlockTransport;

use crate::{Error, StoreConfig, StoreStatus, VendorStore};

/// Shares one [`VendorStore`] between callers.
///
/// Every operation takes the same lock, so reads never observe a write in
/// progress and at most one write is in flight.
pub struct SharedVendorStore<T> {
    inner: Arc<Mutex<VendorStore<T>>>,
}

impl<T> Clone for SharedVendorStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BlockTransport> SharedVendorStore<T> {
    pub fn new(store: VendorStore<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn initialize(transport: T, config: StoreConfig) -> Result<Self, Error> {
        Ok(Self::new(VendorStore::initialize(transport, config)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, VendorStore<T>>, Error> {
        self.inner.lock().map_err(|_| Error::LockPoisoned)
    }

    pub fn read(&self, id: u16, buf: &mut [u8]) -> Result<usize, Error> {
        self.lock()?.read(id, buf)
    }

    pub fn get(&self, id: u16) -> Result<Bytes, Error> {
        self.lock()?.get(id)
    }

    pub fn write(&self, id: u16, data: &[u8]) -> Result<(), Error> {
        self.lock()?.write(id, data)
    }

    pub fn reload(&self) -> Result<(), Error> {
        self.lock()?.reload()
    }

    pub fn status(&self) -> Result<StoreStatus, Error> {
        Ok(self.lock()?.status())
    }

    /// Runs `f` with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut VendorStore<T>) -> R) -> Result<R, Error> {
        let mut store = self.lock()?;
        Ok(f(&mut store))
    }
}
