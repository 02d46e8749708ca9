//! Shared, bounds-checked byte storage standing in for device memory.
//!
//! A [`DeviceBuffer`] is a cheap handle: clones share the same storage, so
//! the host and every execution group of a rank can hold one. Channels of the
//! same operation touch disjoint element ranges, so the lock is held only for
//! the duration of one chunk copy.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, RingError};
use crate::reduce::{self, Element};

#[derive(Clone)]
pub struct DeviceBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    len_bytes: usize,
}

impl DeviceBuffer {
    /// Allocate `len_bytes` zeroed bytes.
    pub fn zeroed(len_bytes: usize) -> Self {
        Self::from_bytes(vec![0; len_bytes])
    }

    /// Take ownership of raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len_bytes = bytes.len();
        Self {
            data: Arc::new(Mutex::new(bytes)),
            len_bytes,
        }
    }

    /// Copy typed values into a new buffer (little-endian).
    pub fn from_elements<T: Element>(values: &[T]) -> Self {
        Self::from_bytes(reduce::to_bytes(values))
    }

    /// Size of the buffer in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Returns true if the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.len_bytes == 0
    }

    /// True when both handles refer to the same storage (in-place operation).
    pub fn ptr_eq(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy `len` bytes starting at `offset` out of the buffer.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_range(offset, len)?;
        let data = self.lock()?;
        Ok(data[offset..offset + len].to_vec())
    }

    /// Overwrite `data.len()` bytes starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len())?;
        let mut buf = self.lock()?;
        buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Snapshot of the whole buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.lock()?.clone())
    }

    /// Snapshot of the whole buffer decoded as `T` elements.
    pub fn to_elements<T: Element>(&self) -> Result<Vec<T>> {
        Ok(reduce::from_bytes(&self.lock()?))
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len_bytes => Ok(()),
            _ => Err(RingError::OutOfBounds {
                offset,
                len,
                capacity: self.len_bytes,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| RingError::LockPoisoned("device buffer"))
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeviceBuffer({:p}, {}B)",
            Arc::as_ptr(&self.data),
            self.len_bytes
        )
    }
}
