//! Backing store for decoder fragments
//!
//! The decoder never touches memory directly: every fragment it keeps goes
//! through a [`FragmentStore`], which may be RAM, flash or anything else
//! addressable as a flat byte space. Write constraints of the medium (erase
//! granularity and the like) belong to the implementation.

use crate::error::FragError;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

/// Flat byte space the decoder persists fragments into
pub trait FragmentStore {
    /// Write `bytes` starting at `offset`
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FragError>;

    /// Fill `buf` with bytes starting at `offset`
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FragError>;

    /// Addressable bytes
    fn capacity(&self) -> usize;
}

fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), FragError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(FragError::Storage(format!(
            "access of {} bytes at offset {} exceeds capacity {}",
            len, offset, capacity
        ))),
    }
}

/// RAM-backed store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    /// Create a zeroed store of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
        }
    }

    /// Raw contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the store and return its contents
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl FragmentStore for MemoryStore {
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FragError> {
        check_bounds(offset, bytes.len(), self.data.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FragError> {
        check_bounds(offset, buf.len(), self.data.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Read hook: `(offset, buf) -> status`
pub type ReadFn = Box<dyn FnMut(usize, &mut [u8]) -> Result<(), FragError>>;

/// Write hook: `(offset, bytes) -> status`
pub type WriteFn = Box<dyn FnMut(usize, &[u8]) -> Result<(), FragError>>;

/// Store built from two injected read/write hooks
///
/// This is the shape firmware usually exposes for flash: a pair of
/// functions and a declared size.
pub struct CallbackStore {
    read: ReadFn,
    write: WriteFn,
    capacity: usize,
}

impl CallbackStore {
    /// Wrap a read hook and a write hook addressing `capacity` bytes
    pub fn new(
        capacity: usize,
        read: impl FnMut(usize, &mut [u8]) -> Result<(), FragError> + 'static,
        write: impl FnMut(usize, &[u8]) -> Result<(), FragError> + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            write: Box::new(write),
            capacity,
        }
    }
}

impl core::fmt::Debug for CallbackStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackStore")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl FragmentStore for CallbackStore {
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FragError> {
        check_bounds(offset, bytes.len(), self.capacity)?;
        (self.write)(offset, bytes)
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), FragError> {
        check_bounds(offset, buf.len(), self.capacity)?;
        (self.read)(offset, buf)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_memory_store_bounds() {
        let mut store = MemoryStore::new(8);
        store.write(4, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 2];
        store.read(5, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);

        assert!(matches!(store.write(6, &[0; 3]), Err(FragError::Storage(_))));
        assert!(store.read(usize::MAX, &mut buf).is_err());
    }

    #[test]
    fn test_callback_store_forwards_to_hooks() {
        let flash = Rc::new(RefCell::new(vec![0u8; 16]));
        let reader = Rc::clone(&flash);
        let writer = Rc::clone(&flash);

        let mut store = CallbackStore::new(
            16,
            move |offset, buf| {
                buf.copy_from_slice(&reader.borrow()[offset..offset + buf.len()]);
                Ok(())
            },
            move |offset, bytes| {
                writer.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            },
        );

        store.write(10, &[9, 8, 7]).unwrap();
        assert_eq!(&flash.borrow()[10..13], &[9, 8, 7]);

        let mut buf = [0u8; 3];
        store.read(10, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);

        assert!(store.write(15, &[1, 2]).is_err());
    }
}
