//! The memory subsystem underneath [`VirtualAllocator`](super::VirtualAllocator).

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// Access rights of a kernel mapping.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct MapPermissions {
    /// Readable.
    pub read: bool,
    /// Writable.
    pub write: bool,
    /// Executable.
    pub execute: bool,
    #[bits(5)]
    __: u8,
}

impl MapPermissions {
    /// Plain data: read/write, never executable.
    pub const READ_WRITE: Self = Self::new().with_read(true).with_write(true);
}

/// Failure reported by a [`KernelVmBackend`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("kernel address space exhausted")]
    AddressSpaceExhausted,
    #[error("backend returned unaligned mapping at {0:#x}")]
    MisalignedMapping(u64),
}

/// Anonymous memory objects and kernel-space mappings.
///
/// Every method takes `&self`; implementations synchronize internally.
pub trait KernelVmBackend {
    /// Handle to a backing memory object.
    type Object;

    /// Create a zero-filled anonymous object of `size` bytes.
    ///
    /// # Errors
    /// Whatever the backend runs out of.
    fn create_anonymous(&self, size: u64) -> Result<Self::Object, VmError>;

    /// Attach a diagnostic label. Best effort.
    fn set_name(&self, object: &Self::Object, name: &str);

    /// Map all of `object` into kernel space and return the base.
    ///
    /// # Errors
    /// Address space or page table exhaustion.
    fn map_kernel(
        &self,
        object: &Self::Object,
        size: u64,
        permissions: MapPermissions,
    ) -> Result<VirtualAddress, VmError>;

    fn unmap(&self, base: VirtualAddress, size: u64);

    fn destroy(&self, object: Self::Object);
}

impl<B: KernelVmBackend + ?Sized> KernelVmBackend for &B {
    type Object = B::Object;

    fn create_anonymous(&self, size: u64) -> Result<Self::Object, VmError> {
        (**self).create_anonymous(size)
    }

    fn set_name(&self, object: &Self::Object, name: &str) {
        (**self).set_name(object, name);
    }

    fn map_kernel(
        &self,
        object: &Self::Object,
        size: u64,
        permissions: MapPermissions,
    ) -> Result<VirtualAddress, VmError> {
        (**self).map_kernel(object, size, permissions)
    }

    fn unmap(&self, base: VirtualAddress, size: u64) {
        (**self).unmap(base, size);
    }

    fn destroy(&self, object: Self::Object) {
        (**self).destroy(object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_is_not_executable() {
        let p = MapPermissions::READ_WRITE;
        assert!(p.read());
        assert!(p.write());
        assert!(!p.execute());
        assert_eq!(p.into_bits(), 0b011);
    }
}
