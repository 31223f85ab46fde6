//! # Kernel Virtual Allocation
//!
//! Hands out page-granular, kernel-mapped regions backed by anonymous memory
//! objects. Each region owns exactly one object and one mapping:
//!
//! ```text
//!  vmalloc(len, name)
//!    ├─ round len up to the granularity
//!    ├─ create_anonymous(size) ──▶ object
//!    ├─ set_name(object, name)
//!    └─ map_kernel(object, RW) ──▶ base      (failure destroys object)
//!
//!  vmfree(region) / drop(region)
//!    ├─ unmap(base, size)
//!    └─ destroy(object)
//! ```
//!
//! [`KernelRegion`] is an owned handle; dropping it releases both resources,
//! so no exit path leaks. Code that has to carry a region as a bare address
//! can [`detach`](VirtualAllocator::detach) it and later hand the address to
//! [`vmfree_raw`](VirtualAllocator::vmfree_raw), which rejects addresses it
//! does not know.

mod backend;
mod name;

pub use backend::{KernelVmBackend, MapPermissions, VmError};
pub use name::ObjectName;

use crate::Granularity;
use alloc::collections::BTreeMap;
use core::fmt;
use kernel_memory_addresses::{PageSize, VirtualAddress};
use log::{debug, error, warn};
use spin::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmallocError {
    #[error("zero-length allocation requested")]
    ZeroLength,
    #[error("length {0:#x} overflows when rounded to a page")]
    LengthOverflow(u64),
    #[error("failed to create backing object: {0}")]
    ObjectCreation(VmError),
    #[error("failed to map backing object: {0}")]
    Mapping(VmError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmfreeError {
    #[error("{0} is not a live detached region")]
    UnknownRegion(VirtualAddress),
}

/// [`VirtualAllocator::detach`] was handed a region of another allocator.
///
/// Carries the region back to the caller untouched.
#[derive(thiserror::Error)]
#[error("region at {} belongs to another allocator", .0.base())]
pub struct ForeignRegion<'a, B: KernelVmBackend>(pub KernelRegion<'a, B>);

impl<B: KernelVmBackend> fmt::Debug for ForeignRegion<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignRegion").field(&self.0).finish()
    }
}

/// Resources behind one region.
struct Parts<O> {
    base: VirtualAddress,
    len: u64,
    object: O,
    name: ObjectName,
}

/// Page-granular kernel allocator over a [`KernelVmBackend`].
///
/// `Sync` whenever the backend is; the only state of its own is the
/// detached-region registry.
pub struct VirtualAllocator<B: KernelVmBackend> {
    backend: B,
    detached: Mutex<BTreeMap<u64, Parts<B::Object>>>,
}

impl<B: KernelVmBackend> VirtualAllocator<B> {
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            detached: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Allocate at least `length` bytes of zeroed, read/write kernel memory.
    ///
    /// `name` is attached to the backing object for diagnostics and cut to
    /// [`VMALLOC_NAME_MAX`](kernel_info::memory::VMALLOC_NAME_MAX) bytes.
    ///
    /// # Errors
    /// - [`VmallocError::ZeroLength`] for `length == 0`.
    /// - [`VmallocError::LengthOverflow`] if rounding `length` up overflows.
    /// - [`VmallocError::ObjectCreation`] / [`VmallocError::Mapping`] when the
    ///   backend is exhausted. Nothing stays allocated in either case.
    pub fn vmalloc(&self, length: u64, name: &str) -> Result<KernelRegion<'_, B>, VmallocError> {
        if length == 0 {
            return Err(VmallocError::ZeroLength);
        }
        let size =
            Granularity::checked_align_up(length).ok_or(VmallocError::LengthOverflow(length))?;

        let label = ObjectName::new(name);
        if label.as_str().len() < name.len() {
            warn!("vmalloc: name {name:?} truncated to {label:?}");
        }

        let object = self
            .backend
            .create_anonymous(size)
            .map_err(VmallocError::ObjectCreation)?;
        self.backend.set_name(&object, label.as_str());

        let base = match self
            .backend
            .map_kernel(&object, size, MapPermissions::READ_WRITE)
        {
            Ok(base) if base.is_aligned::<Granularity>() => base,
            Ok(base) => {
                self.backend.unmap(base, size);
                self.backend.destroy(object);
                return Err(VmallocError::Mapping(VmError::MisalignedMapping(
                    base.as_u64(),
                )));
            }
            Err(e) => {
                self.backend.destroy(object);
                return Err(VmallocError::Mapping(e));
            }
        };

        debug!("vmalloc: {label:?} {length:#x} bytes at {base}+{size:#x}");
        Ok(KernelRegion {
            allocator: self,
            parts: Some(Parts {
                base,
                len: size,
                object,
                name: label,
            }),
        })
    }

    /// Unmap `region` and destroy its backing object.
    ///
    /// Equivalent to dropping the handle.
    pub fn vmfree(&self, region: KernelRegion<'_, B>) {
        drop(region);
    }

    /// Give up the handle and keep the region alive under its base address.
    ///
    /// The address must eventually be passed to
    /// [`vmfree_raw`](Self::vmfree_raw) of this allocator.
    ///
    /// # Errors
    /// [`ForeignRegion`] if `region` was allocated by a different
    /// allocator; the region is returned and stays live.
    #[must_use = "a detached region leaks unless passed to vmfree_raw"]
    pub fn detach<'r>(
        &self,
        mut region: KernelRegion<'r, B>,
    ) -> Result<VirtualAddress, ForeignRegion<'r, B>> {
        if !core::ptr::eq(region.allocator, self) {
            warn!(
                "vmalloc: refusing to detach {} owned by another allocator",
                region.base()
            );
            return Err(ForeignRegion(region));
        }
        let Some(parts) = region.parts.take() else {
            return Ok(VirtualAddress::zero());
        };
        let base = parts.base;

        let stale = self.detached.lock().insert(base.as_u64(), parts);
        if let Some(stale) = stale {
            // The backend mapped two live regions at one address.
            error!("vmalloc: {base} detached twice, releasing the older region");
            self.release(stale);
        }
        debug!("vmalloc: detached {base}");
        Ok(base)
    }

    /// Release a region previously handed out by [`detach`](Self::detach).
    ///
    /// # Errors
    /// [`VmfreeError::UnknownRegion`] if `base` is not a live detached region
    /// of this allocator, e.g. already freed or never allocated here.
    pub fn vmfree_raw(&self, base: VirtualAddress) -> Result<(), VmfreeError> {
        let parts = self
            .detached
            .lock()
            .remove(&base.as_u64())
            .ok_or(VmfreeError::UnknownRegion(base))?;
        self.release(parts);
        Ok(())
    }

    /// Number of detached regions not yet passed to `vmfree_raw`.
    #[must_use]
    pub fn live_detached(&self) -> usize {
        self.detached.lock().len()
    }

    fn release(&self, parts: Parts<B::Object>) {
        debug!(
            "vmfree: {:?} at {}+{:#x}",
            parts.name, parts.base, parts.len
        );
        self.backend.unmap(parts.base, parts.len);
        self.backend.destroy(parts.object);
    }
}

/// An owned kernel-mapped region from [`VirtualAllocator::vmalloc`].
///
/// Dropping the handle unmaps the region, then destroys its object.
pub struct KernelRegion<'a, B: KernelVmBackend> {
    allocator: &'a VirtualAllocator<B>,
    /// `None` only after [`VirtualAllocator::detach`].
    parts: Option<Parts<B::Object>>,
}

impl<B: KernelVmBackend> KernelRegion<'_, B> {
    /// Page-aligned start of the mapping.
    #[must_use]
    pub fn base(&self) -> VirtualAddress {
        self.parts
            .as_ref()
            .map_or_else(VirtualAddress::zero, |p| p.base)
    }

    /// Mapped size in bytes; a multiple of the granularity.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.parts.as_ref().map_or(0, |p| p.len)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.parts.as_ref().map_or("", |p| p.name.as_str())
    }

    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base().as_mut_ptr()
    }
}

impl<B: KernelVmBackend> Drop for KernelRegion<'_, B> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            self.allocator.release(parts);
        }
    }
}

impl<B: KernelVmBackend> fmt::Debug for KernelRegion<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegion")
            .field("base", &self.base())
            .field("len", &format_args!("{:#x}", self.len()))
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use kernel_info::memory::VMALLOC_NAME_MAX;
    use std::sync::Mutex as StdMutex;

    /// Hands out increasing addresses and counts live resources.
    #[derive(Default)]
    struct CountingBackend {
        next_va: AtomicU64,
        next_object: AtomicUsize,
        objects: AtomicUsize,
        mappings: AtomicUsize,
        fail_create: AtomicBool,
        fail_map: AtomicBool,
        misalign: AtomicBool,
        names: StdMutex<Vec<String>>,
        log: StdMutex<Vec<&'static str>>,
    }

    impl CountingBackend {
        fn live(&self) -> (usize, usize) {
            (
                self.objects.load(Ordering::SeqCst),
                self.mappings.load(Ordering::SeqCst),
            )
        }
    }

    impl KernelVmBackend for CountingBackend {
        type Object = usize;

        fn create_anonymous(&self, size: u64) -> Result<usize, VmError> {
            assert!(Granularity::is_aligned(size));
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(VmError::OutOfMemory);
            }
            self.objects.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_object.fetch_add(1, Ordering::SeqCst))
        }

        fn set_name(&self, _object: &usize, name: &str) {
            self.names.lock().unwrap().push(name.to_string());
        }

        fn map_kernel(
            &self,
            _object: &usize,
            size: u64,
            permissions: MapPermissions,
        ) -> Result<VirtualAddress, VmError> {
            assert_eq!(permissions, MapPermissions::READ_WRITE);
            if self.fail_map.load(Ordering::SeqCst) {
                return Err(VmError::AddressSpaceExhausted);
            }
            self.mappings.fetch_add(1, Ordering::SeqCst);
            let offset = self.next_va.fetch_add(size + Granularity::SIZE, Ordering::SeqCst);
            let skew = if self.misalign.load(Ordering::SeqCst) { 8 } else { 0 };
            Ok(VirtualAddress::new(0xFFFF_C000_0000_0000 + offset + skew))
        }

        fn unmap(&self, _base: VirtualAddress, _size: u64) {
            self.log.lock().unwrap().push("unmap");
            self.mappings.fetch_sub(1, Ordering::SeqCst);
        }

        fn destroy(&self, _object: usize) {
            self.log.lock().unwrap().push("destroy");
            self.objects.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn rounds_up_and_releases_everything() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        let before = vm.backend().live();

        let region = vm.vmalloc(5000, "test").unwrap();
        assert_eq!(region.len(), 8192);
        assert!(region.base().is_aligned::<Granularity>());
        assert_eq!(region.name(), "test");
        assert_eq!(region.as_ptr() as u64, region.base().as_u64());
        assert_eq!(vm.backend().live(), (1, 1));

        vm.vmfree(region);
        assert_eq!(vm.backend().live(), before);
        assert_eq!(*vm.backend().log.lock().unwrap(), ["unmap", "destroy"]);
    }

    #[test]
    fn exact_multiples_are_not_padded() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        assert_eq!(vm.vmalloc(4096, "page").unwrap().len(), 4096);
        assert_eq!(vm.vmalloc(1, "byte").unwrap().len(), 4096);
    }

    #[test]
    fn zero_length_is_rejected_without_side_effects() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        assert_eq!(vm.vmalloc(0, "x").unwrap_err(), VmallocError::ZeroLength);
        assert_eq!(vm.backend().live(), (0, 0));
        assert!(vm.backend().names.lock().unwrap().is_empty());
    }

    #[test]
    fn overflowing_length_is_rejected() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        assert_eq!(
            vm.vmalloc(u64::MAX, "huge").unwrap_err(),
            VmallocError::LengthOverflow(u64::MAX)
        );
        assert_eq!(vm.backend().live(), (0, 0));
    }

    #[test]
    fn failed_creation_is_reported() {
        let backend = CountingBackend::default();
        backend.fail_create.store(true, Ordering::SeqCst);
        let vm = VirtualAllocator::new(backend);
        assert_eq!(
            vm.vmalloc(100, "x").unwrap_err(),
            VmallocError::ObjectCreation(VmError::OutOfMemory)
        );
        assert_eq!(vm.backend().live(), (0, 0));
    }

    #[test]
    fn failed_mapping_destroys_the_object() {
        let backend = CountingBackend::default();
        backend.fail_map.store(true, Ordering::SeqCst);
        let vm = VirtualAllocator::new(backend);
        assert_eq!(
            vm.vmalloc(100, "x").unwrap_err(),
            VmallocError::Mapping(VmError::AddressSpaceExhausted)
        );
        assert_eq!(vm.backend().live(), (0, 0));
        assert_eq!(*vm.backend().log.lock().unwrap(), ["destroy"]);
    }

    #[test]
    fn misaligned_mapping_is_undone() {
        let backend = CountingBackend::default();
        backend.misalign.store(true, Ordering::SeqCst);
        let vm = VirtualAllocator::new(backend);
        assert!(matches!(
            vm.vmalloc(100, "x"),
            Err(VmallocError::Mapping(VmError::MisalignedMapping(_)))
        ));
        assert_eq!(vm.backend().live(), (0, 0));
    }

    #[test]
    fn dropping_the_handle_frees() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        {
            let _region = vm.vmalloc(3 * 4096, "scoped").unwrap();
            assert_eq!(vm.backend().live(), (1, 1));
        }
        assert_eq!(vm.backend().live(), (0, 0));
    }

    #[test]
    fn long_names_are_truncated_before_labeling() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        let long = "n".repeat(VMALLOC_NAME_MAX * 2);
        let region = vm.vmalloc(1, &long).unwrap();
        assert_eq!(region.name().len(), VMALLOC_NAME_MAX);
        assert_eq!(vm.backend().names.lock().unwrap()[0], region.name());
    }

    #[test]
    fn detached_regions_are_validated() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        let base = vm.detach(vm.vmalloc(100, "raw").unwrap()).unwrap();
        assert_eq!(vm.live_detached(), 1);
        assert_eq!(vm.backend().live(), (1, 1));

        assert_eq!(
            vm.vmfree_raw(base + 0x1000),
            Err(VmfreeError::UnknownRegion(base + 0x1000))
        );
        assert_eq!(vm.vmfree_raw(base), Ok(()));
        assert_eq!(vm.backend().live(), (0, 0));
        assert_eq!(vm.vmfree_raw(base), Err(VmfreeError::UnknownRegion(base)));
        assert_eq!(vm.live_detached(), 0);
    }

    #[test]
    fn foreign_regions_are_not_detached() {
        let a = VirtualAllocator::new(CountingBackend::default());
        let b = VirtualAllocator::new(CountingBackend::default());

        let region = a.vmalloc(100, "from-a").unwrap();
        let base = region.base();
        let ForeignRegion(region) = b.detach(region).unwrap_err();
        assert_eq!(region.base(), base);
        assert_eq!(b.live_detached(), 0);
        assert_eq!(a.live_detached(), 0);
        assert_eq!(a.backend().live(), (1, 1));

        assert_eq!(b.vmfree_raw(base), Err(VmfreeError::UnknownRegion(base)));
        let base = a.detach(region).unwrap();
        assert_eq!(a.vmfree_raw(base), Ok(()));
        assert_eq!(a.backend().live(), (0, 0));
        assert_eq!(b.backend().live(), (0, 0));
    }

    #[test]
    fn borrowed_backend_is_shared() {
        let backend = CountingBackend::default();
        let vm = VirtualAllocator::new(&backend);
        let region = vm.vmalloc(10, "borrowed").unwrap();
        assert_eq!(backend.live(), (1, 1));
        drop(region);
        assert_eq!(backend.live(), (0, 0));
    }

    #[test]
    fn distinct_regions_do_not_overlap() {
        let vm = VirtualAllocator::new(CountingBackend::default());
        let a = vm.vmalloc(5000, "a").unwrap();
        let b = vm.vmalloc(5000, "b").unwrap();
        assert!(a.base().as_u64() + a.len() <= b.base().as_u64());
    }
}
