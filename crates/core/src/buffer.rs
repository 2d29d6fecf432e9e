use std::{
    alloc::{self, Layout},
    fmt,
    ptr::NonNull,
};

/// Alignment of every frame allocation; page-aligned so DMA engines can target it directly.
pub const STORAGE_ALIGN: usize = 4096;

/// Errors raised while sizing or allocating frame memory.
///
/// # Example
/// ```rust
/// use acheron_core::prelude::{AllocationError, FrameStorage};
///
/// let err = FrameStorage::zeroed(0).err().unwrap();
/// assert!(matches!(err, AllocationError::Empty));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Width or height was zero.
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
    /// `width * height * bpp` does not fit in memory.
    #[error("frame size overflows for {width}x{height}")]
    SizeOverflow { width: u32, height: u32 },
    /// A zero-length allocation was requested.
    #[error("refusing to allocate an empty frame buffer")]
    Empty,
    /// The allocator returned null.
    #[error("failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },
}

/// Address of a frame buffer as the driver sees it.
///
/// This is an identity, not an owner: it is only ever compared, or handed to the driver as
/// the target of its writes. Nothing in the engine dereferences it.
///
/// # Example
/// ```rust
/// use acheron_core::prelude::FrameStorage;
///
/// let storage = FrameStorage::zeroed(64).unwrap();
/// assert_eq!(storage.driver_ptr(), storage.driver_ptr());
/// assert_eq!(storage.driver_ptr().addr() % 4096, 0);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverPtr(NonNull<u8>);

// SAFETY: `DriverPtr` is an opaque address used for identity comparisons and for passing to the
// driver; it carries no ownership and is never dereferenced through this type.
unsafe impl Send for DriverPtr {}
// SAFETY: see above.
unsafe impl Sync for DriverPtr {}

impl DriverPtr {
    /// Wrap a raw pointer reported by the driver; `None` for null.
    pub fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Raw pointer for handing to the driver.
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Numeric address, for logging.
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for DriverPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DriverPtr({:#x})", self.addr())
    }
}

/// Fixed-capacity, address-stable, zero-initialised frame memory.
///
/// The allocation never moves or grows; the only way to change its size is to drop it and
/// allocate a new one. That is what lets the driver keep a raw pointer into it.
pub struct FrameStorage {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: `FrameStorage` uniquely owns its allocation; access to the bytes goes through
// `unsafe` accessors whose callers guarantee the driver is not writing concurrently.
unsafe impl Send for FrameStorage {}
// SAFETY: shared access only hands out the address or (unsafely) a read-only view.
unsafe impl Sync for FrameStorage {}

impl FrameStorage {
    /// Allocate `len` zeroed bytes aligned to [`STORAGE_ALIGN`].
    pub fn zeroed(len: usize) -> Result<Self, AllocationError> {
        if len == 0 {
            return Err(AllocationError::Empty);
        }
        let layout = Layout::from_size_align(len, STORAGE_ALIGN)
            .map_err(|_| AllocationError::OutOfMemory { bytes: len })?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocationError::OutOfMemory { bytes: len })?;
        Ok(Self { ptr, layout })
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; empty storage cannot be constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Address the driver writes into.
    pub fn driver_ptr(&self) -> DriverPtr {
        DriverPtr(self.ptr)
    }

    /// Whether `ptr` is the start of this allocation.
    pub fn matches(&self, ptr: DriverPtr) -> bool {
        self.ptr == ptr.0
    }

    /// Borrow the bytes.
    ///
    /// # Safety
    /// Nothing (in particular the driver) may write to the storage while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialised bytes for the lifetime of `self`;
        // the caller rules out concurrent writers.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }
}

impl Drop for FrameStorage {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for FrameStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStorage")
            .field("ptr", &self.driver_ptr())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_zeroed_and_sized() {
        let storage = FrameStorage::zeroed(1_228_800).unwrap();
        assert_eq!(storage.len(), 1_228_800);
        let bytes = unsafe { storage.as_slice() };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn address_survives_moves() {
        let storage = FrameStorage::zeroed(16).unwrap();
        let before = storage.driver_ptr();
        let moved = vec![storage];
        assert!(moved[0].matches(before));
    }

    #[test]
    fn writes_through_driver_ptr_are_visible() {
        let storage = FrameStorage::zeroed(8).unwrap();
        let ptr = storage.driver_ptr();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xab, 8) };
        assert_eq!(unsafe { storage.as_slice() }, &[0xab; 8]);
    }

    #[test]
    fn distinct_allocations_never_match() {
        let a = FrameStorage::zeroed(32).unwrap();
        let b = FrameStorage::zeroed(32).unwrap();
        assert!(!a.matches(b.driver_ptr()));
        assert!(DriverPtr::from_raw(std::ptr::null_mut()).is_none());
    }
}
