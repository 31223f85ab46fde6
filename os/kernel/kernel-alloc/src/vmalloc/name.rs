use core::fmt;
use kernel_info::memory::VMALLOC_NAME_MAX;

/// Inline copy of a region label, at most [`VMALLOC_NAME_MAX`] bytes.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ObjectName {
    bytes: [u8; VMALLOC_NAME_MAX],
    len: usize,
}

impl ObjectName {
    /// Copies `name`, cutting it at the last character boundary that fits.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(VMALLOC_NAME_MAX);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0; VMALLOC_NAME_MAX];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self { bytes, len: end }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Always cut on a char boundary of a valid str.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
