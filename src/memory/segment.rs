//! Mapping of the broker-designated shared segment

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    ptr::NonNull,
};

use memmap2::{MmapMut, MmapOptions};
use nix::{
    fcntl::OFlag,
    sys::{
        mman::{shm_open, shm_unlink},
        stat::Mode,
    },
};

use crate::error::{Result, RuntimeError};

use super::config::{BackingType, SegmentConfig, SegmentInfo};

/// A mapped shared segment
///
/// Handles decoded from broker replies are offsets into this mapping. The
/// segment hands out raw pointers only after checking that the requested
/// range lies inside the mapping and is suitably aligned.
#[derive(Debug)]
pub struct SharedSegment {
    /// Geometry as announced by the broker
    info: SegmentInfo,
    /// Memory mapping, kept alive for `base`
    _mmap: MmapMut,
    /// Start of the mapping
    base: NonNull<u8>,
    /// Whether this process created the backing and removes it on drop
    owner: bool,
}

impl SharedSegment {
    /// Create the backing storage and map it (broker side, tooling, tests)
    pub fn create(config: &SegmentConfig) -> Result<Self> {
        config.validate()?;

        let info = config.segment_info();
        let file = match info.backing {
            BackingType::PosixShm => {
                let fd = shm_open(
                    info.locator.as_str(),
                    OFlag::O_CREAT | OFlag::O_RDWR,
                    Mode::from_bits_truncate(config.permissions as libc::mode_t),
                )
                .map_err(|e| {
                    RuntimeError::platform(format!(
                        "Failed to create shm object {}: {}",
                        info.locator, e
                    ))
                })?;
                File::from(fd)
            }
            BackingType::FileBacked => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(config.permissions)
                .open(&info.locator)
                .map_err(|e| RuntimeError::from_io(e, "Failed to create segment file"))?,
        };

        file.set_len(info.size as u64)
            .map_err(|e| RuntimeError::from_io(e, "Failed to set segment size"))?;

        Self::map(info, &file, true)
    }

    /// Open and map a segment announced by the broker
    pub fn open(info: &SegmentInfo) -> Result<Self> {
        info.validate()?;

        let file = match info.backing {
            BackingType::PosixShm => {
                let fd = shm_open(info.locator.as_str(), OFlag::O_RDWR, Mode::empty())
                    .map_err(|e| {
                        RuntimeError::platform(format!(
                            "Failed to open shm object {}: {}",
                            info.locator, e
                        ))
                    })?;
                File::from(fd)
            }
            BackingType::FileBacked => OpenOptions::new()
                .read(true)
                .write(true)
                .open(&info.locator)
                .map_err(|e| RuntimeError::from_io(e, "Failed to open segment file"))?,
        };

        let actual = file
            .metadata()
            .map_err(|e| RuntimeError::from_io(e, "Failed to stat segment"))?
            .len();
        if actual < info.size as u64 {
            return Err(RuntimeError::memory(format!(
                "Segment {} holds {} bytes, broker announced {}",
                info.locator, actual, info.size
            )));
        }

        Self::map(info.clone(), &file, false)
    }

    fn map(info: SegmentInfo, file: &File, owner: bool) -> Result<Self> {
        let mut mmap = unsafe {
            MmapOptions::new()
                .len(info.size)
                .map_mut(file)
                .map_err(|e| RuntimeError::from_io(e, "Failed to create memory mapping"))?
        };

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| RuntimeError::memory("Memory mapping returned a null base"))?;

        log::debug!("mapped segment {} at {:p}", info, base.as_ptr());

        Ok(Self {
            info,
            _mmap: mmap,
            base,
            owner,
        })
    }

    /// Geometry of the segment
    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Size of the mapping in bytes
    pub fn size(&self) -> usize {
        self.info.size
    }

    /// Base address of the mapping in this process
    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Offset of the broker's segment manager
    pub fn segment_manager_offset(&self) -> u64 {
        self.info.segment_manager_offset
    }

    /// Resolve `offset` to a pointer to `len` bytes aligned to `align`
    pub fn resolve_offset(&self, offset: u64, len: usize, align: usize) -> Result<NonNull<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| RuntimeError::invalid_handle(offset, "offset overflows"))?;
        if end > self.info.size as u64 {
            return Err(RuntimeError::invalid_handle(
                offset,
                format!("range of {} bytes exceeds segment of {} bytes", len, self.info.size),
            ));
        }

        let address = self.base_address() + offset as usize;
        if align > 1 && address % align != 0 {
            return Err(RuntimeError::invalid_handle(
                offset,
                format!("not aligned to {}", align),
            ));
        }

        // in bounds of a non-null mapping
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)) })
    }

    /// Offset of `ptr` inside this mapping, if it lies inside
    pub fn offset_of(&self, ptr: *const u8) -> Option<u64> {
        let address = ptr as usize;
        let base = self.base_address();
        if address >= base && address < base + self.info.size {
            Some((address - base) as u64)
        } else {
            None
        }
    }

    /// Get the raw memory slice (read-only)
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.info.size) }
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if self.owner && self.info.backing == BackingType::PosixShm {
            if let Err(e) = shm_unlink(self.info.locator.as_str()) {
                log::warn!("failed to unlink shm object {}: {}", self.info.locator, e);
            }
        }
    }
}

unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_segment(dir: &TempDir, size: usize) -> SharedSegment {
        let config = SegmentConfig::new("test_segment", size)
            .with_backing_type(BackingType::FileBacked)
            .with_file_path(dir.path().join("segment"));
        SharedSegment::create(&config).unwrap()
    }

    #[test]
    fn test_open_sees_creator_writes() {
        let dir = TempDir::new().unwrap();
        let owner = file_segment(&dir, 4096);

        let ptr = owner.resolve_offset(128, 8, 8).unwrap();
        unsafe { (ptr.as_ptr() as *mut u64).write(0xC0FFEE) };

        let client = SharedSegment::open(owner.info()).unwrap();
        let seen = client.resolve_offset(128, 8, 8).unwrap();
        assert_eq!(unsafe { (seen.as_ptr() as *const u64).read() }, 0xC0FFEE);
    }

    #[test]
    fn test_resolve_rejects_out_of_range() {
        let dir = TempDir::new().unwrap();
        let segment = file_segment(&dir, 4096);

        assert!(segment.resolve_offset(4088, 8, 8).is_ok());
        assert!(segment.resolve_offset(4090, 8, 1).is_err());
        assert!(segment.resolve_offset(u64::MAX, 8, 1).is_err());
        assert!(segment.resolve_offset(12, 8, 8).is_err());
    }

    #[test]
    fn test_offset_of() {
        let dir = TempDir::new().unwrap();
        let segment = file_segment(&dir, 4096);

        let ptr = segment.resolve_offset(256, 1, 1).unwrap();
        assert_eq!(segment.offset_of(ptr.as_ptr()), Some(256));
        assert_eq!(segment.offset_of(std::ptr::null()), None);
    }

    #[test]
    fn test_open_rejects_short_backing() {
        let dir = TempDir::new().unwrap();
        let segment = file_segment(&dir, 4096);

        let mut info = segment.info().clone();
        info.size = 8192;
        assert!(SharedSegment::open(&info).is_err());
    }
}
