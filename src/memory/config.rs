//! Configuration types for the broker-designated shared segment

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::error::{Result, RuntimeError};

/// Types of shared memory backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingType {
    /// POSIX shared memory object (`shm_open`)
    PosixShm,
    /// File-backed shared memory
    FileBacked,
}

impl Default for BackingType {
    fn default() -> Self {
        Self::PosixShm
    }
}

impl BackingType {
    /// Token used for this backing type in the registration reply
    pub fn as_token(&self) -> &'static str {
        match self {
            BackingType::PosixShm => "shm",
            BackingType::FileBacked => "file",
        }
    }

    /// Get a human-readable name for the backing type
    pub fn name(&self) -> &'static str {
        match self {
            BackingType::PosixShm => "posix-shm",
            BackingType::FileBacked => "file-backed",
        }
    }
}

impl FromStr for BackingType {
    type Err = RuntimeError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "shm" => Ok(BackingType::PosixShm),
            "file" => Ok(BackingType::FileBacked),
            other => Err(RuntimeError::protocol("segment backing 'shm' or 'file'", other)),
        }
    }
}

/// Location and geometry of the segment as announced by the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Backing of the segment
    pub backing: BackingType,
    /// Shm object name (leading '/') or file path
    pub locator: String,
    /// Total mapped size in bytes
    pub size: usize,
    /// Offset of the broker's segment manager inside the segment
    pub segment_manager_offset: u64,
}

impl SegmentInfo {
    /// Validate the announced geometry before mapping
    pub fn validate(&self) -> Result<()> {
        if self.locator.is_empty() {
            return Err(RuntimeError::invalid_parameter(
                "locator",
                "Segment locator cannot be empty",
            ));
        }

        if self.size == 0 {
            return Err(RuntimeError::invalid_parameter(
                "size",
                "Segment size must be greater than 0",
            ));
        }

        if self.backing == BackingType::PosixShm
            && (!self.locator.starts_with('/') || self.locator[1..].contains('/'))
        {
            return Err(RuntimeError::invalid_parameter(
                "locator",
                format!("'{}' is not a valid shm object name", self.locator),
            ));
        }

        if self.segment_manager_offset >= self.size as u64 {
            return Err(RuntimeError::invalid_parameter(
                "segment_manager_offset",
                format!(
                    "offset {:#x} lies outside a segment of {} bytes",
                    self.segment_manager_offset, self.size
                ),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for SegmentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} bytes)", self.backing.as_token(), self.locator, self.size)
    }
}

/// Configuration for creating a segment (broker side and tooling)
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Shm object name or file name
    pub name: String,
    /// Total size of the segment in bytes
    pub size: usize,
    /// Backing type for the shared memory
    pub backing_type: BackingType,
    /// Optional file path for file-backed segments
    pub file_path: Option<PathBuf>,
    /// Offset reserved for the segment manager
    pub segment_manager_offset: u64,
    /// Permissions for the segment (Unix permissions)
    pub permissions: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            backing_type: BackingType::default(),
            file_path: None,
            segment_manager_offset: 0,
            permissions: 0o660,
        }
    }
}

impl SegmentConfig {
    /// Create a new segment configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Set the backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Set the file path for file-backed segments
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set the segment manager offset
    pub fn with_segment_manager_offset(mut self, offset: u64) -> Self {
        self.segment_manager_offset = offset;
        self
    }

    /// Set the permissions for the segment
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Where clients find the segment
    pub fn locator(&self) -> String {
        match self.backing_type {
            BackingType::PosixShm => {
                if self.name.starts_with('/') {
                    self.name.clone()
                } else {
                    format!("/{}", self.name)
                }
            }
            BackingType::FileBacked => self
                .file_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("/tmp/renoir_{}", self.name)))
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// The info a broker announces for this segment
    pub fn segment_info(&self) -> SegmentInfo {
        SegmentInfo {
            backing: self.backing_type,
            locator: self.locator(),
            size: self.size,
            segment_manager_offset: self.segment_manager_offset,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RuntimeError::invalid_parameter(
                "name",
                "Segment name cannot be empty",
            ));
        }

        self.segment_info().validate()
    }
}
