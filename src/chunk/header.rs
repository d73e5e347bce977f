//! Chunk header placed in front of every pooled payload

use std::{
    ptr::NonNull,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::{Result, RuntimeError};

/// Version of the header layout shared by every process mapping a segment
pub const CHUNK_HEADER_LAYOUT_VERSION: u32 = 1;

/// Metadata record living directly in front of a chunk payload
///
/// The payload always starts exactly [`ChunkHeader::SIZE`] bytes after the
/// header. The payload address is computed from the header address on
/// demand and never stored, so a header read through a mapping at a
/// different base address still yields that process's payload address.
#[repr(C, align(8))]
#[derive(Debug)]
pub struct ChunkHeader {
    /// Layout version, see [`CHUNK_HEADER_LAYOUT_VERSION`]
    pub layout_version: u32,
    /// Bytes of the chunk in use (header + payload)
    pub used_size_of_chunk: u32,
    /// Size of the whole pool slot
    pub total_size_of_chunk: u32,
    /// Payload bytes written by the producer
    pub payload_size: u32,
    /// Send timestamp in microseconds since UNIX epoch
    pub tx_timestamp_us: u64,
    /// Producer sequence number
    pub sequence_number: u64,
}

const _: () = assert!(ChunkHeader::SIZE % ChunkHeader::ALIGNMENT == 0);

impl ChunkHeader {
    /// Size of the header in bytes, identical in every participant
    pub const SIZE: usize = std::mem::size_of::<ChunkHeader>();

    /// Alignment a pool slot must satisfy
    pub const ALIGNMENT: usize = std::mem::align_of::<ChunkHeader>();

    /// Payload address for a header at `header_address`
    #[inline]
    pub const fn payload_address(header_address: usize) -> usize {
        header_address.wrapping_add(Self::SIZE)
    }

    /// Header address for a payload at `payload_address`
    ///
    /// Only meaningful for addresses produced by [`ChunkHeader::payload_address`].
    #[inline]
    pub const fn header_address(payload_address: usize) -> usize {
        payload_address.wrapping_sub(Self::SIZE)
    }

    /// Payload offset for a header at `header_offset` inside a segment
    #[inline]
    pub const fn payload_offset(header_offset: u64) -> u64 {
        header_offset.wrapping_add(Self::SIZE as u64)
    }

    /// Header offset for a payload at `payload_offset` inside a segment
    #[inline]
    pub const fn header_offset(payload_offset: u64) -> u64 {
        payload_offset.wrapping_sub(Self::SIZE as u64)
    }

    /// Construct a header in place at the start of a claimed pool slot
    ///
    /// # Safety
    /// `slot` must point to `total_size` writable bytes that no one else
    /// accesses until the chunk is handed out.
    pub unsafe fn init_in_slot(
        slot: NonNull<u8>,
        total_size: usize,
    ) -> Result<NonNull<ChunkHeader>> {
        if slot.as_ptr() as usize % Self::ALIGNMENT != 0 {
            return Err(RuntimeError::invalid_parameter(
                "slot",
                format!("slot {:p} not aligned to {}", slot.as_ptr(), Self::ALIGNMENT),
            ));
        }

        if total_size < Self::SIZE || total_size > u32::MAX as usize {
            return Err(RuntimeError::invalid_parameter(
                "total_size",
                format!("slot of {} bytes cannot hold a chunk", total_size),
            ));
        }

        let header = slot.cast::<ChunkHeader>();
        header.as_ptr().write(ChunkHeader {
            layout_version: CHUNK_HEADER_LAYOUT_VERSION,
            used_size_of_chunk: Self::SIZE as u32,
            total_size_of_chunk: total_size as u32,
            payload_size: 0,
            tx_timestamp_us: 0,
            sequence_number: 0,
        });

        Ok(header)
    }

    /// Recover the header of a payload handed out by a pool
    ///
    /// # Safety
    /// `payload` must have been obtained from [`ChunkHeader::payload`] or
    /// [`ChunkHeader::payload_mut`] of a header that is still alive.
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<ChunkHeader> {
        NonNull::new_unchecked(payload.as_ptr().sub(Self::SIZE)).cast()
    }

    /// Payload of this chunk
    #[inline]
    pub fn payload(&self) -> *const u8 {
        Self::payload_address(self as *const Self as usize) as *const u8
    }

    /// Mutable payload of this chunk
    #[inline]
    pub fn payload_mut(&mut self) -> *mut u8 {
        Self::payload_address(self as *mut Self as usize) as *mut u8
    }

    /// Payload bytes the slot can hold
    pub fn payload_capacity(&self) -> usize {
        self.total_size_of_chunk as usize - Self::SIZE
    }

    /// Record the payload size written by the producer
    pub fn set_payload_size(&mut self, payload_size: usize) -> Result<()> {
        if payload_size > self.payload_capacity() {
            return Err(RuntimeError::invalid_parameter(
                "payload_size",
                format!(
                    "{} bytes exceed the chunk capacity of {}",
                    payload_size,
                    self.payload_capacity()
                ),
            ));
        }

        self.payload_size = payload_size as u32;
        self.used_size_of_chunk = (Self::SIZE + payload_size) as u32;
        Ok(())
    }

    /// Stamp the chunk before it is sent
    pub fn stamp(&mut self, sequence_number: u64) {
        self.sequence_number = sequence_number;
        self.tx_timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
    }

    /// Whether this header was written with the current layout
    pub fn is_current_layout(&self) -> bool {
        self.layout_version == CHUNK_HEADER_LAYOUT_VERSION
    }
}
