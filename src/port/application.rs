//! Application port: one-way capability announcements through shared memory
//!
//! The broker places a single-producer single-consumer queue at the
//! application port's offset. The runtime pushes offer/stop-offer records,
//! the broker drains them during its discovery loop. No channel round trip
//! is involved.

use std::{
    mem::{align_of, size_of},
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    error::{Result, RuntimeError},
    memory::SharedSegment,
    protocol::{
        CaproMessage, CaproMessageType, CaproSubType, ServiceDescription, MAX_ID_STRING_LENGTH,
    },
    runtime::handle::{ApplicationPortData, Handle},
};

/// Queue header at the application port's offset
#[repr(C)]
#[derive(Debug)]
pub struct CaproQueueHeader {
    /// Number of record slots, a power of two written by the broker
    pub capacity: AtomicU64,
    /// Records pushed so far
    pub write_pos: AtomicU64,
    /// Records consumed so far
    pub read_pos: AtomicU64,
    _reserved: u64,
}

/// Fixed-size capability record as laid out in the segment
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub struct CaproRecord {
    kind: u32,
    sub_type: u32,
    lengths: [u32; 3],
    _reserved: u32,
    service: [u8; MAX_ID_STRING_LENGTH],
    instance: [u8; MAX_ID_STRING_LENGTH],
    event: [u8; MAX_ID_STRING_LENGTH],
}

impl CaproRecord {
    fn encode(message: &CaproMessage) -> Self {
        let mut record = Self {
            kind: message.kind as u32,
            sub_type: message.sub_type as u32,
            lengths: [0; 3],
            _reserved: 0,
            service: [0; MAX_ID_STRING_LENGTH],
            instance: [0; MAX_ID_STRING_LENGTH],
            event: [0; MAX_ID_STRING_LENGTH],
        };

        let ids = [
            message.service.service.as_str(),
            message.service.instance.as_str(),
            message.service.event.as_str(),
        ];
        for (index, id) in ids.iter().enumerate() {
            let bytes = id.as_bytes();
            record.lengths[index] = bytes.len() as u32;
            let field = match index {
                0 => &mut record.service,
                1 => &mut record.instance,
                _ => &mut record.event,
            };
            field[..bytes.len()].copy_from_slice(bytes);
        }

        record
    }

    fn decode(&self) -> Result<CaproMessage> {
        let kind = match self.kind {
            1 => CaproMessageType::Offer,
            2 => CaproMessageType::StopOffer,
            other => {
                return Err(RuntimeError::protocol("capro message type", other.to_string()));
            }
        };
        let sub_type = match self.sub_type {
            1 => CaproSubType::Service,
            2 => CaproSubType::Event,
            other => {
                return Err(RuntimeError::protocol("capro sub type", other.to_string()));
            }
        };

        let field = |bytes: &[u8; MAX_ID_STRING_LENGTH], length: u32| -> Result<String> {
            let length = (length as usize).min(MAX_ID_STRING_LENGTH);
            std::str::from_utf8(&bytes[..length])
                .map(str::to_string)
                .map_err(|_| {
                    RuntimeError::protocol("UTF-8 identifier", format!("{:?}", &bytes[..length]))
                })
        };

        let service = ServiceDescription::new(
            field(&self.service, self.lengths[0])?,
            field(&self.instance, self.lengths[1])?,
            field(&self.event, self.lengths[2])?,
        )?;

        Ok(CaproMessage {
            kind,
            sub_type,
            service,
        })
    }
}

/// Bytes needed at the port offset for a queue of `capacity` records
///
/// `None` when the size is not representable.
pub fn required_size(capacity: u64) -> Option<usize> {
    usize::try_from(capacity)
        .ok()?
        .checked_mul(size_of::<CaproRecord>())?
        .checked_add(size_of::<CaproQueueHeader>())
}

/// Check a capacity read from or written to the segment
fn validate_capacity(segment: &SharedSegment, offset: u64, capacity: u64) -> Result<usize> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(RuntimeError::invalid_handle(
            offset,
            format!("application port capacity {} is not a power of 2", capacity),
        ));
    }

    match required_size(capacity) {
        Some(size) if size <= segment.size() => Ok(size),
        _ => Err(RuntimeError::invalid_handle(
            offset,
            format!(
                "application port capacity {} does not fit a segment of {} bytes",
                capacity,
                segment.size()
            ),
        )),
    }
}

/// Producer (and, for the broker side, consumer) of the capability queue
#[derive(Debug)]
pub struct ApplicationPort {
    segment: Arc<SharedSegment>,
    handle: Handle<ApplicationPortData>,
    header: NonNull<CaproQueueHeader>,
    records: NonNull<CaproRecord>,
    capacity: u64,
    producer: Mutex<()>,
    consumer: Mutex<()>,
}

impl ApplicationPort {
    /// Lay out an empty queue at `offset` (broker side)
    pub fn initialize(segment: &SharedSegment, offset: u64, capacity: u64) -> Result<()> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RuntimeError::invalid_parameter(
                "capacity",
                "Capacity must be a power of 2 and greater than 0",
            ));
        }

        let size = validate_capacity(segment, offset, capacity)?;
        let base = segment.resolve_offset(offset, size, align_of::<CaproQueueHeader>())?;
        unsafe {
            base.cast::<CaproQueueHeader>().as_ptr().write(CaproQueueHeader {
                capacity: AtomicU64::new(capacity),
                write_pos: AtomicU64::new(0),
                read_pos: AtomicU64::new(0),
                _reserved: 0,
            });
        }
        Ok(())
    }

    /// Attach to the queue the broker placed behind `handle`
    pub fn attach(
        segment: Arc<SharedSegment>,
        handle: Handle<ApplicationPortData>,
    ) -> Result<Self> {
        let header = handle.resolve(&segment)?.cast::<CaproQueueHeader>();
        let capacity = unsafe { header.as_ref() }.capacity.load(Ordering::Acquire);
        let size = validate_capacity(&segment, handle.offset(), capacity)?;

        // the whole queue, not just the header, must lie inside the segment
        segment.resolve_offset(handle.offset(), size, align_of::<CaproQueueHeader>())?;
        let records_offset = handle.offset() + size_of::<CaproQueueHeader>() as u64;
        let records = segment
            .resolve_offset(
                records_offset,
                size - size_of::<CaproQueueHeader>(),
                align_of::<CaproRecord>(),
            )?
            .cast::<CaproRecord>();

        Ok(Self {
            segment,
            handle,
            header,
            records,
            capacity,
            producer: Mutex::new(()),
            consumer: Mutex::new(()),
        })
    }

    fn header(&self) -> &CaproQueueHeader {
        // inside the mapping kept alive by `self.segment`
        unsafe { self.header.as_ref() }
    }

    /// Queue a capability announcement for the broker
    pub fn dispatch(&self, message: &CaproMessage) -> Result<()> {
        let _producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        let header = self.header();

        let write_pos = header.write_pos.load(Ordering::Relaxed);
        let read_pos = header.read_pos.load(Ordering::Acquire);
        if write_pos.wrapping_sub(read_pos) >= self.capacity {
            return Err(RuntimeError::buffer_full("application port"));
        }

        let index = (write_pos & (self.capacity - 1)) as usize;
        unsafe {
            self.records.as_ptr().add(index).write(CaproRecord::encode(message));
        }
        header.write_pos.store(write_pos.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Take the oldest announcement, if any (broker side)
    pub fn try_receive(&self) -> Option<Result<CaproMessage>> {
        let _consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        let header = self.header();

        let read_pos = header.read_pos.load(Ordering::Relaxed);
        let write_pos = header.write_pos.load(Ordering::Acquire);
        if read_pos == write_pos {
            return None;
        }

        let index = (read_pos & (self.capacity - 1)) as usize;
        let record = unsafe { self.records.as_ptr().add(index).read() };
        header.read_pos.store(read_pos.wrapping_add(1), Ordering::Release);
        Some(record.decode())
    }

    /// Announcements queued and not yet consumed
    pub fn len(&self) -> usize {
        let header = self.header();
        let write_pos = header.write_pos.load(Ordering::Acquire);
        let read_pos = header.read_pos.load(Ordering::Acquire);
        write_pos.wrapping_sub(read_pos) as usize
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of record slots
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Handle this port was attached from
    pub fn handle(&self) -> Handle<ApplicationPortData> {
        self.handle
    }

    /// Segment the queue lives in
    pub fn segment(&self) -> &Arc<SharedSegment> {
        &self.segment
    }
}

unsafe impl Send for ApplicationPort {}
unsafe impl Sync for ApplicationPort {}
