//! Typed, non-owning handles to broker-owned objects in the shared segment

use std::{
    fmt,
    marker::PhantomData,
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    config::HANDLE_ALIGNMENT,
    error::{Result, RuntimeError},
    memory::SharedSegment,
    port::CaproQueueHeader,
};

/// Kind of broker object a [`Handle`] refers to
pub trait HandleKind: 'static {
    /// Name used in logs
    const NAME: &'static str;
    /// Bytes that must be addressable at the handle's offset
    const MIN_SIZE: usize;
}

macro_rules! handle_kind {
    ($(#[$doc:meta])* $kind:ident, $name:literal, $size:expr) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub enum $kind {}

        impl HandleKind for $kind {
            const NAME: &'static str = $name;
            const MIN_SIZE: usize = $size;
        }
    };
}

handle_kind!(
    /// Sender port state owned by the broker
    SenderPortData, "sender port", HANDLE_ALIGNMENT
);
handle_kind!(
    /// Receiver port state owned by the broker
    ReceiverPortData, "receiver port", HANDLE_ALIGNMENT
);
handle_kind!(
    /// Interface port state owned by the broker
    InterfacePortData, "interface port", HANDLE_ALIGNMENT
);
handle_kind!(
    /// Application port capability queue
    ApplicationPortData, "application port", std::mem::size_of::<CaproQueueHeader>()
);
handle_kind!(
    /// Runnable state owned by the broker
    RunnableData, "runnable", HANDLE_ALIGNMENT
);
handle_kind!(
    /// Service registry change counter
    ChangeCounterData, "registry change counter", std::mem::size_of::<AtomicU64>()
);

/// Offset of a broker-owned object inside the shared segment
///
/// Only obtainable through [`Handle::decode`], which checks the offset
/// against the segment. The runtime never frees what a handle refers to.
pub struct Handle<K: HandleKind> {
    offset: u64,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> Handle<K> {
    /// Decode a numeric reply token into a handle valid for `segment`
    pub fn decode(token: &str, segment: &SharedSegment) -> Result<Self> {
        let offset: u64 = token.parse().map_err(|_| {
            RuntimeError::protocol(format!("numeric {} offset", K::NAME), token.to_string())
        })?;
        Self::from_offset(offset, segment)
    }

    /// Validate a raw offset against `segment`
    pub fn from_offset(offset: u64, segment: &SharedSegment) -> Result<Self> {
        segment.resolve_offset(offset, K::MIN_SIZE, HANDLE_ALIGNMENT)?;
        Ok(Self {
            offset,
            _kind: PhantomData,
        })
    }

    /// Offset inside the segment
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Address of the object in this process
    pub fn resolve(&self, segment: &SharedSegment) -> Result<NonNull<u8>> {
        segment.resolve_offset(self.offset, K::MIN_SIZE, HANDLE_ALIGNMENT)
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for Handle<K> {}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({:#x})", K::NAME, self.offset)
    }
}

impl<K: HandleKind> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", K::NAME, self.offset)
    }
}

/// Process-wide counter the broker bumps on every registry change
///
/// Poll [`RegistryChangeCounter::value`] and compare with an earlier reading
/// instead of re-querying the broker.
#[derive(Debug, Clone)]
pub struct RegistryChangeCounter {
    segment: Arc<SharedSegment>,
    handle: Handle<ChangeCounterData>,
    counter: NonNull<AtomicU64>,
}

impl RegistryChangeCounter {
    /// Attach to the counter a handle refers to
    pub fn attach(segment: Arc<SharedSegment>, handle: Handle<ChangeCounterData>) -> Result<Self> {
        let counter = handle.resolve(&segment)?.cast::<AtomicU64>();
        Ok(Self {
            segment,
            handle,
            counter,
        })
    }

    /// Current counter value
    pub fn value(&self) -> u64 {
        // lives in the mapping held by `self.segment`
        unsafe { self.counter.as_ref() }.load(Ordering::Acquire)
    }

    /// Whether the registry changed since `last_seen` was read
    pub fn changed_since(&self, last_seen: u64) -> bool {
        self.value() != last_seen
    }

    /// Handle the counter was attached from
    pub fn handle(&self) -> Handle<ChangeCounterData> {
        self.handle
    }

    /// Segment the counter lives in
    pub fn segment(&self) -> &Arc<SharedSegment> {
        &self.segment
    }
}

unsafe impl Send for RegistryChangeCounter {}
unsafe impl Sync for RegistryChangeCounter {}
