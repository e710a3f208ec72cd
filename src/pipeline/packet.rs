//! Immutable, timestamped data packets.
//!
//! A `Packet` carries a type-erased payload behind an `Arc`, so fanning a
//! packet out to several consumers (or re-stamping it with [`Packet::at`])
//! never copies the payload. Reads go through [`Packet::get`], which checks
//! the stored type and fails with a typed error instead of reinterpreting
//! memory.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::timestamp::Timestamp;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type tag of a packet payload.
#[derive(Clone, Copy)]
pub struct PacketType {
    id: Option<TypeId>,
    name: &'static str,
}

impl PacketType {
    /// The tag for payloads of type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: Some(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
        }
    }

    /// Matches any payload type. Used by type-agnostic ports such as
    /// pass-through inputs and graph input streams.
    pub const fn any() -> Self {
        Self {
            id: None,
            name: "any",
        }
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.id.is_none()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a stream carrying `self` may feed a port declared as `other`.
    pub fn is_compatible_with(&self, other: &PacketType) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl PartialEq for PacketType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PacketType {}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketType({})", self.name)
    }
}

/// Immutable payload + timestamp. Cloning shares the payload.
#[derive(Clone)]
pub struct Packet {
    payload: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
    timestamp: Timestamp,
}

impl Packet {
    /// Wraps `value` in a new packet with an unset timestamp.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared payload without copying it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            payload: Some(value),
            type_name: std::any::type_name::<T>(),
            timestamp: Timestamp::UNSET,
        }
    }

    /// The explicit "no packet at this timestamp" marker.
    pub fn empty() -> Self {
        Self {
            payload: None,
            type_name: "empty",
            timestamp: Timestamp::UNSET,
        }
    }

    /// Returns a packet sharing this payload, stamped with `timestamp`.
    pub fn at(&self, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            payload: self.payload.clone(),
            type_name: self.type_name,
            timestamp: timestamp.into(),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    /// Name of the stored payload type, or `"empty"`.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `true` if the payload is a `T`.
    pub fn holds<T: Any>(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| p.is::<T>())
    }

    /// Borrows the payload as `T`.
    pub fn get<T: Any>(&self) -> PipelineResult<&T> {
        let payload = self.payload.as_ref().ok_or(PipelineError::EmptyPacket {
            expected: std::any::type_name::<T>(),
        })?;
        payload
            .downcast_ref::<T>()
            .ok_or(PipelineError::PacketTypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.type_name,
            })
    }

    /// Returns the shared payload as `Arc<T>` without copying.
    pub fn share<T: Any + Send + Sync>(&self) -> PipelineResult<Arc<T>> {
        let payload = self.payload.clone().ok_or(PipelineError::EmptyPacket {
            expected: std::any::type_name::<T>(),
        })?;
        payload
            .downcast::<T>()
            .map_err(|_| PipelineError::PacketTypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: self.type_name,
            })
    }

    /// `true` when both packets point at the same payload allocation.
    pub fn shares_payload_with(&self, other: &Packet) -> bool {
        match (&self.payload, &other.payload) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this packet may be sent on a port declared as `port_type`.
    pub fn matches(&self, port_type: &PacketType) -> bool {
        match (&self.payload, port_type.id) {
            (Some(payload), Some(id)) => (**payload).type_id() == id,
            _ => true,
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.type_name)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
