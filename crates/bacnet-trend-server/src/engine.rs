//! Protocol engine seam.
//!
//! Wire encoding and service handling live behind [`ProtocolEngine`]. The
//! loop gives the engine one slice of work per step and tells it about
//! present value changes so it can issue change notifications.

use bacnet_trend_core::PropertyRef;
use tracing::{debug, trace};

use crate::context::DeviceContext;
use crate::transport::{decode_address, Transport};

/// Largest BACnet/IP datagram.
pub const MAX_DATAGRAM: usize = 1497;

/// Protocol engine driven by the cooperative loop.
pub trait ProtocolEngine {
    /// Process pending network traffic. Property reads go through `ctx`.
    fn poll(&mut self, ctx: &mut DeviceContext);

    /// A present value changed.
    fn value_updated(&mut self, device_instance: u32, property: PropertyRef);
}

/// Engine that drains its transport without decoding.
///
/// Received datagrams are logged and counted; value changes are queued until
/// the next poll.
#[derive(Debug)]
pub struct PassiveEngine<T> {
    transport: T,
    buffer: Vec<u8>,
    received: u64,
    pending_updates: Vec<PropertyRef>,
}

impl<T: Transport> PassiveEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: vec![0; MAX_DATAGRAM],
            received: 0,
            pending_updates: Vec::new(),
        }
    }

    /// Datagrams received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Value changes not yet flushed by a poll.
    pub fn pending_updates(&self) -> &[PropertyRef] {
        &self.pending_updates
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> ProtocolEngine for PassiveEngine<T> {
    fn poll(&mut self, ctx: &mut DeviceContext) {
        while let Some((len, from)) = self.transport.try_receive(&mut self.buffer) {
            self.received += 1;
            let from = decode_address(&from)
                .map(|a| a.to_string())
                .unwrap_or_else(|| format!("{:?}", from));
            debug!(
                len,
                %from,
                device = ctx.device_instance(),
                "Datagram received"
            );
        }

        for property in self.pending_updates.drain(..) {
            trace!(object = %property.object, "Value change flushed");
        }
    }

    fn value_updated(&mut self, device_instance: u32, property: PropertyRef) {
        debug!(device = device_instance, object = %property.object, "Value updated");
        self.pending_updates.push(property);
    }
}
