//! # bacnet-trend-server
//!
//! The device side of a BACnet trend logging server.
//!
//! A protocol engine (wire encoding, services, transport) drives this crate
//! through two seams:
//! - [`PropertyProvider`] answers typed property reads
//! - [`TrendLogAccess`](bacnet_trend_core::TrendLogAccess) fills and serves trend logs
//!
//! [`TrendServer`] runs the single-threaded cooperative loop: engine poll,
//! input sampling, trend polling, operator input.

pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod operator;
pub mod poller;
pub mod sampling;
pub mod server;
pub mod transport;

pub use bacnet_trend_core::{DeviceConfig, ObjectId, ObjectType, PropertyIdentifier, PropertyRef};
pub use context::{BackupsLoaded, DeviceContext};
pub use dispatcher::{Dispatch, PropertyProvider, PropertyRequest};
pub use engine::{PassiveEngine, ProtocolEngine};
pub use operator::OperatorCommand;
pub use server::{ServerError, StepOutcome, TrendServer};
pub use transport::{Transport, UdpTransport};

/// Application software version reported by the device object.
pub const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");
