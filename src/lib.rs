#![doc(html_root_url = "https://docs.rs/schc_gateway/latest")]
//! Public API for the `schc_gateway` library.
//!
//! This crate implements the receiver side of SCHC (RFC 8724) fragmentation
//! in Ack-on-Error mode, profiled for LoRaWAN uplinks (RFC 9011): fragment
//! decoding, per-session reassembly with window bitmaps and RCS checks, ACK
//! generation, and a pooled fragmenter that routes device uplinks to
//! sessions.

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod fragmenter;
pub mod link;
pub mod metrics;
pub mod queue;
pub mod reassembly;
pub mod session;
pub mod ttn;

pub use codec::{AckFrame, Bitmap, CodecError, Fragment, FragmentKind, RuleId};
pub use config::{AckMode, Direction, FragmentationProfile};
pub use device::DeviceId;
pub use error::{GatewayError, Result};
pub use event::{EventSink, EventStream, GatewayEvent, event_channel};
pub use fragmenter::{Fragmenter, FragmenterBuilder};
pub use link::{Link, LinkError};
pub use metrics::{ACKS_SENT, ERRORS_TOTAL, FRAGMENTS_RECEIVED, SESSIONS_ACTIVE, SESSIONS_FINISHED};
pub use reassembly::{ReassemblyEvent, ReassemblyMachine, ReceiverState};
pub use session::Session;
