//! Stateless SCHC fragment codec.
//!
//! Classifies and decodes incoming fragments, encodes ACK frames and computes
//! the reassembly check sequence. Nothing here holds session state; the
//! [`reassembly`](crate::reassembly) module drives these routines.

mod ack;
mod bitmap;
mod bits;
mod checksum;
pub mod error;
mod kind;
mod packet;
mod rule;

pub use ack::{AckFrame, encode_ack, encode_compound_ack};
pub use bitmap::Bitmap;
pub(crate) use bits::BitWriter;
pub use checksum::{checksum, checksum_parts};
pub use error::CodecError;
pub use kind::{FragmentKind, classify};
pub use packet::{Fragment, RCS_LEN, decode};
pub use rule::RuleId;
