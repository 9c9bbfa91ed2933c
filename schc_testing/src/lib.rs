//! Test utilities for driving a [`Fragmenter`](schc_gateway::Fragmenter)
//! without a network.
//!
//! [`SchcSender`] plays the device side of a transfer, [`RecordingLink`]
//! captures the ACKs the gateway sends back, and [`DropFragments`] injects
//! losses into selected sessions.
//!
//! ```rust
//! use schc_gateway::config::FragmentationProfile;
//! use schc_testing::SchcSender;
//!
//! let sender = SchcSender::new(FragmentationProfile::lorawan_uplink(), vec![1_u8; 25]);
//! assert_eq!(sender.regular_tiles(), 2);
//! assert_eq!(sender.fragments().len(), 3);
//! ```

pub mod envelope;
pub mod fault;
pub mod link;
pub mod sender;

pub use envelope::uplink_json;
pub use fault::DropFragments;
pub use link::{Downlinks, FailingLink, RecordingLink, SentDownlink, recording_link};
pub use sender::SchcSender;
