//! SCHC Ack-on-Error reassembly.
//!
//! [`ReassemblyMachine`] is the per-session protocol core: it owns the tile
//! storage and window bitmaps, verifies the RCS, and decides which ACKs to
//! emit under the configured [`AckMode`](crate::config::AckMode).
//! [`ReassemblyWorker`] runs a machine as a task fed by a fragment queue.

mod event;
mod fault;
mod machine;
mod state;
pub mod storage;
mod worker;

pub use event::{DropReason, ReassemblyEvent};
pub use fault::{FaultPolicy, NoFaults};
pub use machine::{Outcome, ReassemblyMachine};
pub use state::ReceiverState;
pub use storage::TileStore;
pub use worker::{ReassemblyWorker, WorkerExit};

#[cfg(test)]
mod tests;
