//! Loss injection for reassembly sessions.

use std::collections::HashSet;

use schc_gateway::{
    codec::Fragment,
    reassembly::{FaultPolicy, ReceiverState},
};

/// Drops the fragments at the given positions in arrival order (zero based).
#[derive(Clone, Debug, Default)]
pub struct DropFragments {
    positions: HashSet<usize>,
    seen: usize,
}

impl DropFragments {
    #[must_use]
    pub fn new(positions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            positions: positions.into_iter().collect(),
            seen: 0,
        }
    }
}

impl FaultPolicy for DropFragments {
    fn should_drop(&mut self, _fragment: &Fragment, _state: ReceiverState) -> bool {
        let position = self.seen;
        self.seen += 1;
        self.positions.contains(&position)
    }
}
