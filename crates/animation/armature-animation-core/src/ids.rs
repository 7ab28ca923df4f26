//! Dense handles for skeleton entities.

use serde::{Deserialize, Serialize};

/// Index of a bone in its skeleton's arena. Parents always have smaller ids than children.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BoneId(pub u32);

impl BoneId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a registered IK chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u32);

/// Monotonic allocator for ChainId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_chain: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_chain(&mut self) -> ChainId {
        let id = ChainId(self.next_chain);
        self.next_chain = self.next_chain.wrapping_add(1);
        id
    }
}
