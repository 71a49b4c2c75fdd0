use serde::{Deserialize, Serialize};
use std::ops::Add;

/// A block height, expressed as an absolute block count from genesis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHeight(u32);

impl BlockHeight {
    pub const fn new(height: u32) -> Self {
        Self(height)
    }

    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(result) => Some(BlockHeight(result)),
            None => None,
        }
    }
}

impl From<BlockHeight> for u32 {
    fn from(height: BlockHeight) -> Self {
        height.0
    }
}

impl From<u32> for BlockHeight {
    fn from(height: u32) -> Self {
        Self(height)
    }
}

impl Add<DurationInBlocks> for BlockHeight {
    type Output = BlockHeight;

    fn add(self, rhs: DurationInBlocks) -> Self::Output {
        BlockHeight(self.0 + rhs.0)
    }
}

/// The relative lock duration encoded as the redeem script's first
/// token, a minimally-encoded little-endian integer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationInBlocks(u32);

impl DurationInBlocks {
    pub const fn new(blocks: u32) -> Self {
        Self(blocks)
    }

    /// Decode a little-endian byte string, as pushed onto the stack by the
    /// redeem script, into a block count.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 4 {
            return None;
        }
        let mut buf = [0u8; 4];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self(u32::from_le_bytes(buf)))
    }

    /// Encode as a minimal little-endian byte string (no redundant
    /// trailing zero bytes), matching how Bitcoin script push data for
    /// small integers is normally produced.
    pub fn to_le_bytes(self) -> Vec<u8> {
        let mut bytes = self.0.to_le_bytes().to_vec();
        while bytes.len() > 1 && bytes.last() == Some(&0) {
            bytes.pop();
        }
        bytes
    }
}

impl From<DurationInBlocks> for u32 {
    fn from(duration: DurationInBlocks) -> Self {
        duration.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_round_trips_through_le_bytes() {
        for blocks in [1u32, 255, 256, 65_535, 65_536, 1_000_000] {
            let duration = DurationInBlocks::new(blocks);
            let decoded = DurationInBlocks::from_le_bytes(&duration.to_le_bytes()).unwrap();
            assert_eq!(decoded, duration);
        }
    }

    #[test]
    fn unlock_height_is_start_plus_duration() {
        let start = BlockHeight::new(700_000);
        let duration = DurationInBlocks::new(90);
        assert_eq!(u32::from(start + duration), 700_090);
    }
}
