use alloy_primitives::B256;

/// `GetBlockHeaders` by number.
///
/// With `reverse` set the peer walks towards genesis starting at `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlockHeaders {
    pub start: u64,
    pub limit: u64,
    pub skip: u64,
    pub reverse: bool,
}

impl GetBlockHeaders {
    /// Numbers the peer is expected to answer with, in response order.
    pub fn expected_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        let step = self.skip + 1;
        (0..self.limit).map_while(move |i| {
            let offset = i.checked_mul(step)?;
            if self.reverse {
                self.start.checked_sub(offset)
            } else {
                self.start.checked_add(offset)
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlockBodies {
    pub hashes: Vec<B256>,
}
