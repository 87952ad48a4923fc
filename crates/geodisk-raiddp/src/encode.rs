// SPDX-License-Identifier: Apache-2.0
//! Row and diagonal parity computation for one in-memory group of blocks
//! ("Encoding"), ported from `RaidDpFile::computeParity`'s
//! row/diagonal loop structure.

use crate::layout::RaidLayout;
use crate::xor::xor_into;

/// Computes every row-parity and diagonal-parity block in `blocks` from
/// its already-filled data blocks.
///
/// `blocks` must have `layout.total_blocks()` entries, each
/// `layout.stripe_width` bytes; data-block entries (big indices that are
/// not a parity column) must already be populated. Parity block entries
/// are overwritten.
pub fn compute_parity(layout: &RaidLayout, blocks: &mut [Vec<u8>]) {
    debug_assert_eq!(blocks.len(), layout.total_blocks());

    // Row parity: XOR of the n data blocks in each row.
    for row in 0..layout.n {
        let parity_id = layout.parity_index_for(row);
        let row_base = row * layout.total_files();
        let mut acc = vec![0u8; layout.stripe_width];
        for col in 0..layout.n {
            xor_into(&mut acc, &blocks[row_base + col]);
        }
        blocks[parity_id] = acc;
    }

    // Diagonal parity: XOR of the n members of each non-omitted diagonal
    // (data and row-parity blocks only — the diagonal stripe never
    // contains another diagonal-parity block besides its own target).
    for diagonal in 0..layout.n {
        let dp_id = layout.d_parity_index_for(diagonal);
        let stripe = layout.diagonal_stripe(diagonal);
        let mut acc = vec![0u8; layout.stripe_width];
        for &member in &stripe {
            if member != dp_id {
                xor_into(&mut acc, &blocks[member]);
            }
        }
        blocks[dp_id] = acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_group(layout: &RaidLayout) -> Vec<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let mut blocks = vec![vec![0u8; layout.stripe_width]; layout.total_blocks()];
        for row in 0..layout.n {
            for col in 0..layout.n {
                let idx = row * layout.total_files() + col;
                rng.fill_bytes(&mut blocks[idx]);
            }
        }
        blocks
    }

    #[test]
    fn each_row_xors_to_zero_with_its_parity() {
        let layout = RaidLayout::new(4, 64);
        let mut blocks = random_group(&layout);
        compute_parity(&layout, &mut blocks);

        for row in 0..layout.n {
            let mut acc = vec![0u8; layout.stripe_width];
            for col in 0..layout.total_files() - 1 {
                xor_into(&mut acc, &blocks[row * layout.total_files() + col]);
            }
            assert!(acc.iter().all(|&b| b == 0), "row {row} did not XOR to zero");
        }
    }

    #[test]
    fn each_diagonal_xors_to_zero_with_its_parity() {
        let layout = RaidLayout::new(4, 64);
        let mut blocks = random_group(&layout);
        compute_parity(&layout, &mut blocks);

        for diagonal in 0..layout.n {
            let stripe = layout.diagonal_stripe(diagonal);
            let mut acc = vec![0u8; layout.stripe_width];
            for member in stripe {
                xor_into(&mut acc, &blocks[member]);
            }
            assert!(acc.iter().all(|&b| b == 0), "diagonal {diagonal} did not XOR to zero");
        }
    }
}
