// SPDX-License-Identifier: Apache-2.0
//! Block recovery for one group ("Decoding / Recovery"), ported
//! from `RaidDpFile::recoverPieces`'s corrupted-block work-queue loop:
//! row-recovery first, then diagonal, re-queueing on no progress.

use std::collections::VecDeque;

use geodisk_core::error::{CoreError, CoreResult};

use crate::layout::RaidLayout;
use crate::xor::xor_into;

/// Attempts to reconstruct every block marked corrupted in `status`
/// (`false` = corrupted) using `blocks`' surviving members. On success,
/// every previously corrupted entry in `blocks` holds its reconstructed
/// contents and `status` is all `true`.
///
/// # Errors
///
/// [`CoreError::Internal`] if a full pass over the remaining corrupted
/// blocks reconstructs none of them — the group has more simultaneous
/// erasures than RAID-DP can recover ("termination
/// occurs when a full pass makes no progress").
pub fn recover_group(layout: &RaidLayout, blocks: &mut [Vec<u8>], status: &mut [bool]) -> CoreResult<()> {
    debug_assert_eq!(blocks.len(), layout.total_blocks());
    debug_assert_eq!(status.len(), layout.total_blocks());

    let mut queue: VecDeque<usize> = status
        .iter()
        .enumerate()
        .filter(|(_, &ok)| !ok)
        .map(|(i, _)| i)
        .collect();

    while !queue.is_empty() {
        let pending: Vec<usize> = queue.drain(..).collect();
        let mut progressed = false;

        for block_id in pending {
            if status[block_id] {
                // Fixed earlier this same pass via another block's stripe.
                continue;
            }
            if let Some(stripe) = layout.valid_horiz_stripe(block_id, status) {
                reconstruct(blocks, &stripe, block_id);
                status[block_id] = true;
                progressed = true;
            } else if let Some(stripe) = layout.valid_diag_stripe(block_id, status) {
                reconstruct(blocks, &stripe, block_id);
                status[block_id] = true;
                progressed = true;
            } else {
                queue.push_back(block_id);
            }
        }

        if !progressed {
            return Err(CoreError::Internal(format!(
                "RAID-DP group recovery stalled: {} block(s) unrecoverable: {:?}",
                queue.len(),
                queue
            )));
        }
    }

    Ok(())
}

/// Reconstructs `blocks[target]` as the XOR of every other member of
/// `stripe` — valid because every complete stripe (row or diagonal) XORs
/// to zero by construction.
fn reconstruct(blocks: &mut [Vec<u8>], stripe: &[usize], target: usize) {
    let width = blocks[target].len();
    let mut acc = vec![0u8; width];
    for &member in stripe {
        if member != target {
            xor_into(&mut acc, &blocks[member]);
        }
    }
    blocks[target] = acc;
}
