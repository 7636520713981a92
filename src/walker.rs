//! Contract for an external batch walker (a GPU-class accelerator).
//!
//! The core never implements a device; it only drives one. A walker owns a
//! fixed population of kangaroos, advances all of them by `NB_RUN` jumps per
//! launch, and returns every distinguished point encountered. Coordinates
//! and distances cross the boundary as 256-bit little-endian limbs.

use anyhow::{ensure, Result};
use bytemuck::{Pod, Zeroable};
use k256::{Scalar, U256};

use crate::crypto::reduce_u256;
use crate::walk::KangarooType;

/// Batched steps executed per `launch` call, per kangaroo.
pub const NB_RUN: u32 = 16;

/// Wire size of one reported distinguished point.
pub const ITEM_SIZE: usize = 72;

/// One distinguished point reported by a walker:
/// x-coordinate (32) ‖ distance (32) ‖ kangaroo index (8), little-endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DpItem {
    pub x: [u8; 32],
    pub d: [u8; 32],
    pub k_idx: u64,
}

const _: () = assert!(std::mem::size_of::<DpItem>() == ITEM_SIZE);

impl DpItem {
    /// Table fingerprint: the two most significant 64-bit limbs of x.
    pub fn fingerprint(&self) -> u128 {
        u128::from_le_bytes(self.x[16..].try_into().expect("16-byte slice"))
    }

    /// Accumulated distance as a scalar.
    pub fn distance(&self) -> Scalar {
        let mut be = self.d;
        be.reverse();
        reduce_u256(U256::from_be_slice(&be))
    }

    /// Walker index parity decides the type, as it does for CPU herds.
    pub fn ktype(&self) -> KangarooType {
        KangarooType::from_index(self.k_idx)
    }
}

/// Outcome of one `launch` call.
pub struct LaunchReport {
    pub items: Vec<DpItem>,
    /// True when the device DP buffer overflowed; the oldest `max_found`
    /// items were retained and the rest dropped.
    pub lost: bool,
}

/// The interface an accelerated walker must satisfy.
///
/// Buffers are little-endian limbs throughout. A walker's kangaroo at index
/// `k` is tame when `k` is even and wild when odd; respawns via
/// `set_kangaroo` must preserve that parity.
pub trait BatchWalker: Send {
    /// Total kangaroos this walker advances per step.
    fn num_kangaroos(&self) -> u64;

    /// Install the distinguished-point mask and jump modulo before the
    /// first launch.
    fn set_params(&mut self, dp_mask: u64, jump_modulo: u64) -> Result<()>;

    /// Upload the full kangaroo population (positions and distances).
    fn set_kangaroos(
        &mut self,
        px: &[[u8; 32]],
        py: &[[u8; 32]],
        d: &[[u8; 32]],
    ) -> Result<()>;

    /// Replace a single kangaroo, used when a walk is respawned.
    fn set_kangaroo(
        &mut self,
        k_idx: u64,
        px: &[u8; 32],
        py: &[u8; 32],
        d: &[u8; 32],
    ) -> Result<()>;

    /// Run `NB_RUN` batched steps across all kangaroos and collect every
    /// distinguished point they produced.
    fn launch(&mut self) -> Result<LaunchReport>;
}

/// Decode a raw device buffer of 72-byte items.
pub fn decode_items(bytes: &[u8]) -> Result<Vec<DpItem>> {
    ensure!(
        bytes.len() % ITEM_SIZE == 0,
        "walker item buffer of {} bytes is not a multiple of {ITEM_SIZE}",
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(ITEM_SIZE)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}
