//! Search configuration: the line-oriented config file and the parameters
//! derived from it.
//!
//! Config file format, one value per line:
//! range start (hex), range end (hex), then one public key per line
//! (compressed or uncompressed SEC1 hex). Invalid key lines are logged and
//! skipped.

use std::path::Path;

use anyhow::{anyhow, ensure, Context, Result};
use k256::elliptic_curve::bigint::{CheckedSub, Encoding};
use k256::{Scalar, U256};
use tracing::{info, warn};

use crate::crypto::{parse_hex_u256, parse_pubkey, reduce_u256, Point};

/// Immutable description of one search run.
pub struct SearchConfig {
    pub range_start: U256,
    pub range_end: U256,
    /// Target keys, solved one at a time in order.
    pub targets: Vec<Point>,
}

impl SearchConfig {
    pub fn new(range_start: U256, range_end: U256, targets: Vec<Point>) -> Result<Self> {
        ensure!(range_start <= range_end, "range start exceeds range end");
        ensure!(!targets.is_empty(), "no target keys to search");
        Ok(Self {
            range_start,
            range_end,
            targets,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        ensure!(
            lines.len() >= 3,
            "{}: expected range start, range end and at least one public key",
            path.display()
        );

        let range_start = parse_hex_u256(lines[0])
            .with_context(|| format!("{}: invalid range start", path.display()))?;
        let range_end = parse_hex_u256(lines[1])
            .with_context(|| format!("{}: invalid range end", path.display()))?;

        let mut targets = Vec::new();
        for (index, line) in lines[2..].iter().enumerate() {
            match parse_pubkey(line) {
                Ok(point) => targets.push(point),
                Err(e) => warn!(
                    "{}, error line {}: {} ({e})",
                    path.display(),
                    index + 3,
                    line
                ),
            }
        }

        let config = Self::new(range_start, range_end, targets)?;
        info!("Start: {:x}", config.range_start);
        info!("Stop : {:x}", config.range_end);
        info!("Keys : {}", config.targets.len());
        Ok(config)
    }
}

/// Parameters derived from the range and the walker population, fixed for
/// the whole run.
#[derive(Clone, Copy)]
pub struct SearchParams {
    pub range_start: Scalar,
    /// Half the range width (mod n); wild walks are shifted by this so both
    /// herds share the same midpoint.
    pub half_width: Scalar,
    /// Bit length of the range width.
    pub range_power: u32,
    pub jump_modulo: u64,
    pub dp_size: u32,
    pub dp_mask: u64,
}

impl SearchParams {
    /// Derive walk parameters. A negative `dp_override` selects the
    /// computed optimum; oversized values warn (short walks starve the
    /// collision table) and anything above 64 clamps.
    pub fn derive(config: &SearchConfig, total_walkers: u64, dp_override: i32) -> Result<Self> {
        let width = Option::<U256>::from(config.range_end.checked_sub(&config.range_start))
            .ok_or_else(|| anyhow!("range start exceeds range end"))?;

        let range_power = bit_len(&width);
        let jump_modulo = (u64::from(range_power) / 2 + 1).min(128);
        let half_width = reduce_u256(width.shr_vartime(1));

        let optimal = optimal_dp_size(range_power, total_walkers);
        let dp_size = if dp_override < 0 {
            optimal.min(64)
        } else {
            let requested = (dp_override as u32).min(64);
            if requested > optimal {
                warn!(
                    "DP size {requested} is above the optimum {optimal}; \
                     expect significant overhead (decrease workers or use -d)"
                );
            }
            requested
        };

        Ok(Self {
            range_start: reduce_u256(config.range_start),
            half_width,
            range_power,
            jump_modulo,
            dp_size,
            dp_mask: crate::math::dp_mask(dp_size),
        })
    }
}

/// Largest DP size that keeps expected walk length well below the expected
/// rendezvous time: `max(0, rangePower/2 - log2(walkers) - 2)`.
pub fn optimal_dp_size(range_power: u32, total_walkers: u64) -> u32 {
    let dp = (f64::from(range_power) / 2.0 - (total_walkers.max(1) as f64).log2() - 2.0) as i32;
    dp.max(0) as u32
}

fn bit_len(value: &U256) -> u32 {
    let bytes = value.to_be_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != 0 {
            return (32 - i as u32) * 8 - b.leading_zeros();
        }
    }
    0
}
