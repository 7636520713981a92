//! Distinguished-point masks, x-coordinate fingerprints, batched field
//! inversion and bounded random scalars.

use anyhow::{ensure, Result};
use k256::{FieldElement, Scalar, U256};
use rand::RngCore;

use crate::crypto::reduce_u256;

/// Build the distinguished-point mask for a given DP size.
///
/// The mask has its top `dp_size` bits set, so a point is distinguished when
/// the top 64 bits of its x-coordinate have `dp_size` leading zeros.
/// `dp_size == 0` yields an all-zero mask (every point distinguished);
/// sizes above 64 clamp to 64.
pub fn dp_mask(dp_size: u32) -> u64 {
    if dp_size == 0 {
        return 0;
    }
    let dp_size = dp_size.min(64);
    if dp_size == 64 {
        u64::MAX
    } else {
        !((1u64 << (64 - dp_size)) - 1)
    }
}

/// Distinguished-point test on the top 64 bits of an x-coordinate.
#[inline]
pub fn is_distinguished(x_top64: u64, mask: u64) -> bool {
    (x_top64 & mask) == 0
}

/// 128-bit fingerprint of an x-coordinate: its two most significant 64-bit
/// limbs. `x_be` is the coordinate in big-endian bytes.
#[inline]
pub fn fingerprint(x_be: &[u8; 32]) -> u128 {
    let mut high = [0u8; 16];
    high.copy_from_slice(&x_be[..16]);
    u128::from_be_bytes(high)
}

/// Top 64 bits of a big-endian x-coordinate.
#[inline]
pub fn x_top64(x_be: &[u8; 32]) -> u64 {
    u64::from_be_bytes(x_be[..8].try_into().expect("8-byte slice"))
}

/// Low 64 bits of a big-endian x-coordinate.
#[inline]
pub fn x_low64(x_be: &[u8; 32]) -> u64 {
    u64::from_be_bytes(x_be[24..].try_into().expect("8-byte slice"))
}

/// Batch-invert `vals` into `out` with Montgomery's trick: one field
/// inversion plus 3(n-1) multiplications. Every input must be nonzero;
/// callers sanitize zero lanes before invoking.
pub fn batch_invert(vals: &[FieldElement], out: &mut [FieldElement]) -> Result<()> {
    let n = vals.len();
    ensure!(out.len() == n, "inverse buffer length mismatch");
    if n == 0 {
        return Ok(());
    }

    // Prefix products live in the output buffer until the backward pass.
    out[0] = vals[0];
    for i in 1..n {
        out[i] = (out[i - 1] * vals[i]).normalize_weak();
    }

    let mut inv_all = Option::<FieldElement>::from(out[n - 1].invert())
        .ok_or_else(|| anyhow::anyhow!("zero element in batch inversion"))?;

    for i in (1..n).rev() {
        out[i] = (inv_all * out[i - 1]).normalize();
        inv_all = (inv_all * vals[i]).normalize_weak();
    }
    out[0] = inv_all.normalize();

    Ok(())
}

/// Draw a scalar uniformly from `[0, 2^bits)`.
pub fn random_scalar_below_pow2(rng: &mut dyn RngCore, bits: u32) -> Scalar {
    if bits == 0 {
        return Scalar::ZERO;
    }
    let bits = bits.min(256);
    let mut bytes = [0u8; 32];
    let nbytes = bits.div_ceil(8) as usize;
    rng.fill_bytes(&mut bytes[32 - nbytes..]);

    let rem = bits % 8;
    if rem != 0 {
        bytes[32 - nbytes] &= (1u8 << rem) - 1;
    }

    reduce_u256(U256::from_be_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fe(v: u64) -> FieldElement {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&v.to_be_bytes());
        Option::<FieldElement>::from(FieldElement::from_bytes(&bytes.into())).unwrap()
    }

    #[test]
    fn dp_mask_zero_matches_everything() {
        assert_eq!(dp_mask(0), 0);
        for word in [0u64, 1, u64::MAX, 0x8000_0000_0000_0000] {
            assert!(is_distinguished(word, dp_mask(0)));
        }
    }

    #[test]
    fn dp_mask_checks_leading_zero_bits() {
        let mask = dp_mask(8);
        assert_eq!(mask, 0xff00_0000_0000_0000);
        assert!(is_distinguished(0x00ff_ffff_ffff_ffff, mask));
        assert!(!is_distinguished(0x0100_0000_0000_0000, mask));
    }

    #[test]
    fn dp_mask_clamps_to_64() {
        assert_eq!(dp_mask(64), u64::MAX);
        assert_eq!(dp_mask(200), u64::MAX);
        assert!(is_distinguished(0, dp_mask(200)));
        assert!(!is_distinguished(1, dp_mask(200)));
    }

    #[test]
    fn fingerprint_uses_high_limbs_only() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0] = 0xab;
        b[0] = 0xab;
        a[31] = 1;
        b[31] = 2;
        assert_eq!(fingerprint(&a), fingerprint(&b));
        b[15] = 1;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn limb_extraction() {
        let mut x = [0u8; 32];
        x[..8].copy_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
        x[24..].copy_from_slice(&0x99aa_bbcc_ddee_ff00u64.to_be_bytes());
        assert_eq!(x_top64(&x), 0x1122_3344_5566_7788);
        assert_eq!(x_low64(&x), 0x99aa_bbcc_ddee_ff00);
    }

    #[test]
    fn batch_invert_times_original_is_one() {
        let vals: Vec<FieldElement> = (1..=97u64).map(fe).collect();
        let mut inv = vec![FieldElement::ZERO; vals.len()];
        batch_invert(&vals, &mut inv).unwrap();
        for (v, i) in vals.iter().zip(&inv) {
            let product = (*v * *i).normalize();
            assert_eq!(product.to_bytes(), FieldElement::ONE.to_bytes());
        }
    }

    #[test]
    fn batch_invert_single_element() {
        let vals = [fe(7)];
        let mut inv = [FieldElement::ZERO];
        batch_invert(&vals, &mut inv).unwrap();
        let product = (vals[0] * inv[0]).normalize();
        assert_eq!(product.to_bytes(), FieldElement::ONE.to_bytes());
    }

    #[test]
    fn batch_invert_rejects_zero() {
        let vals = [fe(3), FieldElement::ZERO, fe(5)];
        let mut inv = [FieldElement::ZERO; 3];
        assert!(batch_invert(&vals, &mut inv).is_err());
    }

    #[test]
    fn random_scalar_respects_bit_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for bits in [1u32, 7, 8, 15, 16, 20, 33] {
            for _ in 0..50 {
                let s = random_scalar_below_pow2(&mut rng, bits);
                let be: [u8; 32] = s.to_bytes().into();
                let bound_byte = 32 - bits.div_ceil(8) as usize;
                assert!(
                    be[..bound_byte].iter().all(|&b| b == 0),
                    "scalar exceeds 2^{bits}"
                );
                if bits % 8 != 0 {
                    assert!(be[bound_byte] < (1u8 << (bits % 8)));
                }
            }
        }
        assert_eq!(random_scalar_below_pow2(&mut rng, 0), Scalar::ZERO);
    }
}
