//! secp256k1 oracle boundary: parsing, serialization and key verification.
//!
//! All curve and scalar arithmetic comes from `k256`; this module keeps the
//! conversions between hex, SEC1 encodings and the walk engine's affine
//! coordinates in one place.

use anyhow::{Context, Result};
use k256::elliptic_curve::ops::{MulByGenerator, Reduce};
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint, FieldElement, ProjectivePoint, Scalar, U256};

/// Elliptic curve point
pub type Point = ProjectivePoint;

/// Parse a secp256k1 public key from hex (compressed or uncompressed SEC1).
pub fn parse_pubkey(hex_str: &str) -> Result<Point> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).context("Invalid hex in pubkey")?;
    let encoded = EncodedPoint::from_bytes(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid encoded point: {e}"))?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| anyhow::anyhow!("public key is not a point on the curve"))?;
    Ok(ProjectivePoint::from(affine))
}

/// Parse a big-endian hex string (with or without `0x`) into a 256-bit integer.
pub fn parse_hex_u256(hex_str: &str) -> Result<U256> {
    let hex_clean = hex_str.trim_start_matches("0x");
    anyhow::ensure!(hex_clean.len() <= 64, "hex value wider than 256 bits");
    let padded = format!("{:0>64}", hex_clean);

    let bytes = hex::decode(&padded).context("Invalid hex")?;

    let mut be = [0u8; 32];
    be.copy_from_slice(&bytes);
    Ok(U256::from_be_slice(&be))
}

/// Reduce a 256-bit integer into the scalar field (mod the group order).
pub fn reduce_u256(value: U256) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(value)
}

/// Compressed SEC1 hex of a public key.
pub fn pubkey_to_hex(point: &Point) -> String {
    let encoded = point.to_affine().to_encoded_point(true);
    hex::encode(encoded.as_bytes())
}

/// Private key hex with leading zeros trimmed ("0" for the zero scalar).
pub fn scalar_to_hex(scalar: &Scalar) -> String {
    let full = hex::encode(scalar.to_bytes());
    let trimmed = full.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Affine coordinates of a point, or `None` for the identity.
pub fn point_coords(point: &Point) -> Option<(FieldElement, FieldElement)> {
    let encoded = point.to_affine().to_encoded_point(false);
    let (x_bytes, y_bytes) = match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    let x = Option::<FieldElement>::from(FieldElement::from_bytes(x_bytes))?;
    let y = Option::<FieldElement>::from(FieldElement::from_bytes(y_bytes))?;
    Some((x, y))
}

/// Rebuild a point from affine coordinates. Fails off-curve.
pub fn coords_to_point(x: &FieldElement, y: &FieldElement) -> Result<Point> {
    let encoded = EncodedPoint::from_affine_coordinates(&x.to_bytes(), &y.to_bytes(), false);
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| anyhow::anyhow!("coordinates are not on the curve"))?;
    Ok(ProjectivePoint::from(affine))
}

/// Verify that a private key produces the expected public key.
pub fn verify_key(private_key: &Scalar, public_key: &Point) -> bool {
    ProjectivePoint::mul_by_generator(private_key) == *public_key
}
