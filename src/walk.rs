//! Kangaroo walk engine: jump table, kangaroo records and the batched herd
//! step.
//!
//! A herd advances all of its kangaroos by one pseudo-random jump per step.
//! The jump index depends only on the low 64 bits of the current
//! x-coordinate, so two walks that ever meet stay merged — the rendezvous
//! the whole algorithm is built on. The chord additions of a step share a
//! single field inversion through Montgomery's trick.

use anyhow::{anyhow, Result};
use k256::elliptic_curve::group::Group;
use k256::elliptic_curve::ops::MulByGenerator;
use k256::{FieldElement, ProjectivePoint, Scalar};
use rand::rngs::StdRng;
use rand::RngCore;
use tracing::warn;

use crate::crypto::{point_coords, Point};
use crate::math::{self, batch_invert, random_scalar_below_pow2};

/// Kangaroos per CPU herd; one batch inversion serves the whole herd.
pub const HERD_SIZE: usize = 128;

/// Jump table entries. Oversized so the jump modulo can vary up to 128.
pub const NB_JUMP: usize = 129;

/// Tame walks start from the range base, wild walks from the target key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KangarooType {
    Tame,
    Wild,
}

impl KangarooType {
    /// Herd position parity decides the type: even lanes tame, odd wild.
    pub fn from_index(index: u64) -> Self {
        if index % 2 == 0 {
            KangarooType::Tame
        } else {
            KangarooType::Wild
        }
    }
}

#[derive(Clone, Copy)]
struct WalkPoint {
    x: FieldElement,
    y: FieldElement,
}

/// Precomputed jumps: `distances[i] = 2^i` (mod n), `points[i] = 2^i * G`.
/// Built once, immutable, shared across workers by reference.
pub struct JumpTable {
    points: Vec<WalkPoint>,
    distances: Vec<Scalar>,
}

impl JumpTable {
    pub fn build() -> Result<Self> {
        let mut points = Vec::with_capacity(NB_JUMP);
        let mut distances = Vec::with_capacity(NB_JUMP);

        let mut distance = Scalar::ONE;
        let mut point = ProjectivePoint::GENERATOR;
        for i in 0..NB_JUMP {
            if i > 0 {
                distance = distance + distance;
                point = point.double();
            }
            let (x, y) = point_coords(&point)
                .ok_or_else(|| anyhow!("jump point {i} degenerated to the identity"))?;
            points.push(WalkPoint { x, y });
            distances.push(distance);
        }

        Ok(Self { points, distances })
    }
}

/// Everything a fresh kangaroo needs: the per-key search geometry.
#[derive(Clone, Copy)]
pub struct SpawnParams {
    pub range_start: Scalar,
    pub half_width: Scalar,
    pub range_power: u32,
    pub target: Point,
}

/// One walker: affine position, accumulated distance and type.
///
/// Invariant: for a tame kangaroo `pos = (range_start + distance) * G`, for
/// a wild one `pos = target + distance * G` (the wild distance is stored
/// already shifted by `-half_width`, mod n).
#[derive(Clone)]
pub struct Kangaroo {
    pos: WalkPoint,
    x_be: [u8; 32],
    distance: Scalar,
    ktype: KangarooType,
}

impl Kangaroo {
    /// Create a kangaroo with a fresh random distance in `[0, 2^range_power)`.
    ///
    /// A wild draw can hit the group identity when the distance cancels the
    /// target key exactly; redraw until the position is affine.
    pub fn spawn(ktype: KangarooType, params: &SpawnParams, rng: &mut dyn RngCore) -> Self {
        loop {
            let mut distance = random_scalar_below_pow2(rng, params.range_power);
            let point = match ktype {
                KangarooType::Tame => {
                    ProjectivePoint::mul_by_generator(&(params.range_start + distance))
                }
                KangarooType::Wild => {
                    distance = distance - params.half_width;
                    params.target + ProjectivePoint::mul_by_generator(&distance)
                }
            };
            if let Some((x, y)) = point_coords(&point) {
                let x_be: [u8; 32] = x.to_bytes().into();
                return Self {
                    pos: WalkPoint { x, y },
                    x_be,
                    distance,
                    ktype,
                };
            }
        }
    }

    pub fn distance(&self) -> Scalar {
        self.distance
    }

    pub fn ktype(&self) -> KangarooType {
        self.ktype
    }

    pub fn fingerprint(&self) -> u128 {
        math::fingerprint(&self.x_be)
    }

    pub fn x_top64(&self) -> u64 {
        math::x_top64(&self.x_be)
    }

    /// Position x in little-endian limbs, for the accelerator wire format.
    pub fn x_le(&self) -> [u8; 32] {
        let mut le = self.x_be;
        le.reverse();
        le
    }

    /// Position y in little-endian limbs.
    pub fn y_le(&self) -> [u8; 32] {
        let mut le: [u8; 32] = self.pos.y.to_bytes().into();
        le.reverse();
        le
    }

    /// Distance in little-endian limbs.
    pub fn d_le(&self) -> [u8; 32] {
        let mut le: [u8; 32] = self.distance.to_bytes().into();
        le.reverse();
        le
    }

    /// Current position as a curve point.
    pub fn position(&self) -> Result<Point> {
        crate::crypto::coords_to_point(&self.pos.x, &self.pos.y)
    }
}

/// A co-advancing batch of kangaroos owned by one worker.
pub struct Herd {
    kangaroos: Vec<Kangaroo>,
    dx: Vec<FieldElement>,
    dx_inv: Vec<FieldElement>,
    spawn: SpawnParams,
    rng: StdRng,
}

impl Herd {
    /// Spawn a herd of `size` kangaroos, alternating tame and wild.
    pub fn new(size: usize, spawn: SpawnParams, mut rng: StdRng) -> Self {
        let kangaroos = (0..size)
            .map(|g| Kangaroo::spawn(KangarooType::from_index(g as u64), &spawn, &mut rng))
            .collect();
        Self {
            kangaroos,
            dx: vec![FieldElement::ZERO; size],
            dx_inv: vec![FieldElement::ZERO; size],
            spawn,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.kangaroos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kangaroos.is_empty()
    }

    pub fn kangaroo(&self, g: usize) -> &Kangaroo {
        &self.kangaroos[g]
    }

    /// Duplicate lane `src` into lane `dst`, merging the two walks.
    #[cfg(test)]
    pub(crate) fn clone_lane(&mut self, src: usize, dst: usize) {
        self.kangaroos[dst] = self.kangaroos[src].clone();
    }

    /// Replace lane `g` with a fresh kangaroo of the same type.
    pub fn respawn(&mut self, g: usize) {
        let ktype = self.kangaroos[g].ktype;
        self.kangaroos[g] = Kangaroo::spawn(ktype, &self.spawn, &mut self.rng);
    }

    /// Advance every kangaroo by one jump.
    ///
    /// A lane whose chord denominator is zero (the walk landed on the x of
    /// its own jump point) would poison the shared inversion; such lanes get
    /// a unit denominator for the batch and are respawned right after.
    pub fn step(&mut self, jumps: &JumpTable, jump_modulo: u64) -> Result<()> {
        let mut poisoned: Vec<usize> = Vec::new();

        for g in 0..self.kangaroos.len() {
            let k = &self.kangaroos[g];
            let j = (math::x_low64(&k.x_be) % jump_modulo) as usize;
            let dx = (k.pos.x - jumps.points[j].x).normalize();
            if bool::from(dx.normalizes_to_zero()) {
                self.dx[g] = FieldElement::ONE;
                poisoned.push(g);
            } else {
                self.dx[g] = dx;
            }
        }

        batch_invert(&self.dx, &mut self.dx_inv)?;

        for g in 0..self.kangaroos.len() {
            let k = &mut self.kangaroos[g];
            let j = (math::x_low64(&k.x_be) % jump_modulo) as usize;
            let jp = &jumps.points[j];

            let dy = (k.pos.y - jp.y).normalize_weak();
            let s = (dy * self.dx_inv[g]).normalize_weak();
            let rx = (s.square() - jp.x - k.pos.x).normalize();
            let ry = (s * (k.pos.x - rx).normalize_weak() - k.pos.y).normalize();

            k.pos = WalkPoint { x: rx, y: ry };
            k.x_be = rx.to_bytes().into();
            k.distance += jumps.distances[j];
        }

        for g in poisoned {
            warn!(lane = g, "zero chord denominator, respawning kangaroo");
            self.respawn(g);
        }

        Ok(())
    }
}
