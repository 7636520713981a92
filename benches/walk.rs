//! Hot-loop benchmarks: one batched herd step and the shared inversion.

use criterion::{criterion_group, criterion_main, Criterion};
use k256::elliptic_curve::ops::MulByGenerator;
use k256::{FieldElement, ProjectivePoint, U256};
use kangaroo_lambda::crypto::reduce_u256;
use kangaroo_lambda::math::batch_invert;
use kangaroo_lambda::{Herd, JumpTable, SpawnParams, HERD_SIZE};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn fe(v: u64) -> FieldElement {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&v.to_be_bytes());
    Option::<FieldElement>::from(FieldElement::from_bytes(&bytes.into())).unwrap()
}

fn bench_herd_step(c: &mut Criterion) {
    let jumps = JumpTable::build().unwrap();
    let spawn = SpawnParams {
        range_start: reduce_u256(U256::from(1u64 << 39)),
        half_width: reduce_u256(U256::from(1u64 << 39)),
        range_power: 40,
        target: ProjectivePoint::mul_by_generator(&reduce_u256(U256::from(0xdeadbeefu64))),
    };
    let mut herd = Herd::new(HERD_SIZE, spawn, StdRng::seed_from_u64(1));

    c.bench_function("herd_step_128", |b| {
        b.iter(|| herd.step(&jumps, 21).unwrap())
    });
}

fn bench_batch_invert(c: &mut Criterion) {
    let vals: Vec<FieldElement> = (1..=HERD_SIZE as u64).map(fe).collect();
    let mut out = vec![FieldElement::ZERO; vals.len()];

    c.bench_function("batch_invert_128", |b| {
        b.iter(|| batch_invert(&vals, &mut out).unwrap())
    });
}

criterion_group!(benches, bench_herd_step, bench_batch_invert);
criterion_main!(benches);
