//! Solver orchestration: per-key lifecycle, CPU workers, accelerator
//! drivers, and the collision resolver.
//!
//! All workers of one key share the DP table and an `end_of_search` flag.
//! The flag is the sole cancellation signal; every worker checks it at the
//! top of each batch step and the first verified rendezvous claims it.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use indicatif::ProgressBar;
use k256::Scalar;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::cli;
use crate::config::{SearchConfig, SearchParams};
use crate::crypto::{verify_key, Point};
use crate::dp_table::{AddOutcome, DpTable};
use crate::math::is_distinguished;
use crate::walk::{Herd, JumpTable, Kangaroo, KangarooType, SpawnParams, HERD_SIZE};
use crate::walker::{BatchWalker, NB_RUN};

/// Derive the private key from a tame/wild rendezvous.
///
/// The candidate is `range_start + d_tame - d_wild` (mod n). Because the
/// DP table fingerprints only the x-coordinate, a match can also stem from
/// the negated point, so the symmetric key `n - k` is tried before giving
/// up. Returns a key verified against the target, or `None` for a spurious
/// collision.
pub fn resolve_collision(
    range_start: &Scalar,
    target: &Point,
    tame_distance: &Scalar,
    wild_distance: &Scalar,
) -> Option<Scalar> {
    let candidate = *range_start + *tame_distance - *wild_distance;
    if verify_key(&candidate, target) {
        return Some(candidate);
    }

    let symmetric = -candidate;
    if verify_key(&symmetric, target) {
        return Some(symmetric);
    }

    None
}

/// Per-worker operation counter. Cache-line aligned so the progress loop
/// reads it without bouncing the workers' lines.
#[repr(align(64))]
struct OpCounter(AtomicU64);

impl OpCounter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// State shared by every worker solving one key.
struct Shared<'a> {
    table: &'a DpTable,
    params: &'a SearchParams,
    spawn: SpawnParams,
    end_of_search: AtomicBool,
    solution: Mutex<Option<Scalar>>,
    counters: Vec<OpCounter>,
    same_herd_collisions: AtomicU64,
    live_workers: AtomicUsize,
}

impl<'a> Shared<'a> {
    fn new(table: &'a DpTable, params: &'a SearchParams, target: Point, workers: usize) -> Self {
        Self {
            table,
            params,
            spawn: SpawnParams {
                range_start: params.range_start,
                half_width: params.half_width,
                range_power: params.range_power,
                target,
            },
            end_of_search: AtomicBool::new(false),
            solution: Mutex::new(None),
            counters: (0..workers).map(|_| OpCounter::new()).collect(),
            same_herd_collisions: AtomicU64::new(0),
            live_workers: AtomicUsize::new(workers),
        }
    }

    fn total_ops(&self) -> u64 {
        self.counters.iter().map(OpCounter::get).sum()
    }

    fn finished(&self) -> bool {
        self.end_of_search.load(Ordering::Acquire)
    }
}

/// What the reporting worker must do with its kangaroo after a DP report.
enum DpAction {
    Keep,
    Respawn,
}

/// Present one distinguished point to the table and act on the outcome.
fn process_dp(
    shared: &Shared,
    fingerprint: u128,
    distance: Scalar,
    ktype: KangarooType,
) -> DpAction {
    if shared.finished() {
        return DpAction::Keep;
    }

    match shared.table.add(fingerprint, distance, ktype) {
        AddOutcome::Stored => DpAction::Keep,
        AddOutcome::SameHerd => {
            // The two walks are merged for good; only fresh randomness helps.
            shared.same_herd_collisions.fetch_add(1, Ordering::Relaxed);
            DpAction::Respawn
        }
        AddOutcome::CrossHerd {
            distance: stored_distance,
            ..
        } => {
            let (tame, wild) = match ktype {
                KangarooType::Tame => (distance, stored_distance),
                KangarooType::Wild => (stored_distance, distance),
            };
            match resolve_collision(
                &shared.params.range_start,
                &shared.spawn.target,
                &tame,
                &wild,
            ) {
                Some(key) => {
                    if !shared.end_of_search.swap(true, Ordering::AcqRel) {
                        *shared.solution.lock().expect("solution lock poisoned") = Some(key);
                    }
                    DpAction::Keep
                }
                None => {
                    warn!("Unexpected wrong collision, resetting kangaroo");
                    DpAction::Respawn
                }
            }
        }
    }
}

fn run_cpu_worker(shared: &Shared, jumps: &JumpTable, worker_id: usize) -> Result<()> {
    let mut herd = Herd::new(HERD_SIZE, shared.spawn, StdRng::from_entropy());

    while !shared.finished() {
        herd.step(jumps, shared.params.jump_modulo)?;

        for g in 0..herd.len() {
            let (top, fingerprint, distance, ktype) = {
                let k = herd.kangaroo(g);
                (k.x_top64(), k.fingerprint(), k.distance(), k.ktype())
            };
            if !is_distinguished(top, shared.params.dp_mask) {
                continue;
            }
            if let DpAction::Respawn = process_dp(shared, fingerprint, distance, ktype) {
                herd.respawn(g);
            }
        }

        shared.counters[worker_id].add(HERD_SIZE as u64);
    }

    Ok(())
}

fn run_walker_driver(
    shared: &Shared,
    walker: &mut dyn BatchWalker,
    worker_id: usize,
) -> Result<()> {
    let population = walker.num_kangaroos();
    let mut rng = StdRng::from_entropy();
    let base_seed = rng.next_u64();
    let spawn = shared.spawn;

    let kangaroos: Vec<Kangaroo> = (0..population)
        .into_par_iter()
        .map(|i| {
            let mut lane_rng =
                StdRng::seed_from_u64(base_seed ^ i.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            Kangaroo::spawn(KangarooType::from_index(i), &spawn, &mut lane_rng)
        })
        .collect();

    let px: Vec<[u8; 32]> = kangaroos.iter().map(Kangaroo::x_le).collect();
    let py: Vec<[u8; 32]> = kangaroos.iter().map(Kangaroo::y_le).collect();
    let d: Vec<[u8; 32]> = kangaroos.iter().map(Kangaroo::d_le).collect();
    drop(kangaroos);

    walker.set_params(shared.params.dp_mask, shared.params.jump_modulo)?;
    walker.set_kangaroos(&px, &py, &d)?;

    let mut overflow_reported = false;
    while !shared.finished() {
        let report = walker.launch()?;
        shared.counters[worker_id].add(population * u64::from(NB_RUN));

        if report.lost && !overflow_reported {
            warn!("walker DP buffer overflowed, dropping surplus points");
            overflow_reported = true;
        }

        for item in &report.items {
            if shared.finished() {
                break;
            }
            let ktype = item.ktype();
            if let DpAction::Respawn =
                process_dp(shared, item.fingerprint(), item.distance(), ktype)
            {
                let fresh = Kangaroo::spawn(ktype, &spawn, &mut rng);
                walker.set_kangaroo(item.k_idx, &fresh.x_le(), &fresh.y_le(), &fresh.d_le())?;
            }
        }
    }

    Ok(())
}

/// A solved target key.
pub struct SolvedKey {
    pub key_index: usize,
    pub target: Point,
    pub private_key: Scalar,
    pub total_ops: u64,
    pub time_seconds: f64,
}

/// Orchestrates the whole run: parameter calibration, worker spawning and
/// the per-key search lifecycle.
pub struct KangarooSolver {
    config: SearchConfig,
    dp_override: i32,
    max_ops: u64,
    quiet: bool,
}

impl KangarooSolver {
    /// `dp_override < 0` selects the computed optimal DP size;
    /// `max_ops == 0` means unlimited.
    pub fn new(config: SearchConfig, dp_override: i32, max_ops: u64, quiet: bool) -> Self {
        Self {
            config,
            dp_override,
            max_ops,
            quiet,
        }
    }

    pub fn num_targets(&self) -> usize {
        self.config.targets.len()
    }

    /// Solve every configured key in order. Returns the solved keys; a key
    /// abandoned at the operation cap is simply absent from the result.
    pub fn run(
        &self,
        num_workers: usize,
        mut walkers: Vec<Box<dyn BatchWalker>>,
    ) -> Result<Vec<SolvedKey>> {
        let walker_population: u64 = walkers.iter().map(|w| w.num_kangaroos()).sum();
        let total_walkers = num_workers as u64 * HERD_SIZE as u64 + walker_population;
        ensure!(total_walkers > 0, "no walkers configured");

        let params = SearchParams::derive(&self.config, total_walkers, self.dp_override)?;

        info!("Number of CPU workers: {num_workers}");
        info!("Range width: 2^{}", params.range_power);
        info!(
            "Number of random walks: 2^{:.2}",
            (total_walkers as f64).log2()
        );
        info!("DP size: {} [0x{:016x}]", params.dp_size, params.dp_mask);

        let jumps = JumpTable::build()?;
        let table = DpTable::new();
        let run_start = Instant::now();
        let mut solved = Vec::new();

        for (key_index, target) in self.config.targets.iter().enumerate() {
            table.reset();
            let shared = Shared::new(&table, &params, *target, num_workers + walkers.len());
            let key_start = Instant::now();

            thread::scope(|scope| {
                for worker_id in 0..num_workers {
                    let shared = &shared;
                    let jumps = &jumps;
                    scope.spawn(move || {
                        if let Err(e) = run_cpu_worker(shared, jumps, worker_id) {
                            error!("CPU worker {worker_id} failed: {e:#}");
                        }
                        shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    });
                }

                for (walker_id, walker) in walkers.iter_mut().enumerate() {
                    let shared = &shared;
                    let worker_id = num_workers + walker_id;
                    scope.spawn(move || {
                        if let Err(e) = run_walker_driver(shared, walker.as_mut(), worker_id) {
                            error!("walker {walker_id} failed: {e:#}");
                        }
                        shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    });
                }

                self.progress_loop(&shared, key_index);
            });

            let elapsed = key_start.elapsed().as_secs_f64();
            let total_ops = shared.total_ops();
            let same_herd = shared.same_herd_collisions.load(Ordering::Relaxed);
            if same_herd > 0 {
                info!("Key #{key_index}: {same_herd} same-herd collisions");
            }

            let solution = shared
                .solution
                .lock()
                .expect("solution lock poisoned")
                .take();
            match solution {
                Some(private_key) => {
                    if !verify_key(&private_key, target) {
                        error!("Key #{key_index}: verification failed, dropping result");
                        continue;
                    }
                    solved.push(SolvedKey {
                        key_index,
                        target: *target,
                        private_key,
                        total_ops,
                        time_seconds: elapsed,
                    });
                }
                None => {
                    warn!("Key #{key_index}: abandoned after {total_ops} operations");
                }
            }
        }

        info!(
            "Done: total time {:.1}s",
            run_start.elapsed().as_secs_f64()
        );
        Ok(solved)
    }

    /// Aggregate per-worker counters until the key search ends, reporting
    /// MKey/s. Also enforces the operation cap and notices worker die-off.
    fn progress_loop(&self, shared: &Shared, key_index: usize) {
        let expected = if shared.params.range_power >= 126 {
            u64::MAX
        } else {
            1u64 << (shared.params.range_power / 2 + 1)
        };
        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(expected);
            pb.set_style(cli::progress_style());
            pb
        };

        let mut last_ops = 0u64;
        let mut last_tick = Instant::now();
        loop {
            thread::sleep(Duration::from_millis(200));
            let total = shared.total_ops();
            let dt = last_tick.elapsed().as_secs_f64();
            if dt > 0.0 {
                let rate = (total.saturating_sub(last_ops)) as f64 / dt / 1e6;
                pb.set_position(total.min(expected));
                pb.set_message(format!("{rate:.2} MKey/s"));
            }
            last_ops = total;
            last_tick = Instant::now();

            if shared.finished() {
                break;
            }
            if self.max_ops > 0 && total >= self.max_ops {
                warn!("Key #{key_index}: operation cap {} reached", self.max_ops);
                shared.end_of_search.store(true, Ordering::Release);
                break;
            }
            if shared.live_workers.load(Ordering::Acquire) == 0 {
                warn!("Key #{key_index}: all workers exited");
                shared.end_of_search.store(true, Ordering::Release);
                break;
            }
        }
        pb.finish_and_clear();
    }
}
