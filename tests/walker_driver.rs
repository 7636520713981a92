//! Driver-loop tests against a scripted batch walker.
//!
//! The mock implements the accelerator contract but replays canned launch
//! reports, so these tests pin down the host side of the protocol: upload,
//! item decoding, collision handling and single-kangaroo respawn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use k256::elliptic_curve::ops::MulByGenerator;
use k256::{ProjectivePoint, U256};
use kangaroo_lambda::{
    BatchWalker, DpItem, KangarooSolver, LaunchReport, Point, SearchConfig,
};

fn key_point(v: u64) -> Point {
    ProjectivePoint::mul_by_generator(&kangaroo_lambda::crypto::reduce_u256(U256::from(v)))
}

fn item(x_fill: u8, distance: u64, k_idx: u64) -> DpItem {
    let mut x = [0u8; 32];
    x[16..].fill(x_fill);
    let mut d = [0u8; 32];
    d[..8].copy_from_slice(&distance.to_le_bytes());
    DpItem { x, d, k_idx }
}

#[derive(Default)]
struct CallLog {
    params: Option<(u64, u64)>,
    uploaded: usize,
    respawned: Vec<u64>,
}

struct ScriptedWalker {
    population: u64,
    scripts: VecDeque<LaunchReport>,
    log: Arc<Mutex<CallLog>>,
}

impl ScriptedWalker {
    fn new(population: u64, scripts: Vec<LaunchReport>) -> (Self, Arc<Mutex<CallLog>>) {
        let log = Arc::new(Mutex::new(CallLog::default()));
        (
            Self {
                population,
                scripts: scripts.into(),
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl BatchWalker for ScriptedWalker {
    fn num_kangaroos(&self) -> u64 {
        self.population
    }

    fn set_params(&mut self, dp_mask: u64, jump_modulo: u64) -> Result<()> {
        self.log.lock().unwrap().params = Some((dp_mask, jump_modulo));
        Ok(())
    }

    fn set_kangaroos(&mut self, px: &[[u8; 32]], py: &[[u8; 32]], d: &[[u8; 32]]) -> Result<()> {
        assert_eq!(px.len(), self.population as usize);
        assert_eq!(py.len(), px.len());
        assert_eq!(d.len(), px.len());
        self.log.lock().unwrap().uploaded = px.len();
        Ok(())
    }

    fn set_kangaroo(
        &mut self,
        k_idx: u64,
        _px: &[u8; 32],
        _py: &[u8; 32],
        _d: &[u8; 32],
    ) -> Result<()> {
        self.log.lock().unwrap().respawned.push(k_idx);
        Ok(())
    }

    fn launch(&mut self) -> Result<LaunchReport> {
        match self.scripts.pop_front() {
            Some(report) => Ok(report),
            None => {
                // Idle until the driver observes end-of-search.
                std::thread::sleep(Duration::from_millis(1));
                Ok(LaunchReport {
                    items: Vec::new(),
                    lost: false,
                })
            }
        }
    }
}

#[test]
fn driver_solves_from_reported_rendezvous() {
    // Target key 77 in [0, 2^16): a tame walk at distance 82 and a wild walk
    // at distance 5 meeting on the same x give 0 + 82 - 5 = 77.
    let config = SearchConfig::new(
        U256::ZERO,
        U256::from(0xffffu64),
        vec![key_point(77)],
    )
    .unwrap();

    let report = LaunchReport {
        items: vec![item(0xaa, 82, 0), item(0xaa, 5, 1)],
        lost: false,
    };
    let (walker, log) = ScriptedWalker::new(4, vec![report]);

    let solver = KangarooSolver::new(config, -1, 0, true);
    let solved = solver.run(0, vec![Box::new(walker)]).unwrap();

    assert_eq!(solved.len(), 1);
    assert_eq!(
        solved[0].private_key,
        kangaroo_lambda::crypto::reduce_u256(U256::from(77u64))
    );

    let log = log.lock().unwrap();
    assert_eq!(log.uploaded, 4, "full population must be uploaded");
    let (_, jump_modulo) = log.params.expect("set_params must precede launches");
    assert_eq!(jump_modulo, 9, "16-bit range gives jump modulo 9");
    assert!(log.respawned.is_empty());
}

#[test]
fn driver_respawns_same_herd_walker_and_survives_overflow() {
    let config = SearchConfig::new(
        U256::ZERO,
        U256::from(0xffffu64),
        vec![key_point(123)],
    )
    .unwrap();

    // Indices 0 and 2 are both tame; the second report of the same x is a
    // same-herd collision and must trigger a single-kangaroo respawn. The
    // overflow flag exercises the warn-once path.
    let report = LaunchReport {
        items: vec![item(0x55, 10, 0), item(0x55, 20, 2)],
        lost: true,
    };
    let (walker, log) = ScriptedWalker::new(4, vec![report]);

    // No rendezvous is scripted, so the run ends at the operation cap.
    let solver = KangarooSolver::new(config, -1, 2_000, true);
    let solved = solver.run(0, vec![Box::new(walker)]).unwrap();

    assert!(solved.is_empty(), "no key should be solved");
    let log = log.lock().unwrap();
    assert_eq!(log.respawned, vec![2]);
}
