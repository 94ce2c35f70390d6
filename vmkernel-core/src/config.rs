//! `vmkernel_sched::init(cfg)` input (spec §B "Configuration").
//!
//! A plain data struct consumed once at `init`, mirroring the teacher's
//! `VmConfig`/boot-manager pattern rather than scattering tunables as
//! free-standing `static`s.

use crate::alloc_model::Shares;
use crate::ids::{MAX_GROUPS, MAX_NODES, PATH_LEN};

/// Tunables governing bonus/lag bounding and skew detection (spec §4.3,
/// §4.4). Cycle counts are in TSC units; the caller is responsible for
/// calibrating against the HAL's `cycles_to_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedTunables {
    pub shares_low: Shares,
    pub shares_normal: Shares,
    pub shares_high: Shares,
    pub shares_min: Shares,
    pub shares_max: Shares,
    pub bound_lag_ahead_cycles: u64,
    pub bound_lag_behind_cycles: u64,
    pub skew_threshold: u32,
    pub quantum_cycles: u64,
}

impl Default for SchedTunables {
    fn default() -> Self {
        SchedTunables {
            shares_low: 500,
            shares_normal: 1000,
            shares_high: 2000,
            shares_min: 0,
            shares_max: 100_000,
            bound_lag_ahead_cycles: 30_000_000,
            bound_lag_behind_cycles: 30_000_000,
            skew_threshold: 5,
            quantum_cycles: 50_000_000,
        }
    }
}

/// Static partitioning of PCPUs into scheduler cells.
#[derive(Debug, Clone, Copy)]
pub struct CellLayout {
    pub num_cells: u32,
    pub pcpus_per_cell: u32,
}

/// Top-level scheduler configuration, the sole argument to `init`.
#[derive(Debug, Clone, Copy)]
pub struct SchedConfig {
    pub cells: CellLayout,
    pub tunables: SchedTunables,
    pub max_groups: usize,
    pub max_nodes: usize,
    pub path_len: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            cells: CellLayout {
                num_cells: 1,
                pcpus_per_cell: 1,
            },
            tunables: SchedTunables::default(),
            max_groups: MAX_GROUPS,
            max_nodes: MAX_NODES,
            path_len: PATH_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = SchedConfig::default();
        assert_eq!(cfg.tunables.shares_low, 500);
        assert_eq!(cfg.tunables.shares_normal, 1000);
        assert_eq!(cfg.tunables.shares_high, 2000);
        assert_eq!(cfg.tunables.shares_max, 100_000);
        assert_eq!(cfg.path_len, 8);
    }
}
