//! C2 AllocModel: per-resource allocation, normalization, admission.
//! Grounded on `examples/original_source/sched/sched.h` (`Sched_Alloc`,
//! `SCHED_CONFIG_*` share constants) and spec.md §4.2.

use crate::error::{SchedError, SchedResult};

/// Raw share count after `low/normal/high` sentinels are resolved.
pub type Shares = i64;

/// `CPUSCHED_SHARES_PER_VCPU_*` (spec §C.1).
pub const SHARES_PER_VCPU_LOW: Shares = 500;
pub const SHARES_PER_VCPU_NORMAL: Shares = 1000;
pub const SHARES_PER_VCPU_HIGH: Shares = 2000;
pub const SHARES_MIN: Shares = 0;
pub const SHARES_MAX: Shares = 100_000;

/// `shares` before normalization: either an explicit count or one of the
/// three sentinels resolved relative to the vcpu count (spec §3 "shares
/// may be a sentinel meaning low/normal/high").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharesSpec {
    Explicit(Shares),
    Low,
    Normal,
    High,
}

impl SharesSpec {
    /// Resolve to an integer share count, clamped to `[SHARES_MIN,
    /// SHARES_MAX]`.
    pub fn resolve(self, num_vcpus: u32) -> Shares {
        let n = num_vcpus.max(1) as i64;
        let raw = match self {
            SharesSpec::Explicit(v) => v,
            SharesSpec::Low => n * SHARES_PER_VCPU_LOW,
            SharesSpec::Normal => n * SHARES_PER_VCPU_NORMAL,
            SharesSpec::High => n * SHARES_PER_VCPU_HIGH,
        };
        raw.clamp(SHARES_MIN, SHARES_MAX)
    }
}

/// Reporting unit for an [`AllocBlock`] (spec §3 "units ∈ {percent, mhz,
/// bshares, mb, pages, invalid}"). String tokens follow the original
/// procfs surface (`examples/original_source/sched/sched.h`
/// `Sched_UnitsToString`), kept as a pure conversion per spec §C.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Percent,
    Mhz,
    BShares,
    Mb,
    Pages,
    Invalid,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Units::Percent => "pct",
            Units::Mhz => "mhz",
            Units::BShares => "bshares",
            Units::Mb => "mb",
            Units::Pages => "pages",
            Units::Invalid => "invalid",
        }
    }

    pub fn parse(token: &str) -> Option<Units> {
        match token {
            "pct" => Some(Units::Percent),
            "mhz" => Some(Units::Mhz),
            "bshares" => Some(Units::BShares),
            "mb" => Some(Units::Mb),
            "pages" => Some(Units::Pages),
            "invalid" => Some(Units::Invalid),
            _ => None,
        }
    }
}

/// `min`/`max` as given by a caller: either an absolute value or "total
/// minus n", encoded as negative (spec §3 "Negative min/max encode
/// 'total - n'").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Absolute(i64),
    TotalMinus(i64),
}

impl Bound {
    pub fn resolve(self, total: i64) -> i64 {
        match self {
            Bound::Absolute(v) => v,
            Bound::TotalMinus(n) => total - n,
        }
    }
}

/// A fully resolved, normalized allocation: `{min, max, shares, minLimit,
/// hardMax, units}` (spec §3). Only integers after normalization; sentinel
/// handling happens in [`SharesSpec`]/[`Bound`] before this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocBlock {
    pub min: i64,
    /// `None` encodes "no max".
    pub max: Option<i64>,
    pub shares: Shares,
    pub min_limit: i64,
    pub hard_max: Option<i64>,
    pub units: Units,
}

impl AllocBlock {
    /// Normalize raw bounds/shares against a known resource `total` and
    /// vcpu count, clamping negative `min` to 0 and "no max" encodings to
    /// `None` (spec §4.2 "Negative min/max clamp to 0 (min) or 'no max'
    /// (max)").
    pub fn normalize(
        min: Bound,
        max: Option<Bound>,
        shares: SharesSpec,
        min_limit: i64,
        hard_max: Option<Bound>,
        units: Units,
        total: i64,
        num_vcpus: u32,
    ) -> AllocBlock {
        let min = min.resolve(total).max(0);
        let max = max.map(|m| m.resolve(total)).filter(|&m| m >= 0);
        let hard_max = hard_max.map(|m| m.resolve(total)).filter(|&m| m >= 0);
        AllocBlock {
            min,
            max,
            shares: shares.resolve(num_vcpus),
            min_limit,
            hard_max,
            units,
        }
    }

    /// Convert this block's normalized share count into `units` for
    /// reporting only — never used in the scheduling decision path
    /// (spec §4.2 "`base_shares_to_units` ... is never part of the
    /// scheduling decision path").
    pub fn base_shares_to_units(&self, total_shares: Shares, capacity: i64) -> i64 {
        if total_shares <= 0 {
            return 0;
        }
        (self.shares.saturating_mul(capacity)) / total_shares
    }
}

/// Verify that `candidate`'s `min` plus its siblings' aggregated `min`
/// does not exceed `parent_capacity` (spec §4.2 "Admission"). Both the CPU
/// and memory sub-models use this same check shape, parameterized by unit.
pub fn admit(candidate_min: i64, sibling_mins_sum: i64, parent_capacity: i64) -> SchedResult<()> {
    if candidate_min < 0 {
        return Err(SchedError::BadParam);
    }
    if sibling_mins_sum
        .checked_add(candidate_min)
        .map(|total| total > parent_capacity)
        .unwrap_or(true)
    {
        return Err(SchedError::LimitExceeded);
    }
    Ok(())
}
