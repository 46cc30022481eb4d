//! Named reaction series and composite derivation
//!
//! Raw series are extracted straight from one engine layer. Composite series
//! are derived from raw ones with [`derive_composites`], a pure function of
//! one floor's raw series for one support type.
//!
//! | Composite                    | Derivation                                      |
//! |------------------------------|-------------------------------------------------|
//! | `ALL_LIVE_REDUCIBLE_FLOOR`   | Σ reducible live plans                          |
//! | `ALL_LIVE_REDUCIBLE`         | floor reducible + `TRANSFER_LL_REDUCIBLE`       |
//! | `ALL_LIVE_UNREDUCIBLE_FLOOR` | Σ unreducible live plans                        |
//! | `ALL_LIVE_UNREDUCIBLE`       | floor unreducible + `TRANSFER_LL_UNREDUCIBLE`   |
//! | `ALL_LIVE_FLOOR`             | floor reducible + floor unreducible             |
//! | `ALL_LIVE`                   | reducible + unreducible                         |
//!
//! Without unreducible plans the unreducible rows are absent and
//! `ALL_LIVE_FLOOR` / `ALL_LIVE` equal their reducible counterparts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ReactionSet;
use crate::errors::{RundownError, RundownResult};

/// Name of a reaction series held for one floor and one support type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesName {
    TransferDead,
    TransferLlReducible,
    TransferLlUnreducible,
    AllDead,
    /// Optional all-live load combination, extracted for reference
    AllLiveLc,
    /// One named live-load plan (loading layer)
    LivePlan(String),
    AllLiveReducibleFloor,
    AllLiveReducible,
    AllLiveUnreducibleFloor,
    AllLiveUnreducible,
    AllLiveFloor,
    AllLive,
}

impl SeriesName {
    pub fn key(&self) -> String {
        let key = match self {
            SeriesName::TransferDead => "TRANSFER_DEAD",
            SeriesName::TransferLlReducible => "TRANSFER_LL_REDUCIBLE",
            SeriesName::TransferLlUnreducible => "TRANSFER_LL_UNREDUCIBLE",
            SeriesName::AllDead => "ALL_DEAD",
            SeriesName::AllLiveLc => "ALL_LIVE_LC",
            SeriesName::LivePlan(name) => return name.clone(),
            SeriesName::AllLiveReducibleFloor => "ALL_LIVE_REDUCIBLE_FLOOR",
            SeriesName::AllLiveReducible => "ALL_LIVE_REDUCIBLE",
            SeriesName::AllLiveUnreducibleFloor => "ALL_LIVE_UNREDUCIBLE_FLOOR",
            SeriesName::AllLiveUnreducible => "ALL_LIVE_UNREDUCIBLE",
            SeriesName::AllLiveFloor => "ALL_LIVE_FLOOR",
            SeriesName::AllLive => "ALL_LIVE",
        };
        key.to_string()
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            SeriesName::AllLiveReducibleFloor
                | SeriesName::AllLiveReducible
                | SeriesName::AllLiveUnreducibleFloor
                | SeriesName::AllLiveUnreducible
                | SeriesName::AllLiveFloor
                | SeriesName::AllLive
        )
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Composite series of one floor and support type
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub sets: BTreeMap<SeriesName, ReactionSet>,

    /// Unmatched keys summed over every combination performed
    pub unmatched: usize,
}

/// Derive the composite live-load series from raw series.
///
/// `raw` must hold `TRANSFER_LL_REDUCIBLE` and every reducible plan; when
/// `unreducible_plans` is non-empty it must also hold
/// `TRANSFER_LL_UNREDUCIBLE` and every unreducible plan.
///
/// # Errors
///
/// * `InvalidSetting` - no reducible plan is configured
/// * `LayerNotFound` - a required raw series was never extracted
pub fn derive_composites(
    raw: &BTreeMap<SeriesName, ReactionSet>,
    reducible_plans: &[String],
    unreducible_plans: &[String],
) -> RundownResult<DerivedSeries> {
    let mut unmatched = 0;
    let mut sets = BTreeMap::new();

    let reducible_floor = sum_plans(raw, reducible_plans, "live_reducible_plans", &mut unmatched)?;
    let reducible = accumulate(
        &reducible_floor,
        raw_series(raw, &SeriesName::TransferLlReducible)?,
        SeriesName::AllLiveReducible,
        &mut unmatched,
    );

    if unreducible_plans.is_empty() {
        sets.insert(SeriesName::AllLiveFloor, reducible_floor.clone());
        sets.insert(SeriesName::AllLive, reducible.clone());
    } else {
        let unreducible_floor = sum_plans(raw, unreducible_plans, "live_unreducible_plans", &mut unmatched)?;
        let unreducible = accumulate(
            &unreducible_floor,
            raw_series(raw, &SeriesName::TransferLlUnreducible)?,
            SeriesName::AllLiveUnreducible,
            &mut unmatched,
        );
        let live_floor = accumulate(
            &reducible_floor,
            &unreducible_floor,
            SeriesName::AllLiveFloor,
            &mut unmatched,
        );
        let live = accumulate(&reducible, &unreducible, SeriesName::AllLive, &mut unmatched);

        sets.insert(SeriesName::AllLiveUnreducibleFloor, unreducible_floor);
        sets.insert(SeriesName::AllLiveUnreducible, unreducible);
        sets.insert(SeriesName::AllLiveFloor, live_floor);
        sets.insert(SeriesName::AllLive, live);
    }

    sets.insert(SeriesName::AllLiveReducibleFloor, reducible_floor);
    sets.insert(SeriesName::AllLiveReducible, reducible);

    Ok(DerivedSeries { sets, unmatched })
}

fn raw_series<'a>(raw: &'a BTreeMap<SeriesName, ReactionSet>, name: &SeriesName) -> RundownResult<&'a ReactionSet> {
    raw.get(name).ok_or_else(|| RundownError::layer_not_found(name.key()))
}

fn sum_plans(
    raw: &BTreeMap<SeriesName, ReactionSet>,
    plans: &[String],
    field: &str,
    unmatched: &mut usize,
) -> RundownResult<ReactionSet> {
    let (first, rest) = plans.split_first().ok_or_else(|| {
        RundownError::invalid_setting(field, "[]", "At least one live load plan is required")
    })?;

    let mut total = raw_series(raw, &SeriesName::LivePlan(first.clone()))?.clone();
    for plan in rest {
        let name = SeriesName::LivePlan(plan.clone());
        let combination = total.sum(raw_series(raw, &name)?);
        if combination.unmatched > 0 {
            warn!(
                series = %name,
                unmatched = combination.unmatched,
                "Supports in live plan have no match in '{}'",
                first
            );
        }
        *unmatched += combination.unmatched;
        total = combination.set;
    }
    Ok(total)
}

fn accumulate(base: &ReactionSet, other: &ReactionSet, target: SeriesName, unmatched: &mut usize) -> ReactionSet {
    let combination = base.sum(other);
    if combination.unmatched > 0 {
        warn!(
            series = %target,
            unmatched = combination.unmatched,
            "Supports dropped while deriving composite series"
        );
    }
    *unmatched += combination.unmatched;
    combination.set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;
    use crate::reactions::{Reaction, SupportType};

    fn single(fz: f64) -> ReactionSet {
        let mut set = ReactionSet::new(SupportType::Columns);
        set.insert(Reaction::column(Point2D::new(0.0, 0.0)).with_fz(fz));
        set
    }

    fn plans(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reducible_only_template() {
        let mut raw = BTreeMap::new();
        raw.insert(SeriesName::TransferLlReducible, single(40.0));
        raw.insert(SeriesName::LivePlan("Live".into()), single(50.0));
        raw.insert(SeriesName::LivePlan("Roof".into()), single(5.0));

        let derived = derive_composites(&raw, &plans(&["Live", "Roof"]), &[]).unwrap();
        assert_eq!(derived.sets[&SeriesName::AllLiveReducibleFloor].total_fz(), 55.0);
        assert_eq!(derived.sets[&SeriesName::AllLiveReducible].total_fz(), 95.0);
        assert_eq!(derived.sets[&SeriesName::AllLiveFloor].total_fz(), 55.0);
        assert_eq!(derived.sets[&SeriesName::AllLive].total_fz(), 95.0);
        assert!(!derived.sets.contains_key(&SeriesName::AllLiveUnreducible));
        assert_eq!(derived.unmatched, 0);
    }

    #[test]
    fn test_unreducible_template_uses_unreducible_plans() {
        let mut raw = BTreeMap::new();
        raw.insert(SeriesName::TransferLlReducible, single(10.0));
        raw.insert(SeriesName::TransferLlUnreducible, single(20.0));
        raw.insert(SeriesName::LivePlan("Live".into()), single(1.0));
        raw.insert(SeriesName::LivePlan("Parking".into()), single(2.0));
        raw.insert(SeriesName::LivePlan("Storage".into()), single(4.0));
        raw.insert(SeriesName::LivePlan("Plant".into()), single(8.0));

        let derived = derive_composites(&raw, &plans(&["Live", "Parking"]), &plans(&["Storage", "Plant"])).unwrap();
        let fz = |name: SeriesName| derived.sets[&name].total_fz();
        assert_eq!(fz(SeriesName::AllLiveReducibleFloor), 3.0);
        assert_eq!(fz(SeriesName::AllLiveReducible), 13.0);
        assert_eq!(fz(SeriesName::AllLiveUnreducibleFloor), 12.0);
        assert_eq!(fz(SeriesName::AllLiveUnreducible), 32.0);
        assert_eq!(fz(SeriesName::AllLiveFloor), 15.0);
        assert_eq!(fz(SeriesName::AllLive), 45.0);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let mut raw = BTreeMap::new();
        raw.insert(SeriesName::TransferLlReducible, single(40.0));
        raw.insert(SeriesName::LivePlan("Live".into()), single(50.0));
        let before = raw.clone();
        derive_composites(&raw, &plans(&["Live"]), &[]).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_missing_plan_is_reported() {
        let mut raw = BTreeMap::new();
        raw.insert(SeriesName::TransferLlReducible, single(0.0));
        let err = derive_composites(&raw, &plans(&["Live"]), &[]).unwrap_err();
        assert_eq!(err, RundownError::layer_not_found("Live"));
    }

    #[test]
    fn test_no_reducible_plans_is_invalid() {
        let raw = BTreeMap::new();
        let err = derive_composites(&raw, &[], &[]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_SETTING");
    }

    #[test]
    fn test_unmatched_keys_are_counted() {
        let mut other = ReactionSet::new(SupportType::Columns);
        other.insert(Reaction::column(Point2D::new(7.0, 7.0)).with_fz(3.0));

        let mut raw = BTreeMap::new();
        raw.insert(SeriesName::TransferLlReducible, other);
        raw.insert(SeriesName::LivePlan("Live".into()), single(50.0));

        let derived = derive_composites(&raw, &plans(&["Live"]), &[]).unwrap();
        assert_eq!(derived.unmatched, 1);
        assert_eq!(derived.sets[&SeriesName::AllLiveReducible].total_fz(), 50.0);
    }

    #[test]
    fn test_series_keys() {
        assert_eq!(SeriesName::AllDead.to_string(), "ALL_DEAD");
        assert_eq!(SeriesName::LivePlan("Live (Roof) Loading".into()).key(), "Live (Roof) Loading");
        assert!(SeriesName::AllLive.is_composite());
        assert!(!SeriesName::TransferDead.is_composite());
    }
}
