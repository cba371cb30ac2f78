//! Region selection for the correlation study.

use std::fmt;

use crate::domain::{ParamName, RegionFilter, RegionFit};

/// Why a fitted region was left out.
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    NotConverged,
    AtBound(Vec<ParamName>),
    OutOfRange { param: ParamName, value: f64 },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NotConverged => write!(f, "optimizer did not converge"),
            ExclusionReason::AtBound(params) => {
                let names: Vec<&str> = params.iter().map(|p| p.display_name()).collect();
                write!(f, "at bound: {}", names.join(", "))
            }
            ExclusionReason::OutOfRange { param, value } => {
                write!(f, "{} = {value:.4} outside range", param.display_name())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Excluded {
    pub code: String,
    pub reason: ExclusionReason,
}

/// First reason `fit` fails `filter`, if any.
pub fn exclusion_reason(fit: &RegionFit, filter: &RegionFilter) -> Option<ExclusionReason> {
    if filter.require_success && !fit.quality.success {
        return Some(ExclusionReason::NotConverged);
    }
    if filter.exclude_bound_hits && !fit.at_bound.is_empty() {
        return Some(ExclusionReason::AtBound(fit.at_bound.clone()));
    }
    filter.ranges.iter().find_map(|range| {
        let value = fit.params.get(range.param);
        let below = range.min.is_some_and(|m| value < m);
        let above = range.max.is_some_and(|m| value > m);
        (below || above).then_some(ExclusionReason::OutOfRange {
            param: range.param,
            value,
        })
    })
}

/// Split fits into kept (input order) and excluded.
pub fn apply_filter<'a>(fits: &'a [RegionFit], filter: &RegionFilter) -> (Vec<&'a RegionFit>, Vec<Excluded>) {
    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    for fit in fits {
        match exclusion_reason(fit, filter) {
            None => kept.push(fit),
            Some(reason) => excluded.push(Excluded {
                code: fit.code.clone(),
                reason,
            }),
        }
    }
    (kept, excluded)
}
