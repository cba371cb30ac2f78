//! Correlation of fitted SEIR parameters with deprivation (IMD).
//!
//! For each of `beta`, `sigma`, `gamma` over the regions that pass the filter:
//! Pearson and Spearman correlation with IMD (two-sided t-test p-values) and
//! the least-squares line `param = a + b * imd` with its R².

pub mod correlation;
pub mod filter;

pub use correlation::*;
pub use filter::*;

use crate::domain::{ParamName, RegionFilter, RegionFit, SeirParams};

/// A region that entered the study.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPoint {
    pub code: String,
    pub imd: f64,
    pub params: SeirParams,
}

/// Statistics for one parameter against IMD.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamCorrelation {
    pub param: ParamName,
    pub pearson: Option<Correlation>,
    pub spearman: Option<Correlation>,
    pub regression: Option<LinearFit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub n_total: usize,
    pub points: Vec<AnalysisPoint>,
    pub excluded: Vec<Excluded>,
    /// One entry per parameter, in `ParamName::ALL` order.
    pub correlations: Vec<ParamCorrelation>,
}

impl AnalysisReport {
    /// `(imd, value)` columns for one parameter.
    pub fn columns(&self, param: ParamName) -> (Vec<f64>, Vec<f64>) {
        self.points.iter().map(|p| (p.imd, p.params.get(param))).unzip()
    }

    pub fn correlation(&self, param: ParamName) -> Option<&ParamCorrelation> {
        self.correlations.iter().find(|c| c.param == param)
    }
}

/// Filter the fits and correlate each parameter with IMD.
pub fn analyze(fits: &[RegionFit], filter: &RegionFilter) -> AnalysisReport {
    let (kept, excluded) = apply_filter(fits, filter);
    let points: Vec<AnalysisPoint> = kept
        .into_iter()
        .map(|f| AnalysisPoint {
            code: f.code.clone(),
            imd: f.imd,
            params: f.params,
        })
        .collect();

    let mut report = AnalysisReport {
        n_total: fits.len(),
        points,
        excluded,
        correlations: Vec::new(),
    };

    report.correlations = ParamName::ALL
        .into_iter()
        .map(|param| {
            let (imd, values) = report.columns(param);
            ParamCorrelation {
                param,
                pearson: pearson(&imd, &values),
                spearman: spearman(&imd, &values),
                regression: linear_regression(&imd, &values),
            }
        })
        .collect();

    tracing::debug!(
        used = report.points.len(),
        excluded = report.excluded.len(),
        "correlation analysis done"
    );
    report
}
