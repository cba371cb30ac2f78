//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::analysis::{AnalysisReport, Correlation};
use crate::domain::{EstimateConfig, ParamName, RegionFit, ResultsFile};
use crate::fit::BatchOutput;
use crate::io::IngestedData;
use crate::report::{Rankings, param_stats};

/// Format the full estimate summary (ingest counters + fit outcome + parameter spread).
pub fn format_estimate_summary(ingest: &IngestedData, batch: &BatchOutput, config: &EstimateConfig) -> String {
    let mut out = String::new();
    let s = &ingest.stats;

    out.push_str("=== seir - SEIR fit per MSOA ===\n");
    out.push_str(&format!(
        "Days: {} | series: {} | start: beta={} sigma={} gamma={}\n",
        config.days,
        config.series.display_name(),
        fmt_num(config.initial.beta),
        fmt_num(config.initial.sigma),
        fmt_num(config.initial.gamma),
    ));
    out.push_str(&format!(
        "Rows: imd={} | population={} (matched {}) | cases={} (matched {})\n",
        s.imd_rows, s.population_rows, s.population_matched, s.case_rows, s.case_matched
    ));
    out.push_str(&format!(
        "Dropped: no population={} | series length != {}: {} | malformed rows={}\n",
        s.dropped_no_population,
        config.days,
        s.dropped_wrong_length,
        ingest.row_errors.len()
    ));
    out.push_str(&format!(
        "Regions: fitted={} | converged={} | failed={}\n",
        batch.fits.len(),
        batch.converged(),
        batch.failures.len()
    ));

    out.push_str("\nParameters:\n");
    out.push_str(&format!(
        "{:<6} {:>6} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
        "param", "n", "mean", "median", "min", "max", "bound"
    ));
    for param in ParamName::ALL {
        if let Some(st) = param_stats(&batch.fits, param) {
            out.push_str(&format!(
                "{:<6} {:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>8}\n",
                param.display_name(),
                st.n,
                st.mean,
                st.median,
                st.min,
                st.max,
                st.at_bound
            ));
        }
    }

    if !batch.failures.is_empty() {
        out.push_str("\nFailures:\n");
        for f in batch.failures.iter().take(10) {
            out.push_str(&format!("  {:<12} {}\n", f.code, truncate(&f.message, 60)));
        }
        if batch.failures.len() > 10 {
            out.push_str(&format!("  ... and {} more\n", batch.failures.len() - 10));
        }
    }
    out.push('\n');

    out
}

/// Format the worst/best fit tables.
pub fn format_rankings(rankings: &Rankings) -> String {
    let mut out = String::new();

    out.push_str("Worst fits (highest RMSE):\n");
    out.push_str(&format_region_table(&rankings.worst));
    out.push('\n');

    out.push_str("Best fits (lowest RMSE):\n");
    out.push_str(&format_region_table(&rankings.best));

    out
}

/// One line per region: code, IMD, rates, R0, RMSE, status.
pub fn format_region_table(rows: &[RegionFit]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<12} {:>8} {:>9} {:>9} {:>9} {:>8} {:>10} {:<6}\n",
            "code", "imd", "beta", "sigma", "gamma", "r0", "rmse", "status"
        )
        .trim_end(),
    );
    out.push('\n');

    out.push_str(
        format!(
            "{:-<12} {:-<8} {:-<9} {:-<9} {:-<9} {:-<8} {:-<10} {:-<6}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        let status = if !r.quality.success {
            "fail"
        } else if r.at_bound.is_empty() {
            "ok"
        } else {
            "bound"
        };
        out.push_str(
            format!(
                "{:<12} {:>8.3} {:>9.4} {:>9.4} {:>9.4} {:>8} {:>10.3} {:<6}\n",
                truncate(&r.code, 12),
                r.imd,
                r.params.beta,
                r.params.sigma,
                r.params.gamma,
                r.params.r0().map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string()),
                r.quality.rmse,
                status,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Format a correlation study.
pub fn format_analysis(report: &AnalysisReport, results: &ResultsFile) -> String {
    let mut out = String::new();

    out.push_str("=== seir - parameter vs IMD correlation ===\n");
    out.push_str(&format!(
        "Source: {} run at {} | series: {} | days: {}\n",
        results.tool,
        results.generated_at.format("%Y-%m-%d %H:%M:%SZ"),
        results.series.display_name(),
        results.days
    ));
    out.push_str(&format!(
        "Regions: used={} of {} | excluded={}\n\n",
        report.points.len(),
        report.n_total,
        report.excluded.len()
    ));

    out.push_str(&format!(
        "{:<6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
        "param", "pearson", "p", "spearman", "p", "slope", "intercept", "r2"
    ));
    for c in &report.correlations {
        let (pr, pp) = fmt_corr(c.pearson.as_ref());
        let (sr, sp) = fmt_corr(c.spearman.as_ref());
        let (slope, intercept, r2) = match &c.regression {
            Some(fit) => (
                format!("{:.6}", fit.slope),
                format!("{:.4}", fit.intercept),
                format!("{:.4}", fit.r_squared),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        out.push_str(&format!(
            "{:<6} {pr:>10} {pp:>10} {sr:>10} {sp:>10} {slope:>10} {intercept:>10} {r2:>8}\n",
            c.param.display_name()
        ));
    }

    if !report.excluded.is_empty() {
        out.push_str("\nExcluded:\n");
        for e in report.excluded.iter().take(10) {
            out.push_str(&format!("  {:<12} {}\n", e.code, e.reason));
        }
        if report.excluded.len() > 10 {
            out.push_str(&format!("  ... and {} more\n", report.excluded.len() - 10));
        }
    }
    out.push('\n');

    out
}

fn fmt_corr(c: Option<&Correlation>) -> (String, String) {
    match c {
        Some(c) => (format!("{:.4}", c.coefficient), fmt_p(c.p_value)),
        None => ("-".to_string(), "-".to_string()),
    }
}

fn fmt_p(p: f64) -> String {
    if p < 1e-4 { format!("{p:.2e}") } else { format!("{p:.4}") }
}

fn fmt_num(v: f64) -> String {
    let s = format!("{v:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, SeirParams, SeriesKind};

    fn fit(code: &str, success: bool, at_bound: Vec<ParamName>) -> RegionFit {
        RegionFit {
            code: code.to_string(),
            imd: 23.456,
            population: 8000,
            series: SeriesKind::Active,
            observed: vec![],
            params: SeirParams {
                beta: 1.5,
                sigma: 0.25,
                gamma: 0.5,
            },
            stderr: None,
            at_bound,
            quality: FitQuality {
                chisqr: 9.0,
                reduced_chisqr: None,
                rmse: 1.25,
                nfev: 30,
                success,
                message: String::new(),
            },
        }
    }

    #[test]
    fn region_table_rows() {
        let table = format_region_table(&[
            fit("E02000001", true, vec![]),
            fit("E02000002", true, vec![ParamName::Sigma]),
            fit("E02000003", false, vec![]),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("code"));
        assert_eq!(
            lines[2],
            "E02000001      23.456    1.5000    0.2500    0.5000     3.00      1.250 ok"
        );
        assert!(lines[3].ends_with("bound"));
        assert!(lines[4].ends_with("fail"));
    }

    #[test]
    fn truncate_and_number_helpers() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 6), "abcde.");
        assert_eq!(fmt_num(1.14), "1.14");
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_p(0.5), "0.5000");
        assert_eq!(fmt_p(1.5e-6), "1.50e-6");
    }
}
