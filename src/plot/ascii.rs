//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed points: `o`
//! - modeled curve / regression line: `-` line

use crate::analysis::LinearFit;
use crate::domain::{ParamName, RegionFit};

/// Axis names shown in the plot header.
#[derive(Debug, Clone, Copy)]
pub struct AxisLabels<'a> {
    pub x: &'a str,
    pub y: &'a str,
}

/// Observed series (`o`) against the modeled `I(t)` (`-`) by day.
pub fn render_fit_plot(fit: &RegionFit, modeled: &[f64], width: usize, height: usize) -> String {
    let observed: Vec<(f64, f64)> = fit
        .observed
        .iter()
        .enumerate()
        .map(|(d, &y)| (d as f64, y))
        .collect();
    let curve: Vec<(f64, f64)> = modeled.iter().enumerate().map(|(d, &y)| (d as f64, y)).collect();

    render_plot(
        &observed,
        Some(&curve),
        AxisLabels {
            x: "day",
            y: "infected",
        },
        width,
        height,
    )
}

/// Parameter against IMD, with the regression line when one exists.
pub fn render_scatter_plot(
    param: ParamName,
    imd: &[f64],
    values: &[f64],
    regression: Option<&LinearFit>,
    width: usize,
    height: usize,
) -> String {
    let points: Vec<(f64, f64)> = imd.iter().copied().zip(values.iter().copied()).collect();
    let line = regression.and_then(|fit| {
        let (x_min, x_max) = x_range(&points, None)?;
        Some(vec![(x_min, fit.predict(x_min)), (x_max, fit.predict(x_max))])
    });

    render_plot(
        &points,
        line.as_deref(),
        AxisLabels {
            x: "imd",
            y: param.display_name(),
        },
        width,
        height,
    )
}

pub fn render_plot(
    points: &[(f64, f64)],
    line: Option<&[(f64, f64)]>,
    labels: AxisLabels<'_>,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = x_range(points, line).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(points, line).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Line first so points overlay it.
    if let Some(line) = line {
        draw_polyline(&mut grid, line, (x_min, x_max), (y_min, y_max));
    }

    for &(x, y) in points {
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {}=[{x_min:.3}, {x_max:.3}] | {}=[{y_min:.2}, {y_max:.2}]\n",
        labels.x, labels.y
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn finite_points<'a>(
    points: &'a [(f64, f64)],
    line: Option<&'a [(f64, f64)]>,
) -> impl Iterator<Item = &'a (f64, f64)> {
    points
        .iter()
        .chain(line.unwrap_or(&[]).iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
}

fn x_range(points: &[(f64, f64)], line: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let (min, max) = finite_points(points, line).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(x, _)| {
        (lo.min(x), hi.max(x))
    });
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn y_range(points: &[(f64, f64)], line: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let (min, max) = finite_points(points, line).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
        (lo.min(y), hi.max(y))
    });
    if !(min.is_finite() && max.is_finite()) {
        return None;
    }
    if max > min {
        Some((min, max))
    } else {
        // Flat data: center it.
        Some((min - 0.5, max + 0.5))
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top (y_max).
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_polyline(grid: &mut [Vec<char>], line: &[(f64, f64)], (x_min, x_max): (f64, f64), (y_min, y_max): (f64, f64)) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in line {
        if !(x.is_finite() && y.is_finite()) {
            prev = None;
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let points = [(1.0, 100.0), (10.0, 110.0)];
        let line = [(1.0, 100.0), (10.0, 100.0)];

        let txt = render_plot(&points, Some(&line), AxisLabels { x: "imd", y: "beta" }, 10, 5);
        let expected = concat!(
            "Plot: imd=[1.000, 10.000] | beta=[99.50, 110.50]\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn scatter_draws_regression_across_imd_range() {
        let fit = LinearFit {
            intercept: 0.0,
            slope: 1.0,
            r_squared: 1.0,
            n: 3,
        };
        let txt = render_scatter_plot(ParamName::Gamma, &[0.0, 5.0, 10.0], &[0.0, 5.0, 10.0], Some(&fit), 11, 11);
        let lines: Vec<&str> = txt.lines().collect();
        assert!(lines[0].starts_with("Plot: imd=[0.000, 10.000] | gamma="));
        assert_eq!(lines.len(), 12);
        // Top-right and bottom-left hold points on the diagonal.
        assert_eq!(lines[1].chars().last(), Some('o'));
        assert_eq!(lines[11].chars().next(), Some('o'));
    }

    #[test]
    fn flat_series_does_not_panic() {
        let txt = render_plot(&[(0.0, 3.0), (1.0, 3.0)], None, AxisLabels { x: "day", y: "infected" }, 10, 5);
        assert_eq!(txt.lines().count(), 6);
    }
}
