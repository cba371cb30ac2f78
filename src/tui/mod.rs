//! Ratatui-based terminal UI.
//!
//! Browses a saved results JSON: a region list on the left, and on the right
//! either the selected region's observed cases against its modeled `I(t)`, or
//! one fitted parameter against IMD across the filtered regions.

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::analysis::AnalysisReport;
use crate::app::pipeline::{AnalysisOutput, run_analysis};
use crate::domain::{AnalysisConfig, ParamName, RegionFit, ResultsFile};
use crate::error::{AppError, EXIT_INPUT};
use crate::io::ode_options;

mod plotters_chart;

use plotters_chart::SeirPlottersChart;

const PAGE: usize = 10;

/// Start the TUI.
pub fn run(config: &AnalysisConfig) -> Result<(), AppError> {
    // Load before touching the terminal so errors print normally.
    let out = run_analysis(config)?;
    let mut app = App::new(out);

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal =
        Terminal::new(backend).map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(EXIT_INPUT, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Fit,
    Correlation,
}

struct App {
    results: ResultsFile,
    report: AnalysisReport,
    view: View,
    selected: usize,
    param: ParamName,
    /// Modeled `I(t)` for the selected region.
    curve: Option<Vec<f64>>,
    status: String,
}

impl App {
    fn new(out: AnalysisOutput) -> Self {
        let mut app = Self {
            results: out.results,
            report: out.report,
            view: View::Fit,
            selected: 0,
            param: ParamName::Beta,
            curve: None,
            status: String::new(),
        };
        app.refresh_curve();
        app.status = format!(
            "{} regions loaded, {} in correlation study",
            app.results.regions.len(),
            app.report.points.len()
        );
        app
    }

    fn selected_fit(&self) -> Option<&RegionFit> {
        self.results.regions.get(self.selected)
    }

    fn refresh_curve(&mut self) {
        let Some(fit) = self.results.regions.get(self.selected) else {
            self.curve = None;
            return;
        };
        let code = fit.code.clone();
        match crate::report::modeled_curve(fit, &self.results.seed, &ode_options(&self.results)) {
            Ok(curve) => self.curve = Some(curve),
            Err(e) => {
                self.status = format!("{code}: {e}");
                self.curve = None;
            }
        }
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(EXIT_INPUT, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(EXIT_INPUT, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(EXIT_INPUT, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let last = self.results.regions.len().saturating_sub(1);
        let before = self.selected;

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => self.selected = (self.selected + 1).min(last),
            KeyCode::PageUp => self.selected = self.selected.saturating_sub(PAGE),
            KeyCode::PageDown => self.selected = (self.selected + PAGE).min(last),
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = last,
            KeyCode::Tab => {
                self.view = match self.view {
                    View::Fit => View::Correlation,
                    View::Correlation => View::Fit,
                };
            }
            KeyCode::Char('p') => {
                self.param = self.param.next();
                self.status = format!("parameter: {}", self.param.display_name());
            }
            _ => {}
        }

        if self.selected != before {
            self.refresh_curve();
        }
        false
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("seir", Style::default().fg(Color::Cyan)),
            Span::raw(format!(
                " | {} | {} days | run {}",
                self.results.series.display_name(),
                self.results.days,
                self.results.generated_at.format("%Y-%m-%d %H:%M")
            )),
        ]));

        let detail = match self.view {
            View::Fit => self.selected_fit().map(|fit| {
                format!(
                    "{} imd={:.3} N={} | beta={:.4} sigma={:.4} gamma={:.4} | rmse={:.3} | {}",
                    fit.code,
                    fit.imd,
                    fit.population,
                    fit.params.beta,
                    fit.params.sigma,
                    fit.params.gamma,
                    fit.quality.rmse,
                    fit.quality.message
                )
            }),
            View::Correlation => self.report.correlation(self.param).map(|c| {
                let corr = |c: Option<&crate::analysis::Correlation>| {
                    c.map(|c| format!("{:.4} (p={:.4})", c.coefficient, c.p_value))
                        .unwrap_or_else(|| "-".to_string())
                };
                format!(
                    "{} vs imd | n={} | pearson {} | spearman {}",
                    self.param.display_name(),
                    self.report.points.len(),
                    corr(c.pearson.as_ref()),
                    corr(c.spearman.as_ref())
                )
            }),
        };
        lines.push(Line::from(Span::styled(
            detail.unwrap_or_else(|| "-".to_string()),
            Style::default().fg(Color::Gray),
        )));

        if let (View::Correlation, Some(c)) = (self.view, self.report.correlation(self.param)) {
            if let Some(reg) = &c.regression {
                lines.push(Line::from(Span::styled(
                    format!(
                        "{} = {:.4} + {:.6} * imd | r2={:.4}",
                        self.param.display_name(),
                        reg.intercept,
                        reg.slope,
                        reg.r_squared
                    ),
                    Style::default().fg(Color::Gray),
                )));
            }
        }

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(34), Constraint::Min(0)])
            .split(area);

        self.draw_regions(frame, chunks[0]);
        self.draw_chart(frame, chunks[1]);
    }

    fn draw_regions(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .results
            .regions
            .iter()
            .map(|fit| {
                let mark = if !fit.quality.success {
                    "x"
                } else if !fit.at_bound.is_empty() {
                    "b"
                } else {
                    " "
                };
                ListItem::new(format!("{mark} {:<10} {:>7.2} {:>8.2}", fit.code, fit.imd, fit.quality.rmse))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Regions (imd, rmse)").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = match self.view {
            View::Fit => "Observed vs modeled",
            View::Correlation => "Parameter vs IMD",
        };
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let data = match self.view {
            View::Fit => self.selected_fit().map(|fit| fit_chart(fit, self.curve.as_deref())),
            View::Correlation => {
                let code = self.selected_fit().map(|f| f.code.as_str());
                Some(correlation_chart(&self.report, self.param, code))
            }
        };
        let Some(data) = data.filter(|d| !d.points.is_empty()) else {
            let msg = Paragraph::new("Nothing to plot.").style(Style::default().fg(Color::Yellow));
            frame.render_widget(msg, inner);
            return;
        };

        let (chart_rect, insets) = chart_layout(inner);
        let widget = SeirPlottersChart {
            line: &data.line,
            points: &data.points,
            highlight: &data.highlight,
            x_bounds: data.x_bounds,
            y_bounds: data.y_bounds,
            x_label: data.x_label,
            y_label: data.y_label,
            fmt_x: fmt_axis,
            fmt_y: fmt_axis,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, &data);
        }
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ PgUp/PgDn select  Tab view  p parameter  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

/// Series and bounds for one chart.
#[derive(Debug, Clone, PartialEq)]
struct ChartData {
    line: Vec<(f64, f64)>,
    points: Vec<(f64, f64)>,
    highlight: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
    x_label: &'static str,
    y_label: &'static str,
}

fn fit_chart(fit: &RegionFit, curve: Option<&[f64]>) -> ChartData {
    let points: Vec<(f64, f64)> = fit
        .observed
        .iter()
        .enumerate()
        .map(|(d, &y)| (d as f64, y))
        .collect();
    let line: Vec<(f64, f64)> = curve
        .unwrap_or(&[])
        .iter()
        .enumerate()
        .map(|(d, &y)| (d as f64, y))
        .collect();

    let last_day = fit.observed.len().saturating_sub(1).max(1) as f64;
    let y_bounds = padded_bounds(points.iter().chain(line.iter()).map(|&(_, y)| y));

    ChartData {
        line,
        points,
        highlight: Vec::new(),
        x_bounds: [0.0, last_day],
        y_bounds,
        x_label: "day",
        y_label: "infected",
    }
}

fn correlation_chart(report: &AnalysisReport, param: ParamName, selected: Option<&str>) -> ChartData {
    let points: Vec<(f64, f64)> = report.points.iter().map(|p| (p.imd, p.params.get(param))).collect();
    let highlight = report
        .points
        .iter()
        .filter(|p| Some(p.code.as_str()) == selected)
        .map(|p| (p.imd, p.params.get(param)))
        .collect();

    let x_bounds = padded_bounds(points.iter().map(|&(x, _)| x));
    let line = report
        .correlation(param)
        .and_then(|c| c.regression.as_ref())
        .map(|fit| {
            let [x0, x1] = x_bounds;
            vec![(x0, fit.predict(x0)), (x1, fit.predict(x1))]
        })
        .unwrap_or_default();
    let y_bounds = padded_bounds(points.iter().chain(line.iter()).map(|&(_, y)| y));

    ChartData {
        line,
        points,
        highlight,
        x_bounds,
        y_bounds,
        x_label: "imd",
        y_label: param.display_name(),
    }
}

/// Min/max of the finite values with 5% padding; flat data is widened by 0.5.
fn padded_bounds(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(min.is_finite() && max.is_finite()) {
        return [0.0, 1.0];
    }
    if max <= min {
        return [min - 0.5, max + 0.5];
    }
    let pad = (max - min) * 0.05;
    [min - pad, max + pad]
}

fn fmt_axis(v: f64) -> String {
    if v.abs() >= 100.0 { format!("{v:.0}") } else { format!("{v:.2}") }
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(frame: &mut ratatui::Frame<'_>, inner: Rect, chart: Rect, insets: AxisInsets, data: &ChartData) {
    let ticks = 5usize;
    let style = Style::default().fg(Color::Gray);
    let [x0, x1] = data.x_bounds;
    let [y0, y1] = data.y_bounds;

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis(x0 + u * (x1 - x0));
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label.clone()).style(style),
            Rect {
                x: x.saturating_sub((label.len() / 2) as u16),
                y,
                width: label.len() as u16,
                height: 1,
            },
        );
    }

    for i in 0..ticks {
        let u = i as f64 / (ticks as f64 - 1.0);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis(y0 + u * (y1 - y0));
        let start = (inner.x + insets.left.saturating_sub(1)).saturating_sub(label.len() as u16);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label.clone()).style(style),
            Rect {
                x: start,
                y,
                width: label.len() as u16,
                height: 1,
            },
        );
    }

    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        let x_label = Paragraph::new(data.x_label)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(x_label, x_rect);
    }

    let y_label =
        Paragraph::new(data.y_label).style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::domain::{BoundSet, FitQuality, RegionFilter, SeedCompartments, SeirParams, SeriesKind};
    use crate::math::ode::OdeOptions;

    fn fit(code: &str, imd: f64, beta: f64) -> RegionFit {
        RegionFit {
            code: code.to_string(),
            imd,
            population: 10_000,
            series: SeriesKind::Active,
            observed: vec![1.0, 2.0, 4.0, 3.0],
            params: SeirParams {
                beta,
                sigma: 0.3,
                gamma: 0.2,
            },
            stderr: None,
            at_bound: vec![],
            quality: FitQuality {
                chisqr: 1.0,
                reduced_chisqr: Some(1.0),
                rmse: 0.5,
                nfev: 10,
                success: true,
                message: "ok".to_string(),
            },
        }
    }

    fn app(n: usize) -> App {
        let regions: Vec<RegionFit> = (0..n)
            .map(|i| fit(&format!("E0200{i:04}"), i as f64, 0.5 + 0.01 * i as f64))
            .collect();
        let report = analyze(&regions, &RegionFilter::default());
        let results = ResultsFile {
            tool: "seir".to_string(),
            generated_at: chrono::Utc::now(),
            days: 4,
            series: SeriesKind::Active,
            initial: SeirParams::INITIAL_GUESS,
            bounds: BoundSet::default(),
            seed: SeedCompartments::default(),
            rtol: 1e-6,
            atol: 1e-6,
            regions,
            failures: vec![],
        };
        App::new(AnalysisOutput { results, report })
    }

    #[test]
    fn navigation_is_clamped_and_refreshes_curve() {
        let mut app = app(25);
        assert!(app.curve.as_ref().is_some_and(|c| c.len() == 4));

        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected, 0);
        app.handle_key(KeyCode::PageDown);
        assert_eq!(app.selected, 10);
        app.handle_key(KeyCode::End);
        assert_eq!(app.selected, 24);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected, 24);
        app.handle_key(KeyCode::PageUp);
        assert_eq!(app.selected, 14);
        assert!(app.curve.is_some());
    }

    #[test]
    fn curves_are_rebuilt_with_the_run_tolerances() {
        let app = app(1);
        let ode = OdeOptions {
            rtol: 1e-6,
            atol: 1e-6,
            ..OdeOptions::default()
        };
        let expected = crate::report::modeled_curve(&app.results.regions[0], &app.results.seed, &ode).unwrap();
        assert_eq!(app.curve.as_deref(), Some(expected.as_slice()));
    }

    #[test]
    fn view_and_parameter_cycle() {
        let mut app = app(3);
        assert!(!app.handle_key(KeyCode::Tab));
        assert_eq!(app.view, View::Correlation);
        app.handle_key(KeyCode::Char('p'));
        assert_eq!(app.param, ParamName::Sigma);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.view, View::Fit);
        assert!(app.handle_key(KeyCode::Char('q')));
    }

    #[test]
    fn empty_results_do_not_panic() {
        let mut app = app(0);
        assert!(app.curve.is_none());
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::End);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn fit_chart_spans_observed_days() {
        let f = fit("E02000001", 10.0, 0.5);
        let data = fit_chart(&f, Some(&[1.5, 2.5, 3.5, 3.0]));
        assert_eq!(data.x_bounds, [0.0, 3.0]);
        assert_eq!(data.points.len(), 4);
        assert_eq!(data.line[2], (2.0, 3.5));
        assert!(data.y_bounds[0] < 1.0 && data.y_bounds[1] > 4.0);
    }

    #[test]
    fn correlation_chart_highlights_selected_region() {
        let fits = vec![fit("A", 1.0, 1.0), fit("B", 2.0, 2.0), fit("C", 3.0, 3.0)];
        let report = analyze(&fits, &RegionFilter::default());
        let data = correlation_chart(&report, ParamName::Beta, Some("B"));
        assert_eq!(data.points.len(), 3);
        assert_eq!(data.highlight, vec![(2.0, 2.0)]);
        assert_eq!(data.line.len(), 2);
        assert_eq!(data.y_label, "beta");
    }

    #[test]
    fn padded_bounds_handles_flat_and_empty() {
        assert_eq!(padded_bounds([2.0, 2.0].into_iter()), [1.5, 2.5]);
        assert_eq!(padded_bounds(std::iter::empty()), [0.0, 1.0]);
        assert_eq!(padded_bounds([0.0, 10.0, f64::NAN].into_iter()), [-0.5, 10.5]);
    }
}
