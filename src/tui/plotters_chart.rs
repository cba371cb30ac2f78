//! Plotters-powered chart widget for Ratatui.
//!
//! Used for both TUI views: observed cases vs the modeled infected curve, and
//! a fitted parameter against IMD with its regression line.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A render-only chart description; all series and bounds are computed by the caller.
pub struct SeirPlottersChart<'a> {
    /// Line series (modeled curve or regression line).
    pub line: &'a [(f64, f64)],
    /// Scatter series (observed cases or per-region estimates).
    pub points: &'a [(f64, f64)],
    /// Highlighted subset of `points` (the selected region).
    pub highlight: &'a [(f64, f64)],
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl Widget for SeirPlottersChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [x0, x1] = self.x_bounds;
        let [y0, y1] = self.y_bounds;
        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(self.x_label)
                .y_desc(self.y_label)
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| (self.fmt_x)(*v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            let line_color = RGBColor(0, 255, 255);
            let highlight_color = RGBColor(255, 255, 0);

            chart.draw_series(LineSeries::new(self.line.iter().copied(), &line_color))?;

            // `Circle` radii are mis-scaled by the ratatui backend; single pixels render cleanly.
            chart.draw_series(self.points.iter().map(|&(x, y)| Pixel::new((x, y), WHITE)))?;
            chart.draw_series(
                self.highlight
                    .iter()
                    .map(|&(x, y)| Pixel::new((x, y), highlight_color)),
            )?;

            Ok(())
        });

        widget.render(area, buf);
    }
}
