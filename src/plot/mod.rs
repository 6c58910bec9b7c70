//! Diagnostic chart rendering.
//!
//! Every chart draws into its own `Canvas`, an owned RGB buffer that exists
//! only for the duration of the render, then gets PNG-encoded and returned as
//! a base64 string. Text uses an embedded 5x7 bitmap font (uppercased ASCII),
//! which keeps rendering free of any system font dependency.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use ndarray::{Array1, Array2};

use crate::error::{Result, StudioError};

mod font;

pub type Rgb = (u8, u8, u8);

pub const WHITE: Rgb = (255, 255, 255);
pub const BLACK: Rgb = (20, 20, 20);
pub const GRAY: Rgb = (160, 160, 160);
pub const LIGHT_GRAY: Rgb = (230, 230, 230);
pub const BLUE: Rgb = (66, 133, 244);
pub const ORANGE: Rgb = (244, 160, 66);

/// Color cycle for multi-series charts.
pub const PALETTE: [Rgb; 8] = [
    (66, 133, 244),
    (219, 68, 55),
    (244, 180, 0),
    (15, 157, 88),
    (171, 71, 188),
    (0, 172, 193),
    (255, 112, 67),
    (94, 110, 255),
];

/// Owned drawing surface for a single render.
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    buf: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let mut buf = vec![0u8; (width * height * 3) as usize];
        for px in buf.chunks_exact_mut(3) {
            px[0] = WHITE.0;
            px[1] = WHITE.1;
            px[2] = WHITE.2;
        }
        Self { width, height, buf }
    }

    pub fn put_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
        self.buf[idx] = color.0;
        self.buf[idx + 1] = color.1;
        self.buf[idx + 2] = color.2;
    }

    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        for yy in y..y + h {
            for xx in x..x + w {
                self.put_pixel(xx, yy, color);
            }
        }
    }

    pub fn rect_outline(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb) {
        for xx in x..x + w {
            self.put_pixel(xx, y, color);
            self.put_pixel(xx, y + h - 1, color);
        }
        for yy in y..y + h {
            self.put_pixel(x, yy, color);
            self.put_pixel(x + w - 1, yy, color);
        }
    }

    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb) {
        // Bresenham
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            self.put_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn filled_circle(&mut self, cx: i64, cy: i64, r: i64, color: Rgb) {
        for y in -r..=r {
            for x in -r..=r {
                if x * x + y * y <= r * r {
                    self.put_pixel(cx + x, cy + y, color);
                }
            }
        }
    }

    /// Draw text at pixel scale `scale`. Lowercase maps to uppercase glyphs.
    pub fn text(&mut self, x: i64, y: i64, s: &str, scale: i64, color: Rgb) {
        let mut cursor = x;
        for ch in s.chars() {
            let glyph = font::glyph(ch);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if bits & (1 << (4 - col)) != 0 {
                        self.fill_rect(
                            cursor + col as i64 * scale,
                            y + row as i64 * scale,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
            cursor += 6 * scale;
        }
    }

    pub fn text_width(s: &str, scale: i64) -> i64 {
        s.chars().count() as i64 * 6 * scale
    }

    pub fn text_centered(&mut self, cx: i64, y: i64, s: &str, scale: i64, color: Rgb) {
        self.text(cx - Self::text_width(s, scale) / 2, y, s, scale, color);
    }

    /// Encode the buffer as a base64 PNG string.
    pub fn into_base64_png(self) -> Result<String> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&self.buf, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| StudioError::PlotError(e.to_string()))?;
        Ok(STANDARD.encode(png))
    }
}

fn format_value(v: f64) -> String {
    if v.abs() >= 1000.0 {
        format!("{v:.0}")
    } else if v.abs() >= 10.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.2}")
    }
}

/// Confusion-matrix heatmap, darker cells for larger counts.
pub fn confusion_heatmap(matrix: &Array2<u64>, classes: &[i64]) -> Result<String> {
    let n = classes.len().max(1);
    let cell = (360 / n as i64).clamp(30, 120);
    let margin = 60i64;
    let side = margin * 2 + cell * n as i64;
    let mut canvas = Canvas::new(side as u32, (side + 30) as u32);

    canvas.text_centered(side / 2, 12, "CONFUSION MATRIX", 2, BLACK);

    let max_count = matrix.iter().cloned().max().unwrap_or(1).max(1);
    for i in 0..n {
        for j in 0..n {
            let count = matrix[[i, j]];
            let intensity = (count as f64 / max_count as f64 * 200.0) as u8;
            let color = (255 - intensity, 255 - intensity / 3, 255u8);
            let x = margin + j as i64 * cell;
            let y = margin + i as i64 * cell;
            canvas.fill_rect(x, y, cell, cell, color);
            canvas.rect_outline(x, y, cell, cell, GRAY);
            let label = count.to_string();
            let text_color = if intensity > 120 { WHITE } else { BLACK };
            canvas.text_centered(x + cell / 2, y + cell / 2 - 3, &label, 1, text_color);
        }
    }

    for (i, class) in classes.iter().enumerate() {
        let label = class.to_string();
        // Row (true) labels on the left, column (predicted) below
        canvas.text(
            margin - 8 - Canvas::text_width(&label, 1),
            margin + i as i64 * cell + cell / 2 - 3,
            &label,
            1,
            BLACK,
        );
        canvas.text_centered(
            margin + i as i64 * cell + cell / 2,
            margin + n as i64 * cell + 8,
            &label,
            1,
            BLACK,
        );
    }
    canvas.text_centered(side / 2, side - 14, "PREDICTED", 1, BLACK);

    canvas.into_base64_png()
}

/// ROC curve with the chance diagonal and the AUC in the title.
pub fn roc_plot(points: &[(f64, f64)], auc: f64) -> Result<String> {
    let (w, h) = (480i64, 420i64);
    let margin = 50i64;
    let mut canvas = Canvas::new(w as u32, h as u32);

    canvas.text_centered(w / 2, 10, &format!("ROC CURVE (AUC = {auc:.4})"), 2, BLACK);

    let plot_w = w - 2 * margin;
    let plot_h = h - 2 * margin - 20;
    let origin_y = h - margin;
    canvas.rect_outline(margin, margin + 20, plot_w, plot_h, GRAY);

    let to_px = |fx: f64, fy: f64| -> (i64, i64) {
        (
            margin + (fx * plot_w as f64) as i64,
            origin_y - (fy * plot_h as f64) as i64,
        )
    };

    // Chance diagonal
    let (x0, y0) = to_px(0.0, 0.0);
    let (x1, y1) = to_px(1.0, 1.0);
    canvas.line(x0, y0, x1, y1, LIGHT_GRAY);

    for pair in points.windows(2) {
        let (ax, ay) = to_px(pair[0].0, pair[0].1);
        let (bx, by) = to_px(pair[1].0, pair[1].1);
        canvas.line(ax, ay, bx, by, BLUE);
    }

    canvas.text_centered(w / 2, h - 16, "FALSE POSITIVE RATE", 1, BLACK);
    canvas.text(6, margin + 20, "TPR", 1, BLACK);
    canvas.into_base64_png()
}

/// Clip a label to `max_chars` characters. Column and algorithm names come
/// straight from user data and may be non-ASCII, so clipping must happen on
/// character boundaries, not byte offsets.
fn clip_label(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Horizontal bar chart of feature importances, largest first, top 15.
pub fn importance_bar(names: &[String], values: &Array1<f64>) -> Result<String> {
    if names.len() != values.len() || names.is_empty() {
        return Err(StudioError::PlotError(
            "Importance names and values must match and be non-empty".to_string(),
        ));
    }
    let mut pairs: Vec<(&String, f64)> = names.iter().zip(values.iter().cloned()).collect();
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pairs.truncate(15);

    let row_h = 26i64;
    let label_w = 140i64;
    let (w, h) = (560i64, 50 + row_h * pairs.len() as i64 + 10);
    let mut canvas = Canvas::new(w as u32, h as u32);
    canvas.text_centered(w / 2, 10, "FEATURE IMPORTANCE", 2, BLACK);

    let max_v = pairs
        .iter()
        .map(|(_, v)| *v)
        .fold(0.0f64, f64::max)
        .max(1e-12);
    let bar_area = w - label_w - 80;

    for (i, (name, value)) in pairs.iter().enumerate() {
        let y = 44 + i as i64 * row_h;
        let label = clip_label(name, 20);
        canvas.text(8, y + 6, &label, 1, BLACK);
        let bar_w = ((value / max_v) * bar_area as f64) as i64;
        canvas.fill_rect(label_w, y, bar_w.max(1), row_h - 8, BLUE);
        canvas.text(label_w + bar_w + 6, y + 6, &format!("{value:.3}"), 1, BLACK);
    }
    canvas.into_base64_png()
}

/// Actual-vs-predicted scatter for regression, with the identity line.
pub fn actual_vs_predicted(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<String> {
    if y_true.is_empty() {
        return Err(StudioError::PlotError("No points to plot".to_string()));
    }
    let (w, h) = (480i64, 440i64);
    let margin = 50i64;
    let mut canvas = Canvas::new(w as u32, h as u32);
    canvas.text_centered(w / 2, 10, "ACTUAL VS PREDICTED", 2, BLACK);

    let lo = y_true
        .iter()
        .chain(y_pred.iter())
        .cloned()
        .fold(f64::MAX, f64::min);
    let hi = y_true
        .iter()
        .chain(y_pred.iter())
        .cloned()
        .fold(f64::MIN, f64::max);
    let span = (hi - lo).max(1e-12);

    let plot_w = w - 2 * margin;
    let plot_h = h - 2 * margin - 20;
    let origin_y = h - margin;
    canvas.rect_outline(margin, margin + 20, plot_w, plot_h, GRAY);

    let to_px = |vx: f64, vy: f64| -> (i64, i64) {
        (
            margin + (((vx - lo) / span) * plot_w as f64) as i64,
            origin_y - (((vy - lo) / span) * plot_h as f64) as i64,
        )
    };

    let (x0, y0) = to_px(lo, lo);
    let (x1, y1) = to_px(hi, hi);
    canvas.line(x0, y0, x1, y1, GRAY);

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let (px, py) = to_px(*t, *p);
        canvas.filled_circle(px, py, 3, BLUE);
    }

    canvas.text_centered(w / 2, h - 16, "ACTUAL", 1, BLACK);
    canvas.text(6, margin + 20, "PRED", 1, BLACK);
    canvas.into_base64_png()
}

/// Bar chart of per-cluster member counts. Noise shows as cluster -1.
pub fn cluster_counts(sizes: &BTreeMap<i64, usize>) -> Result<String> {
    if sizes.is_empty() {
        return Err(StudioError::PlotError("No clusters to plot".to_string()));
    }
    let n = sizes.len() as i64;
    let bar_w = (400 / n).clamp(24, 90);
    let gap = 14i64;
    let margin = 50i64;
    let (w, h) = (margin * 2 + n * (bar_w + gap), 380i64);
    let mut canvas = Canvas::new(w as u32, h as u32);
    canvas.text_centered(w / 2, 10, "CLUSTER SIZES", 2, BLACK);

    let max_count = *sizes.values().max().unwrap_or(&1) as f64;
    let plot_h = (h - 120) as f64;
    let base_y = h - 60;

    for (i, (label, count)) in sizes.iter().enumerate() {
        let x = margin + i as i64 * (bar_w + gap);
        let bar_h = ((*count as f64 / max_count) * plot_h) as i64;
        let color = if *label == -1 {
            GRAY
        } else {
            PALETTE[(*label).rem_euclid(PALETTE.len() as i64) as usize]
        };
        canvas.fill_rect(x, base_y - bar_h, bar_w, bar_h, color);
        canvas.text_centered(x + bar_w / 2, base_y - bar_h - 12, &count.to_string(), 1, BLACK);
        let name = if *label == -1 {
            "NOISE".to_string()
        } else {
            label.to_string()
        };
        canvas.text_centered(x + bar_w / 2, base_y + 8, &name, 1, BLACK);
    }
    canvas.text_centered(w / 2, h - 24, "CLUSTER", 1, BLACK);
    canvas.into_base64_png()
}

/// Ranked bar chart comparing algorithms on a single metric, best first.
pub fn comparison_bar(entries: &[(String, f64)], metric: &str) -> Result<String> {
    if entries.len() < 2 {
        return Err(StudioError::PlotError(
            "Comparison needs at least two entries".to_string(),
        ));
    }
    let n = entries.len() as i64;
    let bar_w = (520 / n).clamp(40, 120);
    let gap = 20i64;
    let margin = 50i64;
    let (w, h) = (margin * 2 + n * (bar_w + gap), 420i64);
    let mut canvas = Canvas::new(w as u32, h as u32);
    canvas.text_centered(w / 2, 10, &format!("MODEL COMPARISON ({})", metric.to_uppercase()), 2, BLACK);

    let max_v = entries
        .iter()
        .map(|(_, v)| v.abs())
        .fold(0.0f64, f64::max)
        .max(1e-12);
    let plot_h = (h - 140) as f64;
    let base_y = h - 70;

    for (i, (name, value)) in entries.iter().enumerate() {
        let x = margin + i as i64 * (bar_w + gap);
        let bar_h = ((value.abs() / max_v) * plot_h) as i64;
        canvas.fill_rect(x, base_y - bar_h, bar_w, bar_h, PALETTE[i as usize % PALETTE.len()]);
        canvas.text_centered(x + bar_w / 2, base_y - bar_h - 12, &format_value(*value), 1, BLACK);
        let label = clip_label(name, 14);
        canvas.text_centered(x + bar_w / 2, base_y + 8, &label, 1, BLACK);
    }
    canvas.into_base64_png()
}

/// Metric table image: header row plus one row per algorithm.
pub fn metrics_table(headers: &[String], rows: &[Vec<String>]) -> Result<String> {
    if headers.is_empty() || rows.is_empty() {
        return Err(StudioError::PlotError("Empty table".to_string()));
    }
    let col_w = 110i64;
    let row_h = 28i64;
    let margin = 20i64;
    let w = margin * 2 + col_w * headers.len() as i64;
    let h = margin * 2 + row_h * (rows.len() as i64 + 1) + 24;
    let mut canvas = Canvas::new(w as u32, h as u32);
    canvas.text_centered(w / 2, 8, "METRICS SUMMARY", 2, BLACK);

    let top = margin + 24;
    // Header row
    canvas.fill_rect(margin, top, col_w * headers.len() as i64, row_h, LIGHT_GRAY);
    for (j, header) in headers.iter().enumerate() {
        let x = margin + j as i64 * col_w;
        let label = clip_label(&header.to_uppercase(), 16);
        canvas.text_centered(x + col_w / 2, top + 10, &label, 1, BLACK);
    }

    for (i, row) in rows.iter().enumerate() {
        let y = top + row_h * (i as i64 + 1);
        for (j, cell) in row.iter().enumerate() {
            let x = margin + j as i64 * col_w;
            let label = clip_label(cell, 16);
            canvas.text_centered(x + col_w / 2, y + 10, &label, 1, BLACK);
        }
    }

    // Grid lines
    for i in 0..=rows.len() as i64 + 1 {
        let y = top + i * row_h;
        canvas.line(margin, y, w - margin, y, GRAY);
    }
    for j in 0..=headers.len() as i64 {
        let x = margin + j * col_w;
        canvas.line(x, top, x, top + row_h * (rows.len() as i64 + 1), GRAY);
    }
    canvas.into_base64_png()
}
