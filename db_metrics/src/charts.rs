use std::fmt::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::analysis::AnalysisType;
use crate::error::ReportError;
use crate::quota::QuotaLine;
use crate::report::html_escape;

const USED_COLOR: &str = "#cf597e";
const LEFT_COLOR: &str = "#009392";

/// CARTO "Bold" qualitative palette.
const CARTOCOLORS: [&str; 12] = [
    "#7F3C8D", "#11A579", "#3969AC", "#F2B701", "#E73F74", "#80BA5A", "#E68310", "#008695",
    "#CF1C90", "#f97b72", "#4b4b8f", "#A5AA99",
];

const QUOTA_W: f64 = 480.0;
const QUOTA_H: f64 = 320.0;
const BAR_WIDTH: f64 = 0.85;

const ANALYSIS_W: f64 = 480.0;
const ANALYSIS_ROW_H: f64 = 26.0;

/// Wrap an SVG document into an `<img>` tag with a base64 data URI.
pub fn embed(svg: &str, alt: &str) -> String {
    format!(
        "<img src=\"data:image/svg+xml;base64,{}\" alt=\"{}\">",
        STANDARD.encode(svg.as_bytes()),
        html_escape(alt)
    )
}

fn clamp_pct(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Stacked bars of `% used` (bottom) and `% left` (top) per quota line.
pub fn quota_chart(lines: &[QuotaLine]) -> Result<String, ReportError> {
    let mut out = String::new();
    let (left, right, top, bottom) = (50.0, 20.0, 36.0, 48.0);
    let plot_w = QUOTA_W - left - right;
    let plot_h = QUOTA_H - top - bottom;

    writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\" font-size=\"11\">",
        w = QUOTA_W,
        h = QUOTA_H
    )?;
    writeln!(out, "<rect width=\"100%\" height=\"100%\" fill=\"#fff\"/>")?;

    for tick in [0.0, 25.0, 50.0, 75.0, 100.0] {
        let y = top + plot_h - tick / 100.0 * plot_h;
        writeln!(
            out,
            "<line x1=\"{left}\" y1=\"{y:.1}\" x2=\"{x2:.1}\" y2=\"{y:.1}\" stroke=\"#eee\"/>",
            x2 = left + plot_w
        )?;
        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{ty:.1}\" text-anchor=\"end\">{tick}</text>",
            x = left - 6.0,
            ty = y + 4.0
        )?;
    }
    writeln!(
        out,
        "<text x=\"12\" y=\"{y:.1}\" transform=\"rotate(-90 12 {y:.1})\" text-anchor=\"middle\">%</text>",
        y = top + plot_h / 2.0
    )?;

    let slot = if lines.is_empty() {
        plot_w
    } else {
        plot_w / lines.len() as f64
    };
    let bar_w = slot * BAR_WIDTH;

    for (i, line) in lines.iter().enumerate() {
        let x = left + i as f64 * slot + (slot - bar_w) / 2.0;
        let used_h = clamp_pct(line.pct_used) / 100.0 * plot_h;
        let left_h = clamp_pct(line.pct_left).min(100.0 - clamp_pct(line.pct_used)) / 100.0 * plot_h;
        let used_y = top + plot_h - used_h;

        writeln!(
            out,
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{bar_w:.1}\" height=\"{h:.1}\" fill=\"{LEFT_COLOR}\" stroke=\"#fff\"><title>% Left: {pct}</title></rect>",
            y = used_y - left_h,
            h = left_h,
            pct = line.pct_left
        )?;
        writeln!(
            out,
            "<rect x=\"{x:.1}\" y=\"{used_y:.1}\" width=\"{bar_w:.1}\" height=\"{used_h:.1}\" fill=\"{USED_COLOR}\" stroke=\"#fff\"><title>% Used: {pct}</title></rect>",
            pct = line.pct_used
        )?;
        writeln!(
            out,
            "<text x=\"{cx:.1}\" y=\"{ty:.1}\" text-anchor=\"middle\">{name}</text>",
            cx = x + bar_w / 2.0,
            ty = top + plot_h + 16.0,
            name = html_escape(&line.service_name)
        )?;
    }

    writeln!(
        out,
        "<text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"middle\">Location Data Service</text>",
        x = left + plot_w / 2.0,
        y = QUOTA_H - 8.0
    )?;

    // Legend
    writeln!(out, "<rect x=\"{left}\" y=\"10\" width=\"12\" height=\"12\" fill=\"{LEFT_COLOR}\"/>")?;
    writeln!(out, "<text x=\"{x}\" y=\"20\">% Left</text>", x = left + 16.0)?;
    writeln!(out, "<rect x=\"{x}\" y=\"10\" width=\"12\" height=\"12\" fill=\"{USED_COLOR}\"/>", x = left + 80.0)?;
    writeln!(out, "<text x=\"{x}\" y=\"20\">% Used</text>", x = left + 96.0)?;

    writeln!(out, "</svg>")?;
    Ok(out)
}

/// Horizontal bars with the number of analyses per type.
pub fn analysis_chart(types: &[AnalysisType]) -> Result<String, ReportError> {
    let mut out = String::new();
    let (left, right, top, bottom) = (190.0, 30.0, 10.0, 36.0);
    let rows = types.len().max(1) as f64;
    let height = top + rows * ANALYSIS_ROW_H + bottom;
    let plot_w = ANALYSIS_W - left - right;

    writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{height}\" viewBox=\"0 0 {w} {height}\" font-family=\"sans-serif\" font-size=\"11\">",
        w = ANALYSIS_W
    )?;
    writeln!(out, "<rect width=\"100%\" height=\"100%\" fill=\"#fff\"/>")?;

    if types.is_empty() {
        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"middle\" fill=\"#999\">No analysis found</text>",
            x = ANALYSIS_W / 2.0,
            y = top + ANALYSIS_ROW_H / 2.0 + 4.0
        )?;
    }

    let max_count = types.iter().map(|t| t.count).max().unwrap_or(0);
    for (i, analysis) in types.iter().enumerate() {
        let y = top + i as f64 * ANALYSIS_ROW_H;
        let bar_len = if max_count == 0 {
            0.0
        } else {
            analysis.count as f64 / max_count as f64 * plot_w
        };
        let color = CARTOCOLORS[i % CARTOCOLORS.len()];

        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{ty:.1}\" text-anchor=\"end\">{name}</text>",
            x = left - 6.0,
            ty = y + ANALYSIS_ROW_H / 2.0 + 4.0,
            name = html_escape(&analysis.type_name)
        )?;
        writeln!(
            out,
            "<rect x=\"{left}\" y=\"{by:.1}\" width=\"{bar_len:.1}\" height=\"{bh:.1}\" fill=\"{color}\"/>",
            by = y + 3.0,
            bh = ANALYSIS_ROW_H - 6.0
        )?;
        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{ty:.1}\">{count}</text>",
            x = left + bar_len + 4.0,
            ty = y + ANALYSIS_ROW_H / 2.0 + 4.0,
            count = analysis.count
        )?;
    }

    writeln!(
        out,
        "<text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"middle\">Analysis Count</text>",
        x = left + plot_w / 2.0,
        y = height - 10.0
    )?;
    writeln!(out, "</svg>")?;
    Ok(out)
}
