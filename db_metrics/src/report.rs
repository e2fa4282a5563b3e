use std::fmt::Write;

use serde::Serialize;
use tracing::info;

use crate::analysis::{self, AnalysisSummary};
use crate::charts;
use crate::classify::{self, ClassifiedTable, DatasetSummary};
use crate::error::ReportError;
use crate::model::{AccountSnapshot, MapRecord};
use crate::quota::{self, QuotaLine};
use crate::rank::{top_n, TOP_N};
use crate::sizes::{self, SizedTable};

/// Knobs of the aggregation that come from the command line.
#[derive(Debug, Clone)]
pub struct MetricsOptions {
    pub user_quota: u64,
    pub excluded_services: Vec<String>,
}

/// Every numeric aggregate shown in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetrics {
    pub total_maps: usize,
    pub top_maps_by_date: Vec<MapRecord>,
    pub datasets: DatasetSummary,
    pub top_datasets_by_date: Vec<ClassifiedTable>,
    pub top_tables_by_size: Vec<SizedTable>,
    pub base_tables: usize,
    pub total_size_tables_mb: f64,
    pub analysis: AnalysisSummary,
    pub quota: Vec<QuotaLine>,
}

/// Everything the HTML template needs, charts included.
#[derive(Debug, Clone)]
pub struct ReportModel {
    pub user: String,
    pub organization: Option<String>,
    pub generated_at: String,
    pub metrics: ReportMetrics,
    pub quota_chart: String,
    pub analysis_chart: String,
}

impl ReportModel {
    pub fn new(
        user: &str,
        organization: Option<&str>,
        generated_at: String,
        metrics: ReportMetrics,
    ) -> Result<Self, ReportError> {
        info!("Plotting LDS and analysis figures...");
        let quota_chart = charts::embed(&charts::quota_chart(&metrics.quota)?, "Quota usage");
        let analysis_chart = charts::embed(
            &charts::analysis_chart(&metrics.analysis.types)?,
            "Analysis types",
        );

        Ok(Self {
            user: user.to_string(),
            organization: organization.map(str::to_string),
            generated_at,
            metrics,
            quota_chart,
            analysis_chart,
        })
    }
}

/// Run the aggregation stages over a snapshot. Pure: the same snapshot always
/// yields the same metrics.
pub fn build_metrics(snapshot: &AccountSnapshot, options: &MetricsOptions) -> ReportMetrics {
    let mut maps = snapshot.maps.clone();
    maps.sort_by(|a, b| b.last_touched().cmp(&a.last_touched()));
    let top_maps_by_date = top_n(&maps, TOP_N, |m| m.created_at)
        .into_iter()
        .cloned()
        .collect();

    let classified = classify::classify(&snapshot.datasets);
    let datasets = classify::summarize(&classified);
    let top_datasets_by_date = top_n(&classified, TOP_N, |t| t.created_at)
        .into_iter()
        .cloned()
        .collect();

    let size_report = sizes::resolve(&snapshot.owned_tables, &snapshot.probes, &snapshot.datasets);
    let top_tables_by_size = top_n(&size_report.base, TOP_N, |t| t.size_mb)
        .into_iter()
        .cloned()
        .collect();

    let analysis = analysis::summarize(&size_report.analysis);

    let quota = quota::aggregate(
        &snapshot.quotas,
        &options.excluded_services,
        options.user_quota,
        size_report.total_base_mb,
    );

    ReportMetrics {
        total_maps: maps.len(),
        top_maps_by_date,
        datasets,
        top_datasets_by_date,
        top_tables_by_size,
        base_tables: size_report.base.len(),
        total_size_tables_mb: size_report.total_base_mb,
        analysis,
        quota,
    }
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn mb(value: f64) -> String {
    format!("{value:.2}")
}

fn maps_table(maps: &[MapRecord]) -> Result<String, ReportError> {
    let mut out = String::new();
    writeln!(out, "<table><thead><tr><th>Name</th><th>Created</th><th>URL</th></tr></thead><tbody>")?;
    for map in maps {
        writeln!(
            out,
            "<tr><td>{name}</td><td>{created}</td><td><a href=\"{url}\">{url}</a></td></tr>",
            name = html_escape(&map.name),
            created = map.created_at.format("%Y-%m-%d %H:%M"),
            url = html_escape(&map.url)
        )?;
    }
    writeln!(out, "</tbody></table>")?;
    Ok(out)
}

fn analysis_table(summary: &AnalysisSummary) -> Result<String, ReportError> {
    let mut out = String::new();
    writeln!(
        out,
        "<table><thead><tr><th>Analysis Type</th><th>Analysis Count</th><th>%</th><th>Size (MB)</th></tr></thead><tbody>"
    )?;
    for t in &summary.types {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&t.type_name),
            t.count,
            analysis::type_share(summary, t),
            mb(t.total_size_mb)
        )?;
    }
    writeln!(out, "</tbody></table>")?;
    Ok(out)
}

fn quota_table(lines: &[QuotaLine]) -> Result<String, ReportError> {
    let mut out = String::new();
    writeln!(
        out,
        "<table><thead><tr><th>Service</th><th>Monthly Quota</th><th>Provider</th><th>Used</th><th>% Used</th><th>Left</th><th>% Left</th></tr></thead><tbody>"
    )?;
    for l in lines {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&l.service_name),
            l.monthly_quota,
            html_escape(&l.provider),
            l.used,
            l.pct_used,
            l.left,
            l.pct_left
        )?;
    }
    writeln!(out, "</tbody></table>")?;
    Ok(out)
}

fn tables_by_size(tables: &[SizedTable]) -> Result<String, ReportError> {
    let mut out = String::new();
    writeln!(
        out,
        "<table><caption>Largest tables</caption><thead><tr><th>Name</th><th>Size (MB)</th><th>Relative size</th><th>Dataset</th></tr></thead><tbody>"
    )?;
    for t in tables {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
            html_escape(&t.name),
            mb(t.size_mb),
            t.normalized_size,
            if t.registered { "Yes" } else { "No" }
        )?;
    }
    writeln!(out, "</tbody></table>")?;
    Ok(out)
}

fn datasets_by_date(tables: &[ClassifiedTable]) -> Result<String, ReportError> {
    let mut out = String::new();
    writeln!(
        out,
        "<table><caption>Latest datasets</caption><thead><tr><th>Name</th><th>Created</th><th>Privacy</th><th>Geometry</th><th>Sync</th></tr></thead><tbody>"
    )?;
    for t in tables {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&t.name),
            t.created_at.format("%Y-%m-%d %H:%M"),
            t.privacy.as_str(),
            html_escape(&t.geom_type),
            if t.is_synced { "Yes" } else { "No" }
        )?;
    }
    writeln!(out, "</tbody></table>")?;
    Ok(out)
}

/// Render the report as a standalone HTML document.
pub fn render(model: &ReportModel) -> Result<String, ReportError> {
    info!("Rendering HTML report...");
    let m = &model.metrics;

    let storage = quota::storage_line(&m.quota)
        .ok_or_else(|| ReportError::Render("quota table has no storage line".to_string()))?;

    let json_data = serde_json::to_string(m)
        .map_err(|e| ReportError::Render(format!("failed to serialize metrics: {e}")))?
        .replace('<', "\\u003c");

    let org = model
        .organization
        .as_deref()
        .map(|o| format!(" from {}", html_escape(o)))
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CARTO Database Metrics Report</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; background: #f5f5f5; color: #2e3c43; }}
        header {{ background: #162945; color: white; padding: 16px 24px; }}
        header h1 {{ margin: 0; font-size: 1.4rem; }}
        header .meta {{ color: #c4c8cc; font-size: 0.9rem; margin-top: 4px; }}
        .content {{ display: grid; grid-template-columns: 1fr 1.3fr 1fr; gap: 16px; padding: 16px; }}
        .column h1 {{ font-size: 1.1rem; margin: 0 0 12px 0; }}
        .box {{ background: white; border-radius: 6px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); padding: 14px; margin-bottom: 14px; }}
        .box h2 {{ font-size: 1rem; margin: 0 0 8px 0; }}
        ul {{ margin: 0; padding-left: 18px; }}
        li {{ margin: 3px 0; }}
        table {{ width: 100%; border-collapse: collapse; font-size: 0.8rem; margin-top: 8px; }}
        caption {{ text-align: left; font-weight: 600; padding-bottom: 4px; }}
        th, td {{ text-align: left; padding: 4px 6px; border-bottom: 1px solid #eee; word-break: break-all; }}
        th {{ background: #fafafa; }}
        .used {{ color: #cf597e; }}
        .left {{ color: #009392; }}
        img {{ max-width: 100%; }}
    </style>
</head>
<body>
    <header>
        <h1>CARTO Metrics Report</h1>
        <div class="meta">{user}{org} at {today}</div>
    </header>
    <div class="content">
        <section class="column">
            <h1>Maps and Analysis</h1>
            <div class="box" id="maps">
                <h2>Maps</h2>
                <p>Number of maps: {total_maps}</p>
                {maps_table}
            </div>
            <div class="box" id="analysis">
                <h2>Analysis</h2>
                <ul>
                    <li>Number of analyses: {total_analysis}</li>
                    <li>Analyses Size: {total_size_analysis} MB</li>
                </ul>
                {analysis_table}
                <div id="analysis-fig">{analysis_chart}</div>
            </div>
        </section>
        <section class="column">
            <h1>Storage Quota &amp; LDS</h1>
            <div class="box" id="storage">
                <h2>Storage Quota</h2>
                <ul>
                    <li>Account Storage: {real_storage} MB</li>
                    <li class="used">Used Quota: {used_storage} MB, {pc_used} %</li>
                    <li class="left">Quota Left: {left_storage} MB, {pc_left} %</li>
                </ul>
            </div>
            <div class="box" id="lds">
                <h2>Location Data Services</h2>
                {quota_table}
                <div id="lds-fig">{quota_chart}</div>
            </div>
        </section>
        <section class="column">
            <h1>Datasets</h1>
            <div class="box" id="datasets-summary">
                <h2>Datasets Summary</h2>
                <ul>
                    <li>Number of tables: {total_dsets}</li>
                    <li>Sync tables: {sync}</li>
                    <li>Tables Size: {total_size_tbls} MB</li>
                </ul>
            </div>
            <div class="box" id="privacy">
                <h2>Privacy</h2>
                <ul>
                    <li>Private: {private} tables ({pct_private} %)</li>
                    <li>Shared with link: {link} tables ({pct_link} %)</li>
                    <li>Public: {public} tables ({pct_public} %)</li>
                </ul>
            </div>
            <div class="box" id="geometry">
                <h2>Geometry</h2>
                <p>Number of geocoded tables: {geo} ({pct_geo} %)</p>
                <ul>
                    <li>Points: {points} tables</li>
                    <li>Lines: {lines} tables</li>
                    <li>Polygons: {polys} tables</li>
                </ul>
                <p>Number of non-geocoded tables: {none_tbls}</p>
            </div>
            <div class="box" id="tables-size">{tables_size}</div>
            <div class="box" id="tables-date">{tables_date}</div>
        </section>
    </div>
    <script type="application/json" id="report-data">{json_data}</script>
</body>
</html>
"#,
        user = html_escape(&model.user),
        org = org,
        today = html_escape(&model.generated_at),
        total_maps = m.total_maps,
        maps_table = maps_table(&m.top_maps_by_date)?,
        total_analysis = m.analysis.total_analysis,
        total_size_analysis = mb(m.analysis.total_size_analysis_mb),
        analysis_table = analysis_table(&m.analysis)?,
        analysis_chart = model.analysis_chart,
        real_storage = storage.monthly_quota,
        used_storage = storage.used,
        pc_used = storage.pct_used,
        left_storage = storage.left,
        pc_left = storage.pct_left,
        quota_table = quota_table(&m.quota)?,
        quota_chart = model.quota_chart,
        total_dsets = m.datasets.total,
        sync = m.datasets.synced,
        total_size_tbls = mb(m.total_size_tables_mb),
        private = m.datasets.private,
        pct_private = m.datasets.pct_private,
        link = m.datasets.link,
        pct_link = m.datasets.pct_link,
        public = m.datasets.public,
        pct_public = m.datasets.pct_public,
        geo = m.datasets.geocoded,
        pct_geo = m.datasets.pct_geocoded,
        points = m.datasets.points,
        lines = m.datasets.lines,
        polys = m.datasets.polygons,
        none_tbls = m.datasets.non_geocoded,
        tables_size = tables_by_size(&m.top_tables_by_size)?,
        tables_date = datasets_by_date(&m.top_datasets_by_date)?,
        json_data = json_data,
    );

    Ok(html)
}
