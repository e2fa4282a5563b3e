use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{TableProbe, TableRecord};

/// System columns every cartodbfied table carries.
pub const EXPECTED_COLUMNS: [&str; 3] = ["cartodb_id", "the_geom", "the_geom_webmercator"];

/// Minimum number of expected columns and of expected indexes for a base table.
pub const CARTODBFIED_THRESHOLD: usize = 3;

const BYTES_PER_MB: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizedTable {
    pub name: String,
    pub size_mb: f64,
    pub normalized_size: f64,
    pub is_base_table: bool,
    /// Whether the table also shows up in the dataset listing.
    pub registered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizeReport {
    pub base: Vec<SizedTable>,
    pub analysis: Vec<SizedTable>,
    pub total_base_mb: f64,
    pub total_analysis_mb: f64,
}

fn expected_column_count(columns: &[String]) -> usize {
    EXPECTED_COLUMNS
        .iter()
        .filter(|expected| columns.iter().any(|c| c == *expected))
        .count()
}

/// Counts how many of the three expected indexes (primary key, geometry,
/// webmercator geometry) are present among `indexes`.
fn expected_index_count(indexes: &[String]) -> usize {
    let has = |pred: fn(&str) -> bool| indexes.iter().any(|i| pred(i));

    let pkey = has(|i| i.ends_with("_pkey"));
    let geom = has(|i| i.ends_with("the_geom_idx"));
    let webmercator = has(|i| i.ends_with("the_geom_webmercator_idx"));

    [pkey, geom, webmercator].iter().filter(|&&found| found).count()
}

pub fn is_cartodbfied(probe: &TableProbe) -> bool {
    expected_column_count(&probe.columns) >= CARTODBFIED_THRESHOLD
        && expected_index_count(&probe.indexes) >= CARTODBFIED_THRESHOLD
}

/// Rescale sizes to 0..=100 relative to the smallest and largest value.
/// All values map to 0 when they are equal (including a single value).
pub fn normalize(sizes: &[f64]) -> Vec<f64> {
    let min = sizes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = sizes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    sizes
        .iter()
        .map(|&s| if span > 0.0 { (s - min) / span * 100.0 } else { 0.0 })
        .collect()
}

fn by_normalized_desc(a: &SizedTable, b: &SizedTable) -> Ordering {
    b.normalized_size
        .partial_cmp(&a.normalized_size)
        .unwrap_or(Ordering::Equal)
}

/// Size every owned table that has a probe and split the result into base
/// and analysis partitions.
pub fn resolve(owned_tables: &[String], probes: &[TableProbe], datasets: &[TableRecord]) -> SizeReport {
    let registered: HashSet<&str> = datasets.iter().map(|d| d.name.as_str()).collect();
    let owned: HashSet<&str> = owned_tables.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let sized_probes: Vec<&TableProbe> = probes
        .iter()
        .filter(|p| owned.contains(p.name.as_str()))
        .filter(|p| seen.insert(p.name.as_str()))
        .collect();

    let skipped = owned.len().saturating_sub(sized_probes.len());
    if skipped > 0 {
        warn!(skipped = skipped, "Some owned tables could not be sized and are left out");
    }

    let sizes_mb: Vec<f64> = sized_probes
        .iter()
        .map(|p| p.size_bytes as f64 / BYTES_PER_MB)
        .collect();
    let normalized = normalize(&sizes_mb);

    let mut report = SizeReport::default();
    for ((probe, size_mb), normalized_size) in sized_probes.iter().zip(sizes_mb).zip(normalized) {
        let table = SizedTable {
            name: probe.name.clone(),
            size_mb,
            normalized_size,
            is_base_table: is_cartodbfied(probe),
            registered: registered.contains(probe.name.as_str()),
        };
        debug!(
            table = %table.name,
            size_mb = table.size_mb,
            base = table.is_base_table,
            "Sized table"
        );
        if table.is_base_table {
            report.total_base_mb += table.size_mb;
            report.base.push(table);
        } else {
            report.total_analysis_mb += table.size_mb;
            report.analysis.push(table);
        }
    }

    report.base.sort_by(by_normalized_desc);
    report.analysis.sort_by(by_normalized_desc);

    info!(
        base = report.base.len(),
        analysis = report.analysis.len(),
        total_base_mb = report.total_base_mb,
        "Table sizes resolved"
    );

    report
}
