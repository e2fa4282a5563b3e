use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::sizes::SizedTable;

/// Short identifier embedded in analysis table names, paired with the
/// analysis type that produced the table.
pub static ANALYSIS_TYPES: [(&str, &str); 44] = [
    ("b194a8f896", "aggregate-intersection"),
    ("5f80bdff9d", "bounding-box"),
    ("b7636131b5", "bounding-circle"),
    ("2f13a3dbd7", "buffer"),
    ("ae64186757", "centroid"),
    ("4bd65e58e4", "closest"),
    ("259cf96ece", "concave-hull"),
    ("779051ec8e", "contour"),
    ("05234e7c2a", "convex-hull"),
    ("a08f3b6124", "data-observatory-measure"),
    ("cd60938c7b", "data-observatory-multiple-measures"),
    ("e85ed857c2", "deprecated-sql-function"),
    ("83d60eb9fa", "filter-by-node-column"),
    ("440d2c1487", "filter-category"),
    ("f15fa0b618", "filter-grouped-rank"),
    ("942b6fec82", "filter-range"),
    ("43155891da", "filter-rank"),
    ("a5bdb274e8", "georeference-admin-region"),
    ("d5b2dd1672", "georeference-city"),
    ("792d8938e3", "georeference-country"),
    ("d5b2274cdf", "georeference-ip-address"),
    ("0623244fc4", "georeference-long-lat"),
    ("1f7c6f9f43", "georeference-postal-code"),
    ("1ea6dec9f3", "georeference-street-address"),
    ("93ab69856c", "gravity"),
    ("971639c870", "intersection"),
    ("3c835a874c", "kmeans"),
    ("9fd29bd5c0", "line-sequential"),
    ("9e88a1147e", "line-source-to-target"),
    ("be2ff62ce9", "line-to-column"),
    ("eca516b80b", "line-to-single-point"),
    ("49ca809a90", "link-by-line"),
    ("c38cb847a0", "merge"),
    ("91837cbb3c", "moran"),
    ("2e94d3858c", "point-in-polygon"),
    ("d52251dc01", "population-in-area"),
    ("a627e132c2", "routing-sequential"),
    ("b70cf71482", "routing-to-layer-all-to-all"),
    ("2923729eb9", "routing-to-single-point"),
    ("7530d60ffc", "sampling"),
    ("fd83c76763", "source"),
    ("9c3b798f46", "spatial-markov-trend"),
    ("112d4fc091", "trade-area"),
    ("1d85314d7a", "weighted-centroid"),
];

const NAME_SEGMENTS: usize = 4;
const ANALYSIS_MARKER: &str = "analysis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisType {
    pub type_name: String,
    pub count: usize,
    pub total_size_mb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Per-type aggregates, largest count first.
    pub types: Vec<AnalysisType>,
    /// Every analysis table, typed or not.
    pub total_analysis: usize,
    pub total_size_analysis_mb: f64,
}

/// Pull the analysis identifier out of a table name.
///
/// The name is split into at most four `_` segments. The identifier is the
/// segment after an `analysis` marker when there is one (`analysis_<id>_<hash>`,
/// `cdb_analysis_<id>_<hash>`), otherwise the second segment.
pub fn extract_identifier(table_name: &str) -> Option<&str> {
    let segments: Vec<&str> = table_name.splitn(NAME_SEGMENTS, '_').collect();

    let idx = match segments.iter().position(|s| *s == ANALYSIS_MARKER) {
        Some(marker) => marker + 1,
        None => 1,
    };

    segments.get(idx).copied().filter(|s| !s.is_empty())
}

pub fn lookup_type(identifier: &str) -> Option<&'static str> {
    ANALYSIS_TYPES
        .iter()
        .find(|(id, _)| *id == identifier)
        .map(|(_, type_name)| *type_name)
}

pub fn resolve_type(table_name: &str) -> Option<&'static str> {
    extract_identifier(table_name).and_then(lookup_type)
}

pub fn summarize(analysis_tables: &[SizedTable]) -> AnalysisSummary {
    if analysis_tables.is_empty() {
        info!("No analysis found");
        return AnalysisSummary::default();
    }

    let mut by_type: HashMap<&'static str, AnalysisType> = HashMap::new();
    for table in analysis_tables {
        let Some(type_name) = resolve_type(&table.name) else {
            debug!(table = %table.name, "Analysis table with unknown identifier");
            continue;
        };
        let entry = by_type.entry(type_name).or_insert_with(|| AnalysisType {
            type_name: type_name.to_string(),
            count: 0,
            total_size_mb: 0.0,
        });
        entry.count += 1;
        entry.total_size_mb += table.size_mb;
    }

    let mut types: Vec<AnalysisType> = by_type.into_values().collect();
    types.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.type_name.cmp(&b.type_name))
    });

    let summary = AnalysisSummary {
        types,
        total_analysis: analysis_tables.len(),
        total_size_analysis_mb: analysis_tables.iter().map(|t| t.size_mb).sum(),
    };

    info!(
        analysis = summary.total_analysis,
        types = summary.types.len(),
        "Analysis tables resolved"
    );

    summary
}

/// Share of all analysis tables that resolved to `analysis`.
pub fn type_share(summary: &AnalysisSummary, analysis: &AnalysisType) -> f64 {
    crate::model::percentage(analysis.count as f64, summary.total_analysis as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_table(name: &str, size_mb: f64) -> SizedTable {
        SizedTable {
            name: name.to_string(),
            size_mb,
            normalized_size: 0.0,
            is_base_table: false,
            registered: false,
        }
    }

    #[test]
    fn test_lookup_table_has_unique_identifiers() {
        let mut ids: Vec<&str> = ANALYSIS_TYPES.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), ANALYSIS_TYPES.len());
    }

    #[test]
    fn test_extract_identifier() {
        assert_eq!(extract_identifier("analysis_b194a8f896_abcdef"), Some("b194a8f896"));
        assert_eq!(extract_identifier("cdb_analysis_b194a8f896_abcdef"), Some("b194a8f896"));
        assert_eq!(extract_identifier("foo_2f13a3dbd7_bar_baz_qux"), Some("2f13a3dbd7"));
        assert_eq!(extract_identifier("plain"), None);
        assert_eq!(extract_identifier("analysis"), None);
    }

    #[test]
    fn test_resolve_known_and_unknown_types() {
        assert_eq!(resolve_type("cdb_analysis_b194a8f896_abcdef"), Some("aggregate-intersection"));
        assert_eq!(resolve_type("analysis_1d85314d7a_0001"), Some("weighted-centroid"));
        assert_eq!(resolve_type("cdb_analysis_zzzzzzzzzz_abcdef"), None);
    }

    #[test]
    fn test_unknown_identifier_counts_only_in_raw_totals() {
        let tables = vec![
            analysis_table("cdb_analysis_b194a8f896_abcdef", 1.5),
            analysis_table("cdb_analysis_zzzzzzzzzz_abcdef", 2.0),
        ];

        let summary = summarize(&tables);

        assert_eq!(summary.total_analysis, 2);
        assert!((summary.total_size_analysis_mb - 3.5).abs() < 1e-9);
        assert_eq!(summary.types.len(), 1);
        assert_eq!(summary.types[0].type_name, "aggregate-intersection");
        assert_eq!(summary.types[0].count, 1);
        assert!((summary.types[0].total_size_mb - 1.5).abs() < 1e-9);
        assert!((type_share(&summary, &summary.types[0]) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_types_are_ordered_by_count() {
        let tables = vec![
            analysis_table("analysis_2f13a3dbd7_1", 1.0),
            analysis_table("analysis_c38cb847a0_1", 1.0),
            analysis_table("analysis_c38cb847a0_2", 1.0),
            analysis_table("analysis_ae64186757_1", 1.0),
        ];

        let summary = summarize(&tables);

        let names: Vec<&str> = summary.types.iter().map(|t| t.type_name.as_str()).collect();
        assert_eq!(names, vec!["merge", "buffer", "centroid"]);
    }

    #[test]
    fn test_empty_partition() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_analysis, 0);
        assert_eq!(summary.total_size_analysis_mb, 0.0);
        assert!(summary.types.is_empty());
    }
}
