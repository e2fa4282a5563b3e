use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::model::{percentage, Privacy, TableRecord};

/// Sentinel geometry tag for datasets without a geometry column.
pub const NO_GEOMETRY: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    /// Map a PostGIS geometry tag (`ST_Point`, `MultiPolygon`, ...) to a kind.
    /// Only the five geocoded types are recognised.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let bare = tag.strip_prefix("ST_").unwrap_or(tag);
        match bare {
            "Point" => Some(GeometryKind::Point),
            "LineString" | "MultiLineString" => Some(GeometryKind::Line),
            "Polygon" | "MultiPolygon" => Some(GeometryKind::Polygon),
            _ => None,
        }
    }
}

/// A dataset with its derived classification fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedTable {
    pub name: String,
    pub privacy: Privacy,
    pub created_at: DateTime<Utc>,
    pub geom_type: String,
    pub kind: Option<GeometryKind>,
    pub is_geocoded: bool,
    pub is_synced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total: usize,
    pub private: usize,
    pub link: usize,
    pub public: usize,
    pub pct_private: f64,
    pub pct_link: f64,
    pub pct_public: f64,
    pub geocoded: usize,
    pub non_geocoded: usize,
    pub pct_geocoded: f64,
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub synced: usize,
}

pub fn classify_table(record: &TableRecord) -> ClassifiedTable {
    let geom_type = record
        .geometry_types
        .first()
        .cloned()
        .unwrap_or_else(|| NO_GEOMETRY.to_string());
    let kind = GeometryKind::from_tag(&geom_type);

    ClassifiedTable {
        name: record.name.clone(),
        privacy: record.privacy,
        created_at: record.created_at,
        geom_type,
        kind,
        is_geocoded: kind.is_some(),
        is_synced: record.sync_updated_at.is_some(),
    }
}

pub fn classify(records: &[TableRecord]) -> Vec<ClassifiedTable> {
    records.iter().map(classify_table).collect()
}

fn count_where(tables: &[ClassifiedTable], pred: impl Fn(&ClassifiedTable) -> bool) -> usize {
    tables.iter().filter(|&t| pred(t)).count()
}

pub fn summarize(tables: &[ClassifiedTable]) -> DatasetSummary {
    let total = tables.len();
    let private = count_where(tables, |t| t.privacy == Privacy::Private);
    let link = count_where(tables, |t| t.privacy == Privacy::Link);
    let public = count_where(tables, |t| t.privacy == Privacy::Public);
    let geocoded = count_where(tables, |t| t.is_geocoded);
    let points = count_where(tables, |t| t.kind == Some(GeometryKind::Point));
    let lines = count_where(tables, |t| t.kind == Some(GeometryKind::Line));
    let polygons = count_where(tables, |t| t.kind == Some(GeometryKind::Polygon));
    let synced = count_where(tables, |t| t.is_synced);

    let denom = total as f64;
    let summary = DatasetSummary {
        total,
        private,
        link,
        public,
        pct_private: percentage(private as f64, denom),
        pct_link: percentage(link as f64, denom),
        pct_public: percentage(public as f64, denom),
        geocoded,
        non_geocoded: total - geocoded,
        pct_geocoded: percentage(geocoded as f64, denom),
        points,
        lines,
        polygons,
        synced,
    };

    info!(
        private = summary.private,
        link = summary.link,
        public = summary.public,
        "Privacy breakdown"
    );
    info!(
        geocoded = summary.geocoded,
        non_geocoded = summary.non_geocoded,
        points = summary.points,
        lines = summary.lines,
        polygons = summary.polygons,
        synced = summary.synced,
        "Geometry and sync breakdown"
    );

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_table(name: &str, privacy: Privacy, geom: &[&str], synced: bool) -> TableRecord {
        let ts = Utc.with_ymd_and_hms(2019, 3, 1, 12, 0, 0).unwrap();
        TableRecord {
            name: name.to_string(),
            privacy,
            created_at: ts,
            sync_updated_at: if synced { Some(ts) } else { None },
            geometry_types: geom.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn test_geometry_kind_accepts_both_spellings() {
        assert_eq!(GeometryKind::from_tag("ST_Point"), Some(GeometryKind::Point));
        assert_eq!(GeometryKind::from_tag("Point"), Some(GeometryKind::Point));
        assert_eq!(GeometryKind::from_tag("MultiLineString"), Some(GeometryKind::Line));
        assert_eq!(GeometryKind::from_tag("ST_LineString"), Some(GeometryKind::Line));
        assert_eq!(GeometryKind::from_tag("ST_MultiPolygon"), Some(GeometryKind::Polygon));
        assert_eq!(GeometryKind::from_tag("Polygon"), Some(GeometryKind::Polygon));
        assert_eq!(GeometryKind::from_tag("ST_MultiPoint"), None);
        assert_eq!(GeometryKind::from_tag(NO_GEOMETRY), None);
    }

    #[test]
    fn test_classify_uses_first_geometry_tag() {
        let t = classify_table(&make_table("a", Privacy::Public, &["ST_Polygon", "ST_Point"], false));
        assert_eq!(t.geom_type, "ST_Polygon");
        assert_eq!(t.kind, Some(GeometryKind::Polygon));
        assert!(t.is_geocoded);
        assert!(!t.is_synced);
    }

    #[test]
    fn test_classify_empty_geometry_is_none() {
        let t = classify_table(&make_table("b", Privacy::Private, &[], true));
        assert_eq!(t.geom_type, NO_GEOMETRY);
        assert!(!t.is_geocoded);
        assert!(t.is_synced);
    }

    #[test]
    fn test_summary_counts_partition_the_collection() {
        let records = vec![
            make_table("a", Privacy::Private, &["ST_Point"], true),
            make_table("b", Privacy::Private, &["ST_MultiPolygon"], false),
            make_table("c", Privacy::Link, &["LineString"], false),
            make_table("d", Privacy::Public, &[], true),
        ];
        let summary = summarize(&classify(&records));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.private + summary.link + summary.public, summary.total);
        assert_eq!(summary.private, 2);
        assert_eq!(summary.link, 1);
        assert_eq!(summary.public, 1);
        assert!((summary.pct_private - 50.0).abs() < 1e-9);
        assert_eq!(summary.geocoded, 3);
        assert_eq!(summary.non_geocoded, 1);
        assert_eq!(summary.points, 1);
        assert_eq!(summary.lines, 1);
        assert_eq!(summary.polygons, 1);
        assert_eq!(summary.synced, 2);
    }

    #[test]
    fn test_summary_of_empty_collection_is_all_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary, DatasetSummary::default());
        assert_eq!(summary.pct_geocoded, 0.0);
    }
}
