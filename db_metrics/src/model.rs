use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sharing level of a dataset as reported by the viz API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privacy {
    Private,
    Link,
    Public,
}

impl Privacy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "PRIVATE" => Some(Privacy::Private),
            "LINK" => Some(Privacy::Link),
            "PUBLIC" => Some(Privacy::Public),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Private => "PRIVATE",
            Privacy::Link => "LINK",
            Privacy::Public => "PUBLIC",
        }
    }
}

/// One map (derived visualization) of the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl MapRecord {
    /// Timestamp used to order maps for display.
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// One registered dataset (a "cartodbfied" table known to the dashboard).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecord {
    pub name: String,
    pub privacy: Privacy,
    pub created_at: DateTime<Utc>,
    pub sync_updated_at: Option<DateTime<Utc>>,
    pub geometry_types: Vec<String>,
}

/// Physical facts about a table owned by the account, gathered per table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProbe {
    pub name: String,
    pub size_bytes: u64,
    pub columns: Vec<String>,
    pub indexes: Vec<String>,
}

/// One location data service row of `cdb_service_quota_info()`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaRow {
    pub service: String,
    pub provider: Option<String>,
    pub monthly_quota: f64,
    pub used_quota: f64,
}

/// Everything the loader brings back for one report run.
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub maps: Vec<MapRecord>,
    pub datasets: Vec<TableRecord>,
    /// Names of every physical table owned by the account.
    pub owned_tables: Vec<String>,
    /// Probes for the owned tables whose lookups succeeded.
    pub probes: Vec<TableProbe>,
    pub quotas: Vec<QuotaRow>,
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `part * 100 / total` rounded to two decimals, 0 when `total` is 0.
pub fn percentage(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        round_to(part * 100.0 / total, 2)
    }
}
