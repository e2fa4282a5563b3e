use serde::Serialize;
use tracing::{debug, info};

use crate::model::{percentage, round_to, QuotaRow};

/// Services left out of the location data services table by default.
pub const DEFAULT_EXCLUDED_SERVICES: [&str; 1] = ["observatory"];

/// Maximum number of location data services reported.
pub const TRACKED_SERVICE_LIMIT: usize = 3;

pub const STORAGE_SERVICE: &str = "storage";
pub const STORAGE_PROVIDER: &str = "internal";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaLine {
    pub service_name: String,
    pub provider: String,
    pub monthly_quota: f64,
    pub used: f64,
    pub pct_used: f64,
    pub left: f64,
    pub pct_left: f64,
}

impl QuotaLine {
    fn new(service_name: &str, provider: &str, monthly_quota: f64, used: f64) -> Self {
        let pct_used = percentage(used, monthly_quota);
        QuotaLine {
            service_name: service_name.to_string(),
            provider: provider.to_string(),
            monthly_quota,
            used,
            pct_used,
            left: round_to(monthly_quota - used, 1),
            pct_left: round_to(100.0 - pct_used, 2),
        }
    }

    pub fn is_storage(&self) -> bool {
        self.service_name == STORAGE_SERVICE
    }
}

/// Build the quota table: tracked location data services in input order,
/// then the synthetic storage line.
///
/// `user_quota` is the account quota in MB; storage capacity is twice that.
pub fn aggregate(
    rows: &[QuotaRow],
    excluded_services: &[String],
    user_quota: u64,
    used_storage_mb: f64,
) -> Vec<QuotaLine> {
    let mut lines: Vec<QuotaLine> = rows
        .iter()
        .filter(|row| {
            let excluded = excluded_services.iter().any(|s| s == &row.service);
            if excluded {
                debug!(service = %row.service, "Skipping excluded service");
            }
            !excluded
        })
        .take(TRACKED_SERVICE_LIMIT)
        .map(|row| {
            QuotaLine::new(
                &row.service,
                row.provider.as_deref().unwrap_or(""),
                row.monthly_quota,
                row.used_quota,
            )
        })
        .collect();

    let storage_quota = user_quota as f64 * 2.0;
    lines.push(QuotaLine::new(
        STORAGE_SERVICE,
        STORAGE_PROVIDER,
        storage_quota,
        round_to(used_storage_mb, 2),
    ));

    info!(
        services = lines.len() - 1,
        storage_quota_mb = storage_quota,
        "Quota lines aggregated"
    );

    lines
}

/// The storage line; `aggregate` always appends one.
pub fn storage_line(lines: &[QuotaLine]) -> Option<&QuotaLine> {
    lines.iter().rev().find(|l| l.is_storage())
}
