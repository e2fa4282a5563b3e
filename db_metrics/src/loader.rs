use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::ReportError;
use crate::model::{AccountSnapshot, MapRecord, Privacy, QuotaRow, TableProbe, TableRecord};

const VIZ_PAGE_SIZE: u32 = 100;

const OWNED_TABLES_SQL: &str = "select pg_class.relname as name from pg_class, pg_roles, pg_namespace \
     where pg_roles.oid = pg_class.relowner and pg_roles.rolname = current_user \
     and pg_namespace.oid = pg_class.relnamespace and pg_class.relkind = 'r'";

const SERVICE_QUOTA_SQL: &str = "SELECT * FROM cdb_service_quota_info()";

/// Source of the raw account entities a report is built from.
#[async_trait]
pub trait CartoSource {
    async fn maps(&self) -> Result<Vec<MapRecord>>;
    async fn datasets(&self) -> Result<Vec<TableRecord>>;
    /// Names of every physical table owned by the account user.
    async fn owned_tables(&self) -> Result<Vec<String>>;
    async fn probe_table(&self, name: &str) -> Result<TableProbe>;
    async fn service_quotas(&self) -> Result<Vec<QuotaRow>>;
}

/// Gather everything a report needs, one request at a time.
///
/// Listing failures abort the run. A failed per-table probe only drops that
/// table from the size-dependent aggregates.
pub async fn collect_snapshot<S: CartoSource + ?Sized>(source: &S) -> Result<AccountSnapshot> {
    info!("Getting all maps data...");
    let maps = source.maps().await.context("Failed to list maps")?;
    info!(maps = maps.len(), "Retrieved maps");

    info!("Getting all datasets data...");
    let datasets = source.datasets().await.context("Failed to list datasets")?;
    info!(datasets = datasets.len(), "Retrieved datasets");

    let owned_tables = source
        .owned_tables()
        .await
        .context("Failed to list owned tables")?;
    info!(tables = owned_tables.len(), "Retrieved owned tables");

    let mut probes = Vec::with_capacity(owned_tables.len());
    for name in &owned_tables {
        match source.probe_table(name).await {
            Ok(probe) => probes.push(probe),
            Err(e) => warn!(table = %name, error = %format!("{e:#}"), "Skipping table, lookup failed"),
        }
    }

    let quotas = source
        .service_quotas()
        .await
        .context("Failed to read service quotas")?;
    info!(services = quotas.len(), "Retrieved location data services");

    Ok(AccountSnapshot {
        maps,
        datasets,
        owned_tables,
        probes,
        quotas,
    })
}

#[derive(Deserialize)]
struct VizPage {
    #[serde(default)]
    visualizations: Vec<ApiViz>,
    #[serde(default)]
    total_entries: u64,
}

#[derive(Deserialize)]
struct ApiViz {
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    privacy: Option<String>,
    #[serde(default)]
    synchronization: Option<ApiSync>,
    #[serde(default)]
    table: Option<ApiTable>,
}

#[derive(Deserialize)]
struct ApiSync {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiTable {
    #[serde(default)]
    geometry_types: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct SqlResponse<T> {
    #[serde(default = "Vec::new")]
    rows: Vec<T>,
}

#[derive(Deserialize)]
struct SqlError {
    #[serde(default)]
    error: Vec<String>,
}

#[derive(Deserialize)]
struct NameRow {
    name: String,
}

#[derive(Deserialize)]
struct SizeRow {
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ColumnRow {
    column_name: String,
}

#[derive(Deserialize)]
struct IndexRow {
    indexname: String,
}

#[derive(Deserialize)]
struct ApiQuotaRow {
    service: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    monthly_quota: Option<f64>,
    #[serde(default)]
    used_quota: Option<f64>,
}

/// Quote a value as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// HTTP client for the CARTO viz and SQL APIs.
pub struct CartoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CartoClient {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: credentials.api_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Requesting");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to send request to {url}"))?;

        Ok(response)
    }

    async fn sql<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>> {
        let response = self.get("/api/v2/sql", &[("q", query)]).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read SQL API response body")?;

        if !status.is_success() {
            let message = serde_json::from_str::<SqlError>(&body)
                .map(|e| e.error.join("; "))
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(ReportError::Sql(message).into());
        }

        let parsed: SqlResponse<T> =
            serde_json::from_str(&body).context("Failed to parse SQL API response")?;
        Ok(parsed.rows)
    }

    async fn visualizations(&self, types: &str) -> Result<Vec<ApiViz>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        let per_page = VIZ_PAGE_SIZE.to_string();

        loop {
            let page_str = page.to_string();
            let response = self
                .get(
                    "/api/v1/viz/",
                    &[("types", types), ("page", page_str.as_str()), ("per_page", per_page.as_str())],
                )
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read response body".to_string());
                return Err(ReportError::Api {
                    status: status.as_u16(),
                    body,
                }
                .into());
            }

            let batch: VizPage = response
                .json()
                .await
                .with_context(|| format!("Failed to parse viz page {page} ({types})"))?;

            let received = batch.visualizations.len();
            all.extend(batch.visualizations);

            if received == 0 || all.len() as u64 >= batch.total_entries {
                break;
            }
            page += 1;
        }

        Ok(all)
    }
}

#[async_trait]
impl CartoSource for CartoClient {
    async fn maps(&self) -> Result<Vec<MapRecord>> {
        let vizs = self.visualizations("derived").await?;
        Ok(vizs
            .into_iter()
            .map(|v| MapRecord {
                name: v.name,
                created_at: v.created_at,
                updated_at: v.updated_at,
                url: v.url.unwrap_or_default(),
            })
            .collect())
    }

    async fn datasets(&self) -> Result<Vec<TableRecord>> {
        let vizs = self.visualizations("table").await?;
        let mut tables = Vec::with_capacity(vizs.len());

        for v in vizs {
            let raw_privacy = v.privacy.unwrap_or_default();
            let Some(privacy) = Privacy::parse(&raw_privacy) else {
                warn!(dataset = %v.name, privacy = %raw_privacy, "Skipping dataset with unknown privacy");
                continue;
            };
            tables.push(TableRecord {
                name: v.name,
                privacy,
                created_at: v.created_at,
                sync_updated_at: v.synchronization.and_then(|s| s.updated_at),
                geometry_types: v.table.and_then(|t| t.geometry_types).unwrap_or_default(),
            });
        }

        Ok(tables)
    }

    async fn owned_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<NameRow> = self.sql(OWNED_TABLES_SQL).await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn probe_table(&self, name: &str) -> Result<TableProbe> {
        let literal = quote_literal(name);

        let size_rows: Vec<SizeRow> = self
            .sql(&format!("select pg_total_relation_size({literal}) as size"))
            .await
            .with_context(|| format!("size lookup for {name}"))?;
        let size_bytes = size_rows
            .first()
            .and_then(|r| r.size)
            .with_context(|| format!("no size returned for {name}"))?;

        let columns: Vec<ColumnRow> = self
            .sql(&format!(
                "select column_name from information_schema.columns where table_name = {literal}"
            ))
            .await
            .with_context(|| format!("column lookup for {name}"))?;

        let indexes: Vec<IndexRow> = self
            .sql(&format!("select indexname from pg_indexes where tablename = {literal}"))
            .await
            .with_context(|| format!("index lookup for {name}"))?;

        debug!(table = %name, size_bytes = size_bytes, "Probed table");

        Ok(TableProbe {
            name: name.to_string(),
            size_bytes,
            columns: columns.into_iter().map(|c| c.column_name).collect(),
            indexes: indexes.into_iter().map(|i| i.indexname).collect(),
        })
    }

    async fn service_quotas(&self) -> Result<Vec<QuotaRow>> {
        let rows: Vec<ApiQuotaRow> = self.sql(SERVICE_QUOTA_SQL).await?;
        Ok(rows
            .into_iter()
            .map(|r| QuotaRow {
                service: r.service,
                provider: r.provider,
                monthly_quota: r.monthly_quota.unwrap_or(0.0),
                used_quota: r.used_quota.unwrap_or(0.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    const API_KEY: &str = "secret";

    async fn handle_viz(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        if params.get("api_key").map(String::as_str) != Some(API_KEY) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"errors": "unauthorized"})));
        }
        let page: u32 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let body = match (params.get("types").map(String::as_str), page) {
            (Some("derived"), 1) => json!({
                "total_entries": 2,
                "visualizations": [{
                    "name": "Stores",
                    "created_at": "2019-01-01T10:00:00+00:00",
                    "updated_at": "2019-02-01T10:00:00+00:00",
                    "url": "https://alice.carto.com/viz/1/map"
                }]
            }),
            (Some("derived"), 2) => json!({
                "total_entries": 2,
                "visualizations": [{
                    "name": "Routes",
                    "created_at": "2019-03-01T10:00:00+00:00",
                    "url": "https://alice.carto.com/viz/2/map"
                }]
            }),
            (Some("table"), 1) => json!({
                "total_entries": 3,
                "visualizations": [
                    {
                        "name": "stores",
                        "created_at": "2019-01-01T10:00:00+00:00",
                        "privacy": "PUBLIC",
                        "synchronization": {"updated_at": "2019-05-01T00:00:00+00:00"},
                        "table": {"geometry_types": ["ST_Point"]}
                    },
                    {
                        "name": "notes",
                        "created_at": "2019-01-02T10:00:00+00:00",
                        "privacy": "PRIVATE",
                        "synchronization": null,
                        "table": {"geometry_types": []}
                    },
                    {
                        "name": "secret_map",
                        "created_at": "2019-01-03T10:00:00+00:00",
                        "privacy": "PASSWORD"
                    }
                ]
            }),
            _ => json!({"total_entries": 0, "visualizations": []}),
        };
        (StatusCode::OK, Json(body))
    }

    async fn handle_sql(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        let q = params.get("q").cloned().unwrap_or_default();
        let rows = if q.contains("pg_class") {
            json!([{"name": "stores"}, {"name": "broken"}])
        } else if q.contains("pg_total_relation_size('broken')") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": ["relation \"broken\" does not exist"]})),
            );
        } else if q.contains("pg_total_relation_size") {
            json!([{"size": 2_500_000}])
        } else if q.contains("information_schema.columns") {
            json!([
                {"column_name": "cartodb_id"},
                {"column_name": "the_geom"},
                {"column_name": "the_geom_webmercator"}
            ])
        } else if q.contains("pg_indexes") {
            json!([
                {"indexname": "stores_pkey"},
                {"indexname": "stores_the_geom_idx"},
                {"indexname": "stores_the_geom_webmercator_idx"}
            ])
        } else if q.contains("cdb_service_quota_info") {
            json!([
                {"service": "isolines", "provider": "heremaps", "monthly_quota": 100, "used_quota": 5},
                {"service": "observatory", "provider": "data observatory", "monthly_quota": null, "used_quota": null}
            ])
        } else {
            json!([])
        };
        (StatusCode::OK, Json(json!({"rows": rows, "total_rows": 0})))
    }

    async fn spawn_fake_carto() -> String {
        let app = Router::new()
            .route("/api/v1/viz/", get(handle_viz))
            .route("/api/v2/sql", get(handle_sql));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client_for(base_url: &str, api_key: &str) -> CartoClient {
        CartoClient::new(&Credentials {
            user: "alice".to_string(),
            api_key: api_key.to_string(),
            api_url: base_url.to_string(),
            organization: None,
        })
        .unwrap()
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("stores"), "'stores'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_trimmed() {
        let client = client_for("https://alice.carto.com/", API_KEY);
        assert_eq!(client.base_url(), "https://alice.carto.com");
    }

    #[tokio::test]
    async fn test_maps_are_paginated() {
        let base = spawn_fake_carto().await;
        let maps = client_for(&base, API_KEY).maps().await.unwrap();

        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].name, "Stores");
        assert!(maps[0].updated_at.is_some());
        assert_eq!(maps[1].name, "Routes");
        assert!(maps[1].updated_at.is_none());
    }

    #[tokio::test]
    async fn test_datasets_map_privacy_sync_and_geometry() {
        let base = spawn_fake_carto().await;
        let datasets = client_for(&base, API_KEY).datasets().await.unwrap();

        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].privacy, Privacy::Public);
        assert!(datasets[0].sync_updated_at.is_some());
        assert_eq!(datasets[0].geometry_types, vec!["ST_Point".to_string()]);
        assert_eq!(datasets[1].privacy, Privacy::Private);
        assert!(datasets[1].sync_updated_at.is_none());
        assert!(datasets[1].geometry_types.is_empty());
    }

    #[tokio::test]
    async fn test_bad_api_key_is_an_api_error() {
        let base = spawn_fake_carto().await;
        let err = client_for(&base, "wrong").maps().await.unwrap_err();

        match err.downcast_ref::<ReportError>() {
            Some(ReportError::Api { status, .. }) => assert_eq!(*status, 401),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_skips_failed_probe() {
        let base = spawn_fake_carto().await;
        let snapshot = collect_snapshot(&client_for(&base, API_KEY)).await.unwrap();

        assert_eq!(snapshot.maps.len(), 2);
        assert_eq!(snapshot.owned_tables, vec!["stores".to_string(), "broken".to_string()]);
        assert_eq!(snapshot.probes.len(), 1);
        assert_eq!(snapshot.probes[0].name, "stores");
        assert_eq!(snapshot.probes[0].size_bytes, 2_500_000);
        assert_eq!(snapshot.probes[0].indexes.len(), 3);

        assert_eq!(snapshot.quotas.len(), 2);
        assert_eq!(snapshot.quotas[1].service, "observatory");
        assert_eq!(snapshot.quotas[1].monthly_quota, 0.0);
    }
}
