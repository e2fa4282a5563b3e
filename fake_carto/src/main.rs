use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const DEFAULT_PER_PAGE: usize = 20;

/// Minimal subset of a CARTO visualization (what the report reads)

#[derive(Debug, Clone, Serialize)]
struct Synchronization {
    updated_at: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct TableInfo {
    geometry_types: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
struct Visualization {
    name: &'static str,
    created_at: &'static str,
    updated_at: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    privacy: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    synchronization: Option<Synchronization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<TableInfo>,
}

#[derive(Debug, Serialize)]
struct VizPage {
    total_entries: usize,
    visualizations: Vec<Visualization>,
}

/// A physical table owned by the fake user.
struct FakeTable {
    name: &'static str,
    size_bytes: u64,
    cartodbfied: bool,
}

const TABLES: [FakeTable; 9] = [
    FakeTable { name: "stores", size_bytes: 12_400_000, cartodbfied: true },
    FakeTable { name: "customers", size_bytes: 48_900_000, cartodbfied: true },
    FakeTable { name: "delivery_routes", size_bytes: 7_300_000, cartodbfied: true },
    FakeTable { name: "districts", size_bytes: 3_100_000, cartodbfied: true },
    FakeTable { name: "survey_notes", size_bytes: 250_000, cartodbfied: true },
    FakeTable { name: "raw_import", size_bytes: 900_000, cartodbfied: false },
    FakeTable { name: "analysis_b194a8f896_0c7a1f6d22e3b0c9d1a4f8e7b6c5d4e3f2a1b0c9", size_bytes: 2_200_000, cartodbfied: false },
    FakeTable { name: "analysis_2f13a3dbd7_7d9e8f0a1b2c3d4e5f60718293a4b5c6d7e8f9a0", size_bytes: 1_600_000, cartodbfied: false },
    FakeTable { name: "analysis_2f13a3dbd7_1f2e3d4c5b6a79881726354433221100ffeeddcc", size_bytes: 800_000, cartodbfied: false },
];

fn base_url() -> String {
    std::env::var("FAKE_CARTO_USER").map_or_else(
        |_| "https://demo.carto.com".to_string(),
        |user| format!("https://{user}.carto.com"),
    )
}

fn maps() -> Vec<Visualization> {
    let base = base_url();
    let map = |id: u32, name: &'static str, created_at, updated_at| Visualization {
        name,
        created_at,
        updated_at,
        url: format!("{base}/builder/{id}/embed"),
        privacy: None,
        synchronization: None,
        table: None,
    };

    vec![
        map(1, "Store coverage", "2018-03-12T09:15:00+00:00", "2019-06-01T12:00:00+00:00"),
        map(2, "Delivery isochrones", "2018-11-02T17:40:00+00:00", "2018-11-03T08:00:00+00:00"),
        map(3, "Customer density", "2019-01-21T10:05:00+00:00", "2019-07-14T16:30:00+00:00"),
        map(4, "District overview", "2019-04-30T13:00:00+00:00", "2019-04-30T13:00:00+00:00"),
        map(5, "Sales <Q2> & targets", "2019-05-18T08:20:00+00:00", "2019-05-20T11:45:00+00:00"),
        map(6, "Routes review", "2019-08-09T15:10:00+00:00", "2019-09-01T09:00:00+00:00"),
        map(7, "Old draft", "2017-12-01T10:00:00+00:00", "2017-12-01T10:00:00+00:00"),
    ]
}

fn datasets() -> Vec<Visualization> {
    let base = base_url();
    let dataset = |name: &'static str, privacy, created_at, geometry: &[&'static str], synced: Option<&'static str>| {
        Visualization {
            name,
            created_at,
            updated_at: created_at,
            url: format!("{base}/dataset/{name}"),
            privacy: Some(privacy),
            synchronization: synced.map(|updated_at| Synchronization { updated_at }),
            table: Some(TableInfo {
                geometry_types: geometry.to_vec(),
            }),
        }
    };

    vec![
        dataset("stores", "PUBLIC", "2018-03-10T08:00:00+00:00", &["ST_Point"], Some("2019-09-30T02:00:00+00:00")),
        dataset("customers", "PRIVATE", "2018-06-22T14:30:00+00:00", &["ST_Point"], None),
        dataset("delivery_routes", "LINK", "2018-11-01T09:00:00+00:00", &["ST_MultiLineString"], None),
        dataset("districts", "PRIVATE", "2019-02-14T11:11:00+00:00", &["ST_MultiPolygon"], Some("2019-10-01T02:00:00+00:00")),
        dataset("survey_notes", "LINK", "2019-07-07T07:07:00+00:00", &[], None),
        dataset("protected_sites", "PASSWORD", "2019-08-15T10:00:00+00:00", &["ST_Polygon"], None),
    ]
}

/// Rows returned by cdb_service_quota_info() for the fake user.
fn service_quotas() -> Value {
    json!([
        {"service": "isolines", "monthly_quota": 100000, "used_quota": 31250, "soft_limit": false, "provider": "heremaps"},
        {"service": "hires_geocoder", "monthly_quota": 50000, "used_quota": 4875, "soft_limit": false, "provider": "google"},
        {"service": "routing", "monthly_quota": 20000, "used_quota": 19980, "soft_limit": true, "provider": "mapzen"},
        {"service": "observatory", "monthly_quota": 0, "used_quota": 0, "soft_limit": false, "provider": "data observatory"}
    ])
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let app = Router::new()
        .route("/api/v1/viz/", get(handle_viz))
        .route("/api/v2/sql", get(handle_sql));

    let addr: SocketAddr = std::env::var("FAKE_CARTO_ADDR")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 4000)));
    println!("fake_carto listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Paginated listing of maps (`types=derived`) or datasets (`types=table`).
async fn handle_viz(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("api_key").map_or(true, |k| k.is_empty()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": "Unauthorized: missing api_key"})),
        );
    }

    let all = match params.get("types").map(String::as_str) {
        Some("derived") => maps(),
        Some("table") => datasets(),
        other => {
            println!("Unsupported viz types {:?}", other);
            Vec::new()
        }
    };

    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
    let per_page: usize = params
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .filter(|&p| p > 0)
        .unwrap_or(DEFAULT_PER_PAGE);

    let total_entries = all.len();
    let visualizations: Vec<Visualization> = all
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    println!(
        "viz types={:?} page={} -> {} of {}",
        params.get("types"),
        page,
        visualizations.len(),
        total_entries
    );

    let body = VizPage {
        total_entries,
        visualizations,
    };
    (StatusCode::OK, Json(json!(body)))
}

/// Pull the table name out of the first single-quoted literal in a query.
fn quoted_name(query: &str) -> Option<String> {
    let start = query.find('\'')? + 1;
    let rest = &query[start..];
    let mut name = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                name.push('\'');
                chars.next();
            } else {
                return Some(name);
            }
        } else {
            name.push(c);
        }
    }
    None
}

fn table_rows(query: &str) -> Result<Value, String> {
    let name = quoted_name(query).ok_or_else(|| "syntax error: missing table name".to_string())?;
    let table = TABLES
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| format!("relation \"{name}\" does not exist"))?;

    if query.contains("pg_total_relation_size") {
        return Ok(json!([{"size": table.size_bytes}]));
    }
    if query.contains("information_schema.columns") {
        let mut columns = vec!["cartodb_id", "the_geom"];
        if table.cartodbfied {
            columns.push("the_geom_webmercator");
        }
        columns.push("name");
        return Ok(Value::Array(
            columns.into_iter().map(|c| json!({"column_name": c})).collect(),
        ));
    }
    if query.contains("pg_indexes") {
        let indexes = if table.cartodbfied {
            vec![
                format!("{}_pkey", table.name),
                format!("{}_the_geom_idx", table.name),
                format!("{}_the_geom_webmercator_idx", table.name),
            ]
        } else {
            vec![format!("{}_pkey", table.name)]
        };
        return Ok(Value::Array(
            indexes.into_iter().map(|i| json!({"indexname": i})).collect(),
        ));
    }
    Err(format!("unsupported query: {query}"))
}

/// Very small SQL API: recognizes the handful of queries the report issues.
async fn handle_sql(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let query = params.get("q").map(String::as_str).unwrap_or_default();
    println!("sql q={}", query);

    let rows = if query.contains("pg_class") {
        Ok(Value::Array(
            TABLES.iter().map(|t| json!({"name": t.name})).collect(),
        ))
    } else if query.contains("cdb_service_quota_info") {
        Ok(service_quotas())
    } else {
        table_rows(query)
    };

    match rows {
        Ok(rows) => {
            let total_rows = rows.as_array().map_or(0, Vec::len);
            (
                StatusCode::OK,
                Json(json!({"rows": rows, "time": 0.001, "total_rows": total_rows})),
            )
        }
        Err(message) => (StatusCode::BAD_REQUEST, Json(json!({"error": [message]}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_name_unescapes_quotes() {
        assert_eq!(
            quoted_name("select pg_total_relation_size('o''brien') as size").as_deref(),
            Some("o'brien")
        );
        assert_eq!(quoted_name("select 1"), None);
    }

    #[test]
    fn test_table_rows_for_known_and_unknown_tables() {
        let size = table_rows("select pg_total_relation_size('stores') as size").unwrap();
        assert_eq!(size, json!([{"size": 12_400_000u64}]));

        let indexes = table_rows("select indexname from pg_indexes where tablename = 'raw_import'").unwrap();
        assert_eq!(indexes.as_array().unwrap().len(), 1);

        assert!(table_rows("select pg_total_relation_size('missing') as size").is_err());
    }

    #[tokio::test]
    async fn test_viz_pagination() {
        let mut params = HashMap::new();
        params.insert("api_key".to_string(), "k".to_string());
        params.insert("types".to_string(), "derived".to_string());
        params.insert("per_page".to_string(), "5".to_string());
        params.insert("page".to_string(), "2".to_string());

        let (status, Json(body)) = handle_viz(Query(params)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_entries"], 7);
        assert_eq!(body["visualizations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_viz_requires_api_key() {
        let (status, _) = handle_viz(Query(HashMap::new())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
