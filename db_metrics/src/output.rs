use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::error::ReportError;

/// Where the rendered report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stdout,
    LocalFile(PathBuf),
    S3 { bucket: String, key: String },
}

/// Parse an S3 URI like s3://bucket/key into (bucket, key)
fn parse_s3_uri(uri: &str) -> Option<(String, String)> {
    let stripped = uri.strip_prefix("s3://")?;
    let (bucket, key) = stripped.split_once('/')?;
    Some((bucket.to_string(), key.to_string()))
}

impl ReportDestination {
    pub fn parse(value: &str) -> Result<Self, ReportError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ReportError::InvalidOutput("empty path".to_string()));
        }
        if value == "-" {
            return Ok(ReportDestination::Stdout);
        }
        if value.starts_with("s3://") {
            return match parse_s3_uri(value) {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    Ok(ReportDestination::S3 { bucket, key })
                }
                _ => Err(ReportError::InvalidOutput(format!(
                    "{value}: expected s3://bucket/key"
                ))),
            };
        }
        Ok(ReportDestination::LocalFile(PathBuf::from(value)))
    }

    /// Write a fully rendered report.
    pub async fn write(&self, html: &str) -> Result<()> {
        match self {
            ReportDestination::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(html.as_bytes())
                    .context("Failed to write report to stdout")?;
                stdout.flush()?;
            }
            ReportDestination::LocalFile(path) => {
                info!(path = %path.display(), "Storing report");
                std::fs::write(path, html)
                    .with_context(|| format!("Failed to write HTML report to {}", path.display()))?;
            }
            ReportDestination::S3 { bucket, key } => {
                info!(bucket = %bucket, key = %key, "Uploading report to S3");
                let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                let client = S3Client::new(&config);

                client
                    .put_object()
                    .bucket(bucket.as_str())
                    .key(key.as_str())
                    .body(html.as_bytes().to_vec().into())
                    .content_type("text/html; charset=utf-8")
                    .send()
                    .await
                    .with_context(|| format!("Failed to write to S3: s3://{bucket}/{key}"))?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ReportDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportDestination::Stdout => write!(f, "stdout"),
            ReportDestination::LocalFile(path) => write!(f, "{}", path.display()),
            ReportDestination::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destinations() {
        assert_eq!(ReportDestination::parse("-").unwrap(), ReportDestination::Stdout);
        assert_eq!(
            ReportDestination::parse("report.html").unwrap(),
            ReportDestination::LocalFile(PathBuf::from("report.html"))
        );
        assert_eq!(
            ReportDestination::parse("s3://reports/alice/report.html").unwrap(),
            ReportDestination::S3 {
                bucket: "reports".to_string(),
                key: "alice/report.html".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(matches!(
            ReportDestination::parse("s3://bucket-only"),
            Err(ReportError::InvalidOutput(_))
        ));
        assert!(matches!(
            ReportDestination::parse("s3://bucket/"),
            Err(ReportError::InvalidOutput(_))
        ));
        assert!(matches!(
            ReportDestination::parse("   "),
            Err(ReportError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_display() {
        let dest = ReportDestination::parse("s3://b/k.html").unwrap();
        assert_eq!(dest.to_string(), "s3://b/k.html");
    }

    #[tokio::test]
    async fn test_write_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        let dest = ReportDestination::LocalFile(path.clone());

        dest.write("<html></html>").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = ReportDestination::LocalFile(dir.path().join("nope").join("report.html"));
        assert!(dest.write("x").await.is_err());
    }
}
