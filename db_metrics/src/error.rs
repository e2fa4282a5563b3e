use thiserror::Error;

/// Failures that stop a report run.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Missing {0}: provide valid credentials, run with -h for details")]
    MissingCredentials(&'static str),

    #[error("CARTO API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("SQL API error: {0}")]
    Sql(String),

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Invalid output destination: {0}")]
    InvalidOutput(String),
}

impl From<std::fmt::Error> for ReportError {
    fn from(err: std::fmt::Error) -> Self {
        ReportError::Render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ReportError::MissingCredentials("CARTO_API_KEY").to_string(),
            "Missing CARTO_API_KEY: provide valid credentials, run with -h for details"
        );
        let api = ReportError::Api {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(api.to_string(), "CARTO API returned status 401: unauthorized");
        assert!(ReportError::from(std::fmt::Error)
            .to_string()
            .starts_with("Failed to render report"));
    }
}
