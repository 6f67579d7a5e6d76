use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

impl<T> GraphQlResponse<T> {
    /// Returns `data`, turning GraphQL-level errors into typed errors.
    pub fn into_data(self) -> Result<T> {
        if let Some(error) = self.errors.first() {
            let message = error.message.clone();
            let lower = message.to_lowercase();
            return Err(
                if error.error_type.as_deref() == Some("NOT_FOUND")
                    || lower.contains("not found")
                    || lower.contains("could not resolve to")
                {
                    Error::NotFound(message)
                } else if error.error_type.as_deref() == Some("RATE_LIMITED") {
                    Error::RateLimited { retry_after: None }
                } else {
                    Error::ResponseMalformed(message)
                },
            );
        }

        self.data
            .ok_or_else(|| Error::ResponseMalformed("GraphQL response has no data".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Data {
        value: u32,
    }

    #[test]
    fn test_data_is_returned() {
        let response: GraphQlResponse<Data> = serde_json::from_str(r#"{"data":{"value":3}}"#).unwrap();
        assert_eq!(response.into_data().unwrap().value, 3);
    }

    #[test]
    fn test_not_found_error() {
        let response: GraphQlResponse<Data> = serde_json::from_str(
            r#"{"data":{"value":1},"errors":[{"type":"NOT_FOUND","message":"Could not resolve to a User"}]}"#,
        )
        .unwrap();
        assert!(matches!(response.into_data(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let response: GraphQlResponse<Data> = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(matches!(response.into_data(), Err(Error::ResponseMalformed(_))));
    }
}
