//! Request gate for reverse endpoints
//!
//! Every configured header and query pair must be present with the exact
//! value before the gateway is let in.

use axum::http::HeaderMap;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("missing or mismatched header `{0}`")]
    Header(String),

    #[error("missing or mismatched query parameter `{0}`")]
    Param(String),
}

/// Required header and query key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestGate {
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
}

impl RequestGate {
    pub fn new(headers: &HashMap<String, String>, params: &HashMap<String, String>) -> Self {
        let mut headers: Vec<_> = headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut params: Vec<_> = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        headers.sort();
        params.sort();
        Self { headers, params }
    }

    pub fn require_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn check(
        &self,
        headers: &HeaderMap,
        params: &HashMap<String, String>,
    ) -> Result<(), GateRejection> {
        for (name, expected) in &self.headers {
            let actual = headers.get(name.as_str()).and_then(|v| v.to_str().ok());
            if actual != Some(expected.as_str()) {
                return Err(GateRejection::Header(name.clone()));
            }
        }

        for (name, expected) in &self.params {
            if params.get(name) != Some(expected) {
                return Err(GateRejection::Param(name.clone()));
            }
        }

        Ok(())
    }
}
