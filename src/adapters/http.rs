//! Remote retrieval service reached over HTTP.
//!
//! The backend receives `POST {"query", "top_k", "options", "request_id"}` and
//! answers with either a bare JSON array of items or `{"results": [...]}`.

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use crate::adapters::{Adapter, AdapterError, ContextItem, RetrievalOptions, Teardown};
use crate::config::schema::HttpSourceConfig;

pub struct HttpAdapter {
    name: String,
    client: reqwest::Client,
    url: url::Url,
    top_k: Option<u32>,
}

impl HttpAdapter {
    pub fn new(name: impl Into<String>, config: &HttpSourceConfig) -> Result<Self, AdapterError> {
        let name = name.into();
        let construction = |reason: String| AdapterError::Construction {
            name: name.clone(),
            reason,
        };

        let url = url::Url::parse(&config.url).map_err(|e| construction(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let key = HeaderName::from_str(key).map_err(|e| construction(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| construction(e.to_string()))?;
            headers.insert(key, value);
        }
        if let Some(token) = &config.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| construction(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| construction(e.to_string()))?;

        Ok(Self {
            name,
            client,
            url,
            top_k: config.top_k,
        })
    }
}

/// Accept a bare array or an object carrying a `results` array.
fn parse_items(body: Value) -> Result<Vec<ContextItem>, AdapterError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AdapterError::InvalidResponse(
                    "expected an array or an object with a 'results' array".into(),
                ))
            }
        },
        other => {
            return Err(AdapterError::InvalidResponse(format!(
                "unexpected JSON type: {other}"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
        })
        .collect()
}

impl Teardown for HttpAdapter {}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "http"
    }

    async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<ContextItem>, AdapterError> {
        let body = json!({
            "query": query,
            "top_k": self.top_k,
            "options": options.extra,
            "request_id": options.context.request_id,
        });

        let response = self
            .client
            .post(self.url.clone())
            .header("x-request-id", &options.context.request_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Backend(format!(
                "{} responded with status {}",
                self.url, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
        parse_items(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let items = parse_items(json!([{ "content": "a", "score": 0.9, "id": 7 }])).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].score, Some(0.9));
        assert_eq!(items[0].extra.get("id"), Some(&json!(7)));
    }

    #[test]
    fn test_parse_results_object() {
        let items = parse_items(json!({ "results": [{ "content": "a" }, { "content": "b" }] })).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_rejects_unexpected_shape() {
        assert!(matches!(
            parse_items(json!({ "hits": [] })),
            Err(AdapterError::InvalidResponse(_))
        ));
        assert!(parse_items(json!([{ "no_content": true }])).is_err());
    }

    #[test]
    fn test_rejects_bad_header() {
        let config = HttpSourceConfig {
            url: "http://localhost:9000/search".into(),
            bearer_token: None,
            top_k: None,
            headers: [("bad header".to_string(), "x".to_string())].into_iter().collect(),
        };
        assert!(matches!(
            HttpAdapter::new("remote", &config),
            Err(AdapterError::Construction { .. })
        ));
    }
}
