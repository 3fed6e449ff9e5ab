//! HTTP implementation of the transaction-event query boundary.
//!
//! Queries the remote node's REST event endpoint with offset/limit
//! pagination; the response carries the page plus the total event count.

use async_trait::async_trait;
use serde::Deserialize;

use super::{TxEvent, TxEventPage, TxEventQuery};
use crate::error::QueryError;

pub struct HttpEventQuery {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<EventBody>,
    pagination: Pagination,
}

#[derive(Deserialize)]
struct EventBody {
    tx_hash: String,
    #[serde(default)]
    height: u64,
    #[serde(default)]
    attributes: Vec<Attribute>,
}

#[derive(Deserialize)]
struct Attribute {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct Pagination {
    total: u64,
}

impl HttpEventQuery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TxEventQuery for HttpEventQuery {
    async fn tx_events(
        &self,
        subtype: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TxEventPage, QueryError> {
        let url = format!("{}/tx_events", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("subtype", subtype),
                ("offset", &offset.to_string()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::Status(response.status().as_u16()));
        }

        let body: EventsResponse = response
            .json()
            .await
            .map_err(|e| QueryError::BadResponse(e.to_string()))?;

        Ok(TxEventPage {
            events: body
                .events
                .into_iter()
                .map(|e| TxEvent {
                    tx_hash: e.tx_hash,
                    height: e.height,
                    attributes: e
                        .attributes
                        .into_iter()
                        .map(|a| (a.key, a.value))
                        .collect(),
                })
                .collect(),
            total: body.pagination.total,
        })
    }
}
