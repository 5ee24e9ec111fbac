//! Query execution and wire sanitization.
//!
//! Applies filter, sort, skip, limit in that order (the ordering is what
//! makes pagination reproducible) and flattens store-native values to
//! plain strings so results are transport-safe.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ServiceError;
use crate::service::protocol::CommandRequest;
use crate::store::{FindQuery, SortOrder, StoreAdapter};
use crate::types::Document;

/// Default page size when the caller does not supply one
pub const DEFAULT_LIMIT: u64 = 100;

/// Validated parameters of one query
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub collection: String,
    pub filter: Document,
    pub sort: Vec<(String, SortOrder)>,
    pub limit: u64,
    pub skip: u64,
}

impl QueryParams {
    /// Validate a request's query parameters. Never touches the store.
    pub fn from_request(request: &CommandRequest) -> Result<Self, ServiceError> {
        let collection = request.require_collection()?.to_string();

        let limit = match request.limit {
            None => DEFAULT_LIMIT,
            Some(limit) if limit > 0 => limit as u64,
            Some(limit) => {
                return Err(ServiceError::validation(format!(
                    "'limit' must be a positive integer, got {}",
                    limit
                )))
            }
        };

        let skip = match request.skip {
            None => 0,
            Some(skip) if skip >= 0 => skip as u64,
            Some(skip) => {
                return Err(ServiceError::validation(format!(
                    "'skip' must be non-negative, got {}",
                    skip
                )))
            }
        };

        let mut sort = Vec::new();
        for (field, direction) in request.sort.clone().unwrap_or_default() {
            let order = SortOrder::from_wire(direction).ok_or_else(|| {
                ServiceError::validation(format!(
                    "sort direction for '{}' must be 1 or -1, got {}",
                    field, direction
                ))
            })?;
            sort.push((field, order));
        }

        Ok(Self {
            collection,
            filter: request.query.clone().unwrap_or_default(),
            sort,
            limit,
            skip,
        })
    }

    fn to_find_query(&self) -> FindQuery {
        FindQuery {
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: Some(self.limit),
        }
    }

    /// Echo of the parameters as they were applied, in wire form.
    fn echo(&self) -> Value {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|(field, order)| json!([field, order.to_wire()]))
            .collect();
        json!({
            "query": self.filter,
            "sort": sort,
            "limit": self.limit,
            "skip": self.skip,
        })
    }
}

/// Runs validated queries against the store adapter
pub struct QueryExecutor {
    adapter: Arc<StoreAdapter>,
}

impl QueryExecutor {
    pub fn new(adapter: Arc<StoreAdapter>) -> Self {
        Self { adapter }
    }

    /// Execute a query request, returning the response fields.
    pub async fn execute(&self, request: &CommandRequest) -> Result<Value, ServiceError> {
        let params = QueryParams::from_request(request)?;

        let documents = self
            .adapter
            .find(&params.collection, &params.to_find_query())
            .await?;

        let results: Vec<Value> = documents
            .into_iter()
            .map(|document| sanitize_value(Value::Object(document)))
            .collect();

        debug!(
            "Query on '{}' returned {} document(s)",
            params.collection,
            results.len()
        );

        Ok(json!({
            "collection": params.collection,
            "count": results.len(),
            "query_results": results,
            "query_params": params.echo(),
        }))
    }
}

/// Recursively flatten store-native values to plain strings.
///
/// `{"$oid": s}` becomes `s`; `{"$date": s}` becomes `s`; `{"$date": millis}`
/// becomes an RFC3339 string. Field names and cardinality are untouched.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(oid)) = map.get("$oid") {
                    return Value::String(oid.clone());
                }
                match map.get("$date") {
                    Some(Value::String(stamp)) => return Value::String(stamp.clone()),
                    Some(Value::Number(millis)) => {
                        if let Some(stamp) = millis
                            .as_i64()
                            .and_then(DateTime::from_timestamp_millis)
                        {
                            return Value::String(
                                stamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                            );
                        }
                        return Value::String(millis.to_string());
                    }
                    _ => {}
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, sanitize_value(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

/// Sanitize a whole document (backup serialization path).
pub fn sanitize_document(document: Document) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, sanitize_value(value)))
        .collect()
}
