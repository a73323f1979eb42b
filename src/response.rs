//! Response envelopes.

use serde::Serialize;
use serde_json::Value;

/// Collection envelope: `count` is always `data.len()`.
#[derive(Debug, Serialize)]
pub struct CollectionPage {
    pub limit: Option<u64>,
    pub page: Option<u64>,
    pub count: usize,
    pub data: Vec<Value>,
}
