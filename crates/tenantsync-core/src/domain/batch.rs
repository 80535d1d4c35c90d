//! Push batches sent by terminals

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows modified offline on a terminal, to be merged into one table of one
/// tenant database file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushBatch {
    /// Path of the database relative to the tenant namespace,
    /// e.g. `suc_1/ventas.sqlite`
    pub db_relative_path: String,
    pub table_name: String,
    pub primary_key_column: String,
    /// Raw records in client order. Each must be a JSON object; anything else
    /// is rejected by the merge engine.
    #[serde(default)]
    pub records: Vec<Value>,
    /// Content hash the terminal based its edits on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
}
