//! Metrics for the NoSQL query bridge
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! application installs a recorder.

use metrics::{counter, histogram};

/// Record one completed operation
pub fn record_operation(backend: &'static str, operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("lumadb_nosql_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record operation latency
pub fn record_operation_latency(backend: &'static str, operation: &'static str, latency_ms: f64) {
    histogram!("lumadb_nosql_operation_duration_ms",
        "backend" => backend,
        "operation" => operation
    )
    .record(latency_ms);
}

/// Record items returned by a page
pub fn record_items_returned(backend: &'static str, count: u64) {
    counter!("lumadb_nosql_items_returned_total", "backend" => backend).increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_operation("dynamodb", "find_many", true);
        record_operation_latency("cosmos", "create", 1.5);
        record_items_returned("dynamodb", 10);
    }
}
