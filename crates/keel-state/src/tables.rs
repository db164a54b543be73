//! redb table definitions for the Keel state store.
//!
//! Every table uses `&str` keys and `&[u8]` values (JSON-serialized).

use redb::TableDefinition;

/// Last launched task descriptors keyed by task instance name
/// (`{pod_type}-{index}-{task}`).
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Last observed task statuses keyed by task instance name.
pub const STATUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("statuses");

/// Executor descriptors keyed by pod instance name (`{pod_type}-{index}`).
pub const EXECUTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("executors");
