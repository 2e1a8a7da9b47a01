//! Canonical key layout
//!
//! Every component addresses the cache through these helpers so the
//! `<context>:<entity>[:<attribute>]` layout stays in one place. Backends
//! may prepend a deployment namespace; these helpers never do.

/// Pattern record: `pattern:<id>`
pub fn pattern(id: &str) -> String {
    format!("pattern:{id}")
}

/// Index set of every stored pattern id
pub fn pattern_all() -> String {
    "pattern:all".to_string()
}

/// Index set of pattern ids in a category: `pattern:category:<c>`
pub fn pattern_category(category: &str) -> String {
    format!("pattern:category:{category}")
}

/// Index set of pattern ids by origin: `pattern:origin:<o>`
pub fn pattern_origin(origin: &str) -> String {
    format!("pattern:origin:{origin}")
}

/// Index set of user-origin pattern ids by author: `pattern:user:<u>`
pub fn pattern_author(author: &str) -> String {
    format!("pattern:user:{author}")
}

/// Durable execution state: `orchestration:state:<execution_id>`
pub fn execution_state(execution_id: &str) -> String {
    format!("orchestration:state:{execution_id}")
}

/// Single-flight execution lock: `orchestration:lock:<execution_id>`
pub fn execution_lock(execution_id: &str) -> String {
    format!("orchestration:lock:{execution_id}")
}

/// Index set of dead-letter record ids (append-only log)
pub fn event_dlq() -> String {
    "event_dlq".to_string()
}

/// One dead-letter record: `event_dlq:<id>`
pub fn event_dlq_entry(id: &str) -> String {
    format!("event_dlq:{id}")
}

/// Task row: `dispatch:task:<id>`
pub fn task(id: &str) -> String {
    format!("dispatch:task:{id}")
}

/// Task result row, keyed by the task id: `dispatch:result:<task_id>`
pub fn task_result(task_id: &str) -> String {
    format!("dispatch:result:{task_id}")
}
