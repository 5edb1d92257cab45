use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_plan() -> PathBuf {
    PathBuf::from("DEV_PLAN.md")
}

pub fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

pub fn default_max_parallel_tasks() -> usize {
    3
}

pub fn default_timeout_sec() -> u64 {
    300
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_backoff_base_ms() -> u64 {
    500
}

pub fn default_cache_path() -> PathBuf {
    PathBuf::from(".devplan/cache.json")
}

pub fn default_cache_max_entries() -> usize {
    10_000
}

pub fn default_task_type() -> String {
    "generic".to_string()
}

pub fn default_true() -> bool {
    true
}
