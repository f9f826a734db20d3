//! Single source of truth for configuration defaults.
//!
//! Both the serde defaults and the `Default` impls read these accessors,
//! so a default changes in exactly one place.

pub fn log_level() -> &'static str {
    "info"
}

pub fn log_format() -> &'static str {
    "text"
}

pub fn num_threads() -> usize {
    2
}

pub fn max_playouts() -> u32 {
    u32::MAX / 2
}

pub fn max_visits() -> u32 {
    u32::MAX / 2
}

pub fn max_tree_size() -> usize {
    4_000_000
}

pub fn puct() -> f32 {
    0.8
}

pub fn fpu_reduction() -> f32 {
    0.25
}

pub fn min_psa_ratio() -> f32 {
    0.0
}

pub fn use_symmetries() -> bool {
    true
}

pub fn resign_pct() -> i32 {
    -1
}

pub fn random_move_count() -> u32 {
    0
}

pub fn time_for_move_ms() -> u64 {
    5_000
}

pub fn analyze_interval_ms() -> u64 {
    250
}

pub fn can_accumulate_time() -> bool {
    true
}

pub fn time_management() -> bool {
    true
}

pub fn batch_size() -> usize {
    8
}

pub fn batch_wait_ms() -> u64 {
    2
}

pub fn cache_bytes() -> usize {
    64 << 20
}

/// Smallest evaluator cache that still makes sense.
pub fn min_cache_bytes() -> usize {
    1 << 20
}
