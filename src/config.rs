//! Dynamic-configuration surface for the visibility layer.
//!
//! Properties are read through closures so that a live configuration service
//! can be plugged in without the store knowing about it. Reads never block a
//! request thread. Fixed-value constructors cover bootstrap and tests.

use std::sync::Arc;

/// Property read as a plain integer.
pub type IntPropertyFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Property read as a plain boolean.
pub type BoolPropertyFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Integer property filtered by domain name.
pub type IntPropertyFnWithDomainFilter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Boolean property filtered by domain name.
pub type BoolPropertyFnWithDomainFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub fn fixed_int(value: usize) -> IntPropertyFn {
    Arc::new(move || value)
}

pub fn fixed_bool(value: bool) -> BoolPropertyFn {
    Arc::new(move || value)
}

pub fn fixed_int_for_all_domains(value: usize) -> IntPropertyFnWithDomainFilter {
    Arc::new(move |_domain| value)
}

pub fn fixed_bool_for_all_domains(value: bool) -> BoolPropertyFnWithDomainFilter {
    Arc::new(move |_domain| value)
}

/// Configuration knobs of the visibility stack.
#[derive(Clone)]
pub struct VisibilityConfig {
    /// Token-bucket rate shared by all operations of one backend.
    pub persistence_max_qps: IntPropertyFn,
    /// Per-domain cap on list operations, per rolling second.
    pub visibility_list_max_qps: IntPropertyFnWithDomainFilter,
    /// Enables write-side sampling.
    pub enable_sampling: BoolPropertyFn,
    /// Per-domain cap on started-record writes when sampling is enabled.
    pub visibility_open_max_qps: IntPropertyFnWithDomainFilter,
    /// Per-domain cap on closed-record writes when sampling is enabled.
    pub visibility_closed_max_qps: IntPropertyFnWithDomainFilter,
    /// Offset-paging limit of the search index; beyond it, search-after.
    pub max_result_window: IntPropertyFn,
    /// Routes reads for a domain to the search-index backend.
    pub enable_read_from_search: BoolPropertyFnWithDomainFilter,
}

impl VisibilityConfig {
    /// Production defaults; every field can be overridden after construction.
    pub fn new() -> Self {
        Self {
            persistence_max_qps: fixed_int(2000),
            visibility_list_max_qps: fixed_int_for_all_domains(10),
            enable_sampling: fixed_bool(true),
            visibility_open_max_qps: fixed_int_for_all_domains(300),
            visibility_closed_max_qps: fixed_int_for_all_domains(300),
            max_result_window: fixed_int(10_000),
            enable_read_from_search: fixed_bool_for_all_domains(false),
        }
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VisibilityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityConfig")
            .field("persistence_max_qps", &(self.persistence_max_qps)())
            .field("enable_sampling", &(self.enable_sampling)())
            .field("max_result_window", &(self.max_result_window)())
            .finish_non_exhaustive()
    }
}
