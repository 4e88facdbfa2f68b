#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

pub use labscope::test_utils::{
    RecordingFailureHandler, RecordingScheduler, TestError, init_test_logging,
};
pub use labscope::{assert_with_log, test_complete, test_phase, test_section};

use labscope::capture::{FailureCapture, FailureCollector};
use labscope::lab::{LabConfig, LabScheduler};
use labscope::scope::{ScopeConfig, SchedulerControl, TestScope};
use std::sync::Arc;

/// A scope over explicit handles, so tests can inspect both sides.
pub struct ScopeFixture {
    pub scope: TestScope,
    pub lab: LabScheduler,
    pub collector: Arc<FailureCollector>,
    pub fallback: Arc<RecordingFailureHandler>,
}

/// Builds a scope over a fresh lab scheduler and collector.
///
/// Failures arriving after teardown land in `fallback`.
pub fn scope_fixture(config: LabConfig) -> ScopeFixture {
    let lab = LabScheduler::new(config);
    let fallback = Arc::new(RecordingFailureHandler::new());
    let collector = Arc::new(FailureCollector::with_fallback(fallback.clone()));
    let scope = TestScope::new(
        ScopeConfig::new()
            .with_scheduler(Arc::new(lab.clone()))
            .with_failure_capture(Arc::clone(&collector) as Arc<dyn FailureCapture>),
    )
    .expect("fixture scope");
    ScopeFixture {
        scope,
        lab,
        collector,
        fallback,
    }
}

/// Environment variable that overrides the number of proptest cases.
pub const PROPTEST_CASES_ENV: &str = "LABSCOPE_PROPTEST_CASES";

/// Proptest configuration with `cases` cases, overridable from the environment.
pub fn test_proptest_config(cases: u32) -> proptest::prelude::ProptestConfig {
    let cases = std::env::var(PROPTEST_CASES_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(cases);
    proptest::prelude::ProptestConfig {
        cases,
        ..proptest::prelude::ProptestConfig::default()
    }
}
