//! Scope configuration: an unordered bag of capability-bearing elements.

use super::SchedulerControl;
use crate::capture::{FailureCapture, FailureCollector};
use crate::lab::LabScheduler;
use std::sync::Arc;

/// One element of a [`ScopeConfig`].
#[derive(Debug, Clone)]
pub enum ScopeElement {
    /// Provides virtual-time and task control.
    Scheduler(Arc<dyn SchedulerControl>),
    /// Provides uncaught-failure aggregation.
    FailureCapture(Arc<dyn FailureCapture>),
    /// An element that provides neither capability; resolution skips it.
    Named(String),
}

impl ScopeElement {
    /// Returns the scheduler control this element provides, if any.
    #[must_use]
    pub fn as_scheduler(&self) -> Option<&Arc<dyn SchedulerControl>> {
        match self {
            Self::Scheduler(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the failure capture this element provides, if any.
    #[must_use]
    pub fn as_failure_capture(&self) -> Option<&Arc<dyn FailureCapture>> {
        match self {
            Self::FailureCapture(c) => Some(c),
            _ => None,
        }
    }
}

/// Configuration a [`TestScope`](super::TestScope) is built from.
///
/// Order carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    elements: Vec<ScopeElement>,
}

impl ScopeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element.
    #[must_use]
    pub fn with_element(mut self, element: ScopeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Adds a scheduler-control element.
    #[must_use]
    pub fn with_scheduler(self, scheduler: Arc<dyn SchedulerControl>) -> Self {
        self.with_element(ScopeElement::Scheduler(scheduler))
    }

    /// Adds a failure-capture element.
    #[must_use]
    pub fn with_failure_capture(self, capture: Arc<dyn FailureCapture>) -> Self {
        self.with_element(ScopeElement::FailureCapture(capture))
    }

    /// Fills in a fresh [`LabScheduler`] and [`FailureCollector`] for
    /// whichever capability is missing.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if !self.elements.iter().any(|e| e.as_scheduler().is_some()) {
            self.elements
                .push(ScopeElement::Scheduler(Arc::new(LabScheduler::default())));
        }
        if !self.elements.iter().any(|e| e.as_failure_capture().is_some()) {
            self.elements
                .push(ScopeElement::FailureCapture(Arc::new(FailureCollector::new())));
        }
        self
    }

    /// Elements in insertion order.
    #[must_use]
    pub fn elements(&self) -> &[ScopeElement] {
        &self.elements
    }

    pub(crate) fn schedulers(&self) -> Vec<Arc<dyn SchedulerControl>> {
        self.elements
            .iter()
            .filter_map(ScopeElement::as_scheduler)
            .cloned()
            .collect()
    }

    pub(crate) fn failure_captures(&self) -> Vec<Arc<dyn FailureCapture>> {
        self.elements
            .iter()
            .filter_map(ScopeElement::as_failure_capture)
            .cloned()
            .collect()
    }
}
