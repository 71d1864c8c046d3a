//! Per-type dispatch policy
//!
//! Each measurement kind maps to a priority function and an optional bound
//! on the number of pending events per receiving port.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use contracts::{Measurement, MeasurementKind, MeasurementValue};

/// Type-erased priority function; `None` falls back to the timestamp
pub type PriorityFn = Arc<dyn Fn(&dyn Any) -> Option<u64> + Send + Sync>;

/// Scheduling parameters of one measurement kind
///
/// Lower priority keys are dispatched first.
#[derive(Clone, Default)]
pub struct DispatchPolicy {
    priority: Option<PriorityFn>,
    max_queue_length: Option<NonZeroUsize>,
}

impl DispatchPolicy {
    /// Timestamp priority, unbounded queue
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Timestamp priority, at most `max` pending events per port
    pub fn bounded(max: NonZeroUsize) -> Self {
        Self {
            priority: None,
            max_queue_length: Some(max),
        }
    }

    /// Replace the queue bound
    pub fn with_max_queue_length(mut self, max: Option<NonZeroUsize>) -> Self {
        self.max_queue_length = max;
        self
    }

    /// Replace the priority function for measurements of `T`
    pub fn with_priority<T, F>(mut self, f: F) -> Self
    where
        T: MeasurementValue,
        F: Fn(&Measurement<T>) -> u64 + Send + Sync + 'static,
    {
        self.priority = Some(Arc::new(move |m: &dyn Any| {
            m.downcast_ref::<Measurement<T>>().map(&f)
        }));
        self
    }

    /// Priority key of `m`
    pub fn priority<T: MeasurementValue>(&self, m: &Measurement<T>) -> u64 {
        self.priority
            .as_ref()
            .and_then(|f| f(m as &dyn Any))
            .unwrap_or_else(|| m.timestamp())
    }

    /// Pending events allowed per receiving port, `None` for unbounded
    #[inline]
    pub fn max_queue_length(&self) -> Option<NonZeroUsize> {
        self.max_queue_length
    }
}

impl fmt::Debug for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPolicy")
            .field("custom_priority", &self.priority.is_some())
            .field("max_queue_length", &self.max_queue_length)
            .finish()
    }
}

/// Kind -> policy table, populated once at startup
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<MeasurementKind, DispatchPolicy>,
}

impl PolicyRegistry {
    /// Empty registry, every kind unbounded
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in table: camera frames keep only the latest pending frame
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.set(
            MeasurementKind::Image,
            DispatchPolicy::bounded(NonZeroUsize::MIN),
        );
        registry
    }

    /// Set the policy of `kind`
    pub fn set(&mut self, kind: MeasurementKind, policy: DispatchPolicy) {
        self.policies.insert(kind, policy);
    }

    /// Override only the queue bound of `kind`
    pub fn set_max_queue_length(&mut self, kind: MeasurementKind, max: Option<NonZeroUsize>) {
        let policy = self.policies.remove(&kind).unwrap_or_default();
        self.policies
            .insert(kind, policy.with_max_queue_length(max));
    }

    /// Policy of `kind`, default if none registered
    pub fn policy(&self, kind: MeasurementKind) -> DispatchPolicy {
        self.policies.get(&kind).cloned().unwrap_or_default()
    }

    /// Policy of the kind carried by `T`
    pub fn policy_for<T: MeasurementValue>(&self) -> DispatchPolicy {
        self.policy(T::KIND)
    }
}
