//! ApplicationPullSink - lets the application pull measurements on demand

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use contracts::{ComponentId, ContractError, Measurement, MeasurementKind, MeasurementValue, Timestamp};

use crate::codec;
use crate::component::{Component, ComponentContext};
use crate::metrics::PortMetrics;
use crate::port::{InputPort, OutputPort, PullConsumer};
use crate::string_port::StringPull;

/// Pull sink answering application requests from its upstream supplier
///
/// Every call goes upstream; nothing is cached. Safe to call from several
/// application threads at once.
pub struct ApplicationPullSink<T: MeasurementValue> {
    name: ComponentId,
    class: String,
    input: Arc<PullConsumer<T>>,
    metrics: PortMetrics,
    running: AtomicBool,
}

impl<T: MeasurementValue> std::fmt::Debug for ApplicationPullSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationPullSink")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl<T: MeasurementValue> ApplicationPullSink<T> {
    /// Class name for measurements of `T`, e.g. `ApplicationPullSinkPose`
    pub fn class_name() -> String {
        format!("ApplicationPullSink{}", T::KIND.class_suffix())
    }

    pub fn new(ctx: &ComponentContext) -> Arc<Self> {
        Arc::new(Self {
            name: ctx.name().clone(),
            class: Self::class_name(),
            input: ctx.pull_consumer::<T>("Input"),
            metrics: PortMetrics::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Measurement for time `t`, blocking until upstream answers
    pub fn get(&self, t: Timestamp) -> Result<Measurement<T>, ContractError> {
        match self.input.get(t) {
            Ok(m) => {
                self.metrics.inc_pulls();
                Ok(m)
            }
            Err(e) => {
                self.metrics.inc_pull_failures();
                debug!(sink = %self.name, timestamp = t, error = %e, "Pull failed");
                Err(e)
            }
        }
    }

    /// String-encoded measurement for time `t`
    pub fn get_string(&self, t: Timestamp) -> Result<String, ContractError> {
        let m = self.get(t)?;
        codec::encode(&m).inspect_err(|_| {
            self.metrics.inc_string_failures();
            observability::record_string_failure(T::KIND, "encode");
        })
    }

    /// Whether an upstream supplier is connected
    pub fn is_connected(&self) -> bool {
        self.input.is_connected()
    }

    pub fn metrics(&self) -> &PortMetrics {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl<T: MeasurementValue> StringPull for ApplicationPullSink<T> {
    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn get_string(&self, t: Timestamp) -> Result<String, ContractError> {
        ApplicationPullSink::get_string(self, t)
    }
}

impl<T: MeasurementValue> Component for ApplicationPullSink<T> {
    fn name(&self) -> &ComponentId {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn start(&self) {
        self.running.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn inputs(&self) -> Vec<Arc<dyn InputPort>> {
        vec![Arc::clone(&self.input) as Arc<dyn InputPort>]
    }

    fn outputs(&self) -> Vec<Arc<dyn OutputPort>> {
        Vec::new()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn string_pull(self: Arc<Self>) -> Option<Arc<dyn StringPull>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Matrix4x4, Pose};
    use dispatcher::{EventQueue, PolicyRegistry};

    fn context(name: &str) -> ComponentContext {
        ComponentContext::new(
            name.into(),
            Arc::new(EventQueue::new()),
            Arc::new(PolicyRegistry::with_defaults()),
        )
    }

    #[test]
    fn test_unconnected_pull_is_not_available() {
        let sink = ApplicationPullSink::<Pose>::new(&context("pull"));
        let err = sink.get(1_000).unwrap_err();
        assert!(matches!(
            err,
            ContractError::NotAvailable {
                kind: MeasurementKind::Pose,
                timestamp: 1_000,
                ..
            }
        ));
        assert_eq!(sink.metrics().pull_failures(), 1);
    }

    #[test]
    fn test_pull_goes_upstream_every_time() {
        let ctx = context("upstream");
        let supplier = ctx.pull_supplier::<Matrix4x4, _>("Output", |t| {
            Ok(Measurement::new(t, Matrix4x4::identity() * t as f64))
        });
        let sink = ApplicationPullSink::<Matrix4x4>::new(&context("pull"));
        sink.input("Input")
            .unwrap()
            .plan_connect(supplier)
            .unwrap()();

        assert_eq!(sink.get(2).unwrap().value()[(0, 0)], 2.0);
        assert_eq!(sink.get(3).unwrap().value()[(0, 0)], 3.0);
        assert_eq!(sink.metrics().pulls(), 2);

        let s = sink.get_string(4).unwrap();
        assert!(s.contains("\"timestamp\":4"));
    }
}
