//! ApplicationPushSink - delivers bus measurements to an application callback

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use contracts::{ComponentId, Measurement, MeasurementKind, MeasurementValue};

use crate::codec;
use crate::component::{Component, ComponentContext};
use crate::metrics::PortMetrics;
use crate::port::{InputPort, OutputPort, PushConsumer};
use crate::string_port::{StringReceiver, StringSink};

/// Application callback of a push sink
pub type PushCallback<T> = Arc<dyn Fn(Measurement<T>) + Send + Sync>;

enum SinkCallback<T> {
    None,
    Typed(PushCallback<T>),
    String(Arc<dyn StringReceiver>),
}

impl<T> Clone for SinkCallback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Typed(f) => Self::Typed(Arc::clone(f)),
            Self::String(r) => Self::String(Arc::clone(r)),
        }
    }
}

struct SinkShared<T> {
    name: ComponentId,
    callback: RwLock<SinkCallback<T>>,
    metrics: PortMetrics,
}

impl<T: MeasurementValue> SinkShared<T> {
    fn receive(&self, m: Measurement<T>) {
        // Clone out so the callback may replace itself
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match callback {
            SinkCallback::None => {
                self.metrics.inc_dropped_without_callback();
                observability::record_event_dropped(T::KIND, "no_callback");
                debug!(sink = %self.name, timestamp = m.timestamp(), "No callback set, measurement dropped");
            }
            SinkCallback::Typed(f) => {
                self.metrics.inc_transferred();
                trace!(sink = %self.name, timestamp = m.timestamp(), "Delivering measurement");
                f(m);
            }
            SinkCallback::String(receiver) => match codec::encode(&m) {
                Ok(s) => {
                    self.metrics.inc_transferred();
                    receiver.receive_string(&s);
                }
                Err(e) => {
                    self.metrics.inc_string_failures();
                    observability::record_string_failure(T::KIND, "encode");
                    debug!(sink = %self.name, error = %e, "String encoding failed, measurement dropped");
                }
            },
        }
    }
}

/// Push sink exposing measurements of `T` to the application
///
/// The callback runs on the dispatch thread and must not call lifecycle
/// operations synchronously.
pub struct ApplicationPushSink<T: MeasurementValue> {
    name: ComponentId,
    class: String,
    input: Arc<PushConsumer<T>>,
    shared: Arc<SinkShared<T>>,
    running: AtomicBool,
}

impl<T: MeasurementValue> std::fmt::Debug for ApplicationPushSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationPushSink")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl<T: MeasurementValue> ApplicationPushSink<T> {
    /// Class name for measurements of `T`, e.g. `ApplicationPushSinkPose`
    pub fn class_name() -> String {
        format!("ApplicationPushSink{}", T::KIND.class_suffix())
    }

    pub fn new(ctx: &ComponentContext) -> Arc<Self> {
        let shared = Arc::new(SinkShared {
            name: ctx.name().clone(),
            callback: RwLock::new(SinkCallback::None),
            metrics: PortMetrics::new(),
        });
        let receiver = Arc::clone(&shared);
        let input = ctx.push_consumer::<T, _>("Input", move |m| receiver.receive(m));

        Arc::new(Self {
            name: ctx.name().clone(),
            class: Self::class_name(),
            input,
            shared,
            running: AtomicBool::new(false),
        })
    }

    fn replace(&self, callback: SinkCallback<T>) {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// Set the callback, replacing any previous one
    pub fn set_callback<F>(&self, f: F)
    where
        F: Fn(Measurement<T>) + Send + Sync + 'static,
    {
        self.replace(SinkCallback::Typed(Arc::new(f)));
    }

    /// Remove the callback; later measurements are dropped
    pub fn clear_callback(&self) {
        self.replace(SinkCallback::None);
    }

    /// Whether a callback is set
    pub fn has_callback(&self) -> bool {
        !matches!(
            *self.shared.callback.read().unwrap_or_else(PoisonError::into_inner),
            SinkCallback::None
        )
    }

    /// Delivery counters
    pub fn metrics(&self) -> &PortMetrics {
        &self.shared.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl<T: MeasurementValue> StringSink for ApplicationPushSink<T> {
    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn set_string_callback(&self, receiver: Arc<dyn StringReceiver>) {
        self.replace(SinkCallback::String(receiver));
    }

    fn clear_callback(&self) {
        ApplicationPushSink::clear_callback(self);
    }
}

impl<T: MeasurementValue> Component for ApplicationPushSink<T> {
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

    fn string_sink(self: Arc<Self>) -> Option<Arc<dyn StringSink>> {
        Some(self)
    }
}
