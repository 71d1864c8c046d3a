//! ApplicationPushSource - injects application measurements into the bus

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use contracts::{ComponentId, ContractError, Measurement, MeasurementValue};

use crate::codec;
use crate::component::{Component, ComponentContext};
use crate::metrics::PortMetrics;
use crate::port::{InputPort, OutputPort, PushSupplier};
use crate::string_port::StringReceiver;

/// Push source accepting measurements of `T` from the application
pub struct ApplicationPushSource<T: MeasurementValue> {
    name: ComponentId,
    class: String,
    output: Arc<PushSupplier<T>>,
    metrics: PortMetrics,
    running: AtomicBool,
}

impl<T: MeasurementValue> ApplicationPushSource<T> {
    /// Class name for measurements of `T`, e.g. `ApplicationPushSourcePose`
    pub fn class_name() -> String {
        format!("ApplicationPushSource{}", T::KIND.class_suffix())
    }

    pub fn new(ctx: &ComponentContext) -> Arc<Self> {
        Arc::new(Self {
            name: ctx.name().clone(),
            class: Self::class_name(),
            output: ctx.push_supplier::<T>("Output"),
            metrics: PortMetrics::new(),
            running: AtomicBool::new(false),
        })
    }

    /// Queue `m` for every connected receiver and return immediately
    ///
    /// Without connected receivers this is a no-op.
    pub fn send(&self, m: Measurement<T>) {
        let queued = self.output.send(m);
        self.metrics.inc_transferred();
        trace!(source = %self.name, receivers = queued, "Measurement sent");
    }

    /// Decode a string-encoded measurement and send it
    ///
    /// A zero timestamp is replaced by the current time. Failures are never
    /// reported to the caller; they are counted in
    /// [`string_failures`](Self::string_failures).
    pub fn receive_string(&self, s: &str) {
        match codec::decode::<T>(s) {
            Ok(m) => self.send(Self::stamp(m)),
            Err(e) => self.record_failure(&e),
        }
    }

    /// Adapter from an application value `W` to this source
    ///
    /// Conversion failures are swallowed and counted like string failures.
    pub fn receiver<W, F>(self: &Arc<Self>, convert: F) -> impl Fn(W) + Send + Sync + 'static
    where
        W: 'static,
        F: Fn(W) -> Result<Measurement<T>, ContractError> + Send + Sync + 'static,
    {
        let source = Arc::clone(self);
        move |value: W| match convert(value) {
            Ok(m) => source.send(Self::stamp(m)),
            Err(e) => source.record_failure(&e),
        }
    }

    /// Number of string or conversion inputs that could not be sent
    pub fn string_failures(&self) -> u64 {
        self.metrics.string_failures()
    }

    /// Number of receivers currently connected
    pub fn connection_count(&self) -> usize {
        self.output.connection_count()
    }

    pub fn metrics(&self) -> &PortMetrics {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn stamp(m: Measurement<T>) -> Measurement<T> {
        if m.has_timestamp() {
            m
        } else {
            m.with_timestamp(contracts::now())
        }
    }

    fn record_failure(&self, error: &ContractError) {
        self.metrics.inc_string_failures();
        observability::record_string_failure(T::KIND, "decode");
        debug!(source = %self.name, error = %error, "Input dropped");
    }
}

impl<T: MeasurementValue> StringReceiver for ApplicationPushSource<T> {
    fn receive_string(&self, value: &str) {
        ApplicationPushSource::receive_string(self, value);
    }
}

impl<T: MeasurementValue> Component for ApplicationPushSource<T> {
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
        Vec::new()
    }

    fn outputs(&self) -> Vec<Arc<dyn OutputPort>> {
        vec![Arc::clone(&self.output) as Arc<dyn OutputPort>]
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn string_source(self: Arc<Self>) -> Option<Arc<dyn StringReceiver>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push_sink::ApplicationPushSink;
    use contracts::{Button, Position};
    use dispatcher::{EventQueue, PolicyRegistry};
    use std::sync::Mutex;

    struct Fixture {
        queue: Arc<EventQueue>,
        source: Arc<ApplicationPushSource<Position>>,
        received: Arc<Mutex<Vec<Measurement<Position>>>>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(EventQueue::new());
        let policies = Arc::new(PolicyRegistry::with_defaults());
        let source = ApplicationPushSource::<Position>::new(&ComponentContext::new(
            "src".into(),
            Arc::clone(&queue),
            Arc::clone(&policies),
        ));
        let sink = ApplicationPushSink::<Position>::new(&ComponentContext::new(
            "sink".into(),
            Arc::clone(&queue),
            policies,
        ));
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        sink.set_callback(move |m| log.lock().unwrap().push(m));

        let input = sink.input("Input").unwrap();
        let output = source.output("Output").unwrap();
        input.plan_connect(output).unwrap()();

        Fixture {
            queue,
            source,
            received,
        }
    }

    fn drain(queue: &EventQueue) {
        while let Some(event) = queue.try_pop() {
            event.deliver();
        }
    }

    #[test]
    fn test_send_reaches_connected_sink() {
        let f = fixture();
        let m = Measurement::new(100, Position::new(1.0, 2.0, 3.0));
        f.source.send(m.clone());
        drain(&f.queue);
        assert_eq!(*f.received.lock().unwrap(), vec![m]);
    }

    #[test]
    fn test_receive_string_stamps_zero_timestamp() {
        let f = fixture();
        let before = contracts::now();
        f.source.receive_string(r#"{"value": [1.0, 2.0, 3.0]}"#);
        drain(&f.queue);

        let received = f.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].timestamp() >= before);
    }

    #[test]
    fn test_receive_string_keeps_given_timestamp() {
        let f = fixture();
        f.source.receive_string(r#"{"timestamp": 55, "value": [0.0, 0.0, 1.0]}"#);
        drain(&f.queue);
        assert_eq!(f.received.lock().unwrap()[0].timestamp(), 55);
    }

    #[test]
    fn test_malformed_string_is_swallowed_and_counted() {
        let f = fixture();
        f.source.receive_string("garbage");
        f.source.receive_string(r#"{"value": "not a vector"}"#);
        drain(&f.queue);
        assert!(f.received.lock().unwrap().is_empty());
        assert_eq!(f.source.string_failures(), 2);
    }

    #[test]
    fn test_send_without_receivers_is_noop() {
        let queue = Arc::new(EventQueue::new());
        let source = ApplicationPushSource::<Button>::new(&ComponentContext::new(
            "lonely".into(),
            Arc::clone(&queue),
            Arc::new(PolicyRegistry::new()),
        ));
        source.send(Measurement::new(1, 1));
        assert!(queue.is_empty());
        assert_eq!(source.connection_count(), 0);
    }

    #[test]
    fn test_receiver_adapter_converts_wire_values() {
        let f = fixture();
        let push = f.source.receiver(|xyz: [f64; 3]| {
            if xyz.iter().any(|v| v.is_nan()) {
                Err(ContractError::parse("NaN coordinate"))
            } else {
                Ok(Measurement::new(9, Position::new(xyz[0], xyz[1], xyz[2])))
            }
        });

        push([1.0, 2.0, 3.0]);
        push([f64::NAN, 0.0, 0.0]);
        drain(&f.queue);

        assert_eq!(f.received.lock().unwrap().len(), 1);
        assert_eq!(f.source.string_failures(), 1);
    }
}
