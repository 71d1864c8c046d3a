//! Port primitives
//!
//! Push ports move measurements through the [`EventQueue`]; pull ports call
//! the upstream supplier synchronously on the caller's thread.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use contracts::{ComponentId, ContractError, Measurement, MeasurementKind, MeasurementValue, Timestamp};
use dispatcher::{DispatchPolicy, EnqueueOutcome, EventQueue, PortKey};

/// Push or pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMode {
    Push,
    Pull,
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Pull => f.write_str("pull"),
        }
    }
}

/// Deferred connection, executed once a whole update has been validated
pub type ConnectOp = Box<dyn FnOnce() + Send>;

/// Handler run on the dispatch thread for each delivered measurement
pub type PushHandler<T> = Arc<dyn Fn(Measurement<T>) + Send + Sync>;

/// Handler answering a pull request
pub type PullHandler<T> = Arc<dyn Fn(Timestamp) -> Result<Measurement<T>, ContractError> + Send + Sync>;

/// Type-erased sending side of a connection
pub trait OutputPort: Send + Sync {
    fn name(&self) -> &str;
    fn owner(&self) -> &ComponentId;
    fn kind(&self) -> MeasurementKind;
    fn mode(&self) -> PortMode;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Forget connections to ports of `owner`; returns how many were removed
    fn detach_owner(&self, owner: &ComponentId) -> usize;

    /// Forget every connection
    fn disconnect_all(&self);
}

/// Type-erased receiving side of a connection
pub trait InputPort: Send + Sync {
    fn name(&self) -> &str;
    fn owner(&self) -> &ComponentId;
    fn kind(&self) -> MeasurementKind;
    fn mode(&self) -> PortMode;

    /// Check that `source` can feed this port and return the connection to run later
    fn plan_connect(self: Arc<Self>, source: Arc<dyn OutputPort>) -> Result<ConnectOp, ContractError>;

    /// Forget connections to ports of `owner`; returns how many were removed
    fn detach_owner(&self, owner: &ComponentId) -> usize;

    /// Release everything held for this port; called when its component goes away
    fn detach(&self);
}

pub(crate) fn port_label(owner: &ComponentId, port: &str) -> String {
    format!("{owner}.{port}")
}

fn mismatch(source: &dyn OutputPort, mode: PortMode, kind: MeasurementKind) -> ContractError {
    ContractError::type_mismatch(
        port_label(source.owner(), source.name()),
        format!("{mode} {kind}"),
        format!("{} {}", source.mode(), source.kind()),
    )
}

// ===== Push =====

/// Receiving push port
pub struct PushConsumer<T> {
    name: String,
    owner: ComponentId,
    key: PortKey,
    queue: Arc<EventQueue>,
    handler: PushHandler<T>,
}

impl<T: MeasurementValue> PushConsumer<T> {
    /// Register a receiving port on `queue`
    pub fn new(
        owner: ComponentId,
        name: impl Into<String>,
        queue: Arc<EventQueue>,
        policy: &DispatchPolicy,
        handler: PushHandler<T>,
    ) -> Self {
        let name = name.into();
        let key = queue.register_port(port_label(&owner, &name), T::KIND, policy.max_queue_length());
        Self {
            name,
            owner,
            key,
            queue,
            handler,
        }
    }

    /// Queue registration of this port
    pub fn key(&self) -> PortKey {
        self.key
    }

    /// Run the handler; called on the dispatch thread
    pub fn deliver(&self, m: Measurement<T>) {
        (self.handler)(m)
    }
}

impl<T: MeasurementValue> InputPort for PushConsumer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &ComponentId {
        &self.owner
    }

    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn mode(&self) -> PortMode {
        PortMode::Push
    }

    fn plan_connect(self: Arc<Self>, source: Arc<dyn OutputPort>) -> Result<ConnectOp, ContractError> {
        let err = mismatch(source.as_ref(), PortMode::Push, T::KIND);
        let supplier = source
            .into_any()
            .downcast::<PushSupplier<T>>()
            .map_err(|_| err)?;
        Ok(Box::new(move || supplier.connect(self)))
    }

    fn detach_owner(&self, _owner: &ComponentId) -> usize {
        // Suppliers hold the links of push connections
        0
    }

    fn detach(&self) {
        self.queue.unregister_port(self.key);
    }
}

/// Sending push port
pub struct PushSupplier<T> {
    name: String,
    owner: ComponentId,
    queue: Arc<EventQueue>,
    policy: DispatchPolicy,
    consumers: RwLock<Vec<Arc<PushConsumer<T>>>>,
}

impl<T: MeasurementValue> PushSupplier<T> {
    pub fn new(
        owner: ComponentId,
        name: impl Into<String>,
        queue: Arc<EventQueue>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            owner,
            queue,
            policy,
            consumers: RwLock::new(Vec::new()),
        }
    }

    /// Link `consumer`; linking twice is a no-op
    pub fn connect(&self, consumer: Arc<PushConsumer<T>>) {
        let mut consumers = self.consumers.write().unwrap_or_else(PoisonError::into_inner);
        if !consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            trace!(
                from = %port_label(&self.owner, &self.name),
                to = %port_label(&consumer.owner, &consumer.name),
                "Push connection established"
            );
            consumers.push(consumer);
        }
    }

    /// Number of linked consumers
    pub fn connection_count(&self) -> usize {
        self.consumers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Queue `m` for every linked consumer; returns how many were queued
    pub fn send(&self, m: Measurement<T>) -> usize {
        let consumers = self.consumers.read().unwrap_or_else(PoisonError::into_inner);
        if consumers.is_empty() {
            return 0;
        }
        let priority = self.policy.priority(&m);
        let mut queued = 0;
        for consumer in consumers.iter() {
            let target = Arc::clone(consumer);
            let event = m.clone();
            let outcome = self
                .queue
                .enqueue(consumer.key, priority, Box::new(move || target.deliver(event)));
            if outcome != EnqueueOutcome::Detached {
                queued += 1;
            }
        }
        queued
    }
}

impl<T: MeasurementValue> OutputPort for PushSupplier<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &ComponentId {
        &self.owner
    }

    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn mode(&self) -> PortMode {
        PortMode::Push
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn detach_owner(&self, owner: &ComponentId) -> usize {
        let mut consumers = self.consumers.write().unwrap_or_else(PoisonError::into_inner);
        let before = consumers.len();
        consumers.retain(|c| &c.owner != owner);
        before - consumers.len()
    }

    fn disconnect_all(&self) {
        self.consumers.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ===== Pull =====

/// Answering pull port
pub struct PullSupplier<T> {
    name: String,
    owner: ComponentId,
    handler: PullHandler<T>,
}

impl<T: MeasurementValue> PullSupplier<T> {
    pub fn new(owner: ComponentId, name: impl Into<String>, handler: PullHandler<T>) -> Self {
        Self {
            name: name.into(),
            owner,
            handler,
        }
    }

    /// Produce the measurement for `t`
    pub fn pull(&self, t: Timestamp) -> Result<Measurement<T>, ContractError> {
        (self.handler)(t)
    }
}

impl<T: MeasurementValue> OutputPort for PullSupplier<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &ComponentId {
        &self.owner
    }

    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn mode(&self) -> PortMode {
        PortMode::Pull
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn detach_owner(&self, _owner: &ComponentId) -> usize {
        // Consumers hold the links of pull connections
        0
    }

    fn disconnect_all(&self) {}
}

/// Requesting pull port
pub struct PullConsumer<T> {
    name: String,
    owner: ComponentId,
    supplier: RwLock<Option<Arc<PullSupplier<T>>>>,
}

impl<T: MeasurementValue> PullConsumer<T> {
    pub fn new(owner: ComponentId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner,
            supplier: RwLock::new(None),
        }
    }

    /// Link `supplier`, replacing any previous one
    pub fn connect(&self, supplier: Arc<PullSupplier<T>>) {
        trace!(
            from = %port_label(&supplier.owner, &supplier.name),
            to = %port_label(&self.owner, &self.name),
            "Pull connection established"
        );
        *self.supplier.write().unwrap_or_else(PoisonError::into_inner) = Some(supplier);
    }

    /// Whether an upstream supplier is linked
    pub fn is_connected(&self) -> bool {
        self.supplier.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Ask the upstream supplier for the measurement at `t`
    ///
    /// Every failure is reported as [`ContractError::NotAvailable`].
    pub fn get(&self, t: Timestamp) -> Result<Measurement<T>, ContractError> {
        let supplier = self
            .supplier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(supplier) = supplier else {
            return Err(ContractError::not_available(
                T::KIND,
                t,
                format!("port '{}' is not connected", port_label(&self.owner, &self.name)),
            ));
        };
        supplier.pull(t).map_err(|e| match e {
            e @ ContractError::NotAvailable { .. } => e,
            other => ContractError::not_available(T::KIND, t, other.to_string()),
        })
    }
}

impl<T: MeasurementValue> InputPort for PullConsumer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &ComponentId {
        &self.owner
    }

    fn kind(&self) -> MeasurementKind {
        T::KIND
    }

    fn mode(&self) -> PortMode {
        PortMode::Pull
    }

    fn plan_connect(self: Arc<Self>, source: Arc<dyn OutputPort>) -> Result<ConnectOp, ContractError> {
        let err = mismatch(source.as_ref(), PortMode::Pull, T::KIND);
        let supplier = source
            .into_any()
            .downcast::<PullSupplier<T>>()
            .map_err(|_| err)?;
        Ok(Box::new(move || self.connect(supplier)))
    }

    fn detach_owner(&self, owner: &ComponentId) -> usize {
        let mut supplier = self.supplier.write().unwrap_or_else(PoisonError::into_inner);
        match supplier.as_ref() {
            Some(s) if &s.owner == owner => {
                *supplier = None;
                1
            }
            _ => 0,
        }
    }

    fn detach(&self) {
        *self.supplier.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Pose, Position};
    use std::sync::Mutex;

    fn drain(queue: &EventQueue) {
        while let Some(event) = queue.try_pop() {
            event.deliver();
        }
    }

    #[test]
    fn test_push_connect_send_detach() {
        let queue = Arc::new(EventQueue::new());
        let policy = DispatchPolicy::unbounded();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&received);
        let consumer = Arc::new(PushConsumer::<f64>::new(
            "sink".into(),
            "Input",
            Arc::clone(&queue),
            &policy,
            Arc::new(move |m: Measurement<f64>| log.lock().unwrap().push(*m.value())),
        ));
        let supplier = Arc::new(PushSupplier::<f64>::new(
            "src".into(),
            "Output",
            Arc::clone(&queue),
            policy,
        ));

        assert_eq!(supplier.send(Measurement::new(1, 0.5)), 0);

        let op = Arc::clone(&consumer)
            .plan_connect(Arc::clone(&supplier) as Arc<dyn OutputPort>)
            .unwrap();
        op();
        assert_eq!(supplier.send(Measurement::new(2, 1.5)), 1);
        drain(&queue);
        assert_eq!(*received.lock().unwrap(), vec![1.5]);

        assert_eq!(supplier.detach_owner(&"sink".into()), 1);
        consumer.detach();
        assert_eq!(supplier.send(Measurement::new(3, 2.5)), 0);
    }

    #[test]
    fn test_plan_connect_rejects_other_kind() {
        let queue = Arc::new(EventQueue::new());
        let policy = DispatchPolicy::unbounded();
        let consumer = Arc::new(PushConsumer::<Pose>::new(
            "sink".into(),
            "Input",
            Arc::clone(&queue),
            &policy,
            Arc::new(|_: Measurement<Pose>| {}),
        ));
        let supplier: Arc<dyn OutputPort> = Arc::new(PushSupplier::<Position>::new(
            "src".into(),
            "Output",
            queue,
            policy,
        ));

        let err = consumer.plan_connect(supplier).err().unwrap();
        assert!(matches!(err, ContractError::TypeMismatch { .. }));
        assert!(err.to_string().contains("src.Output"));
    }

    #[test]
    fn test_plan_connect_rejects_other_mode() {
        let consumer = Arc::new(PullConsumer::<f64>::new("sink".into(), "Input"));
        let supplier: Arc<dyn OutputPort> = Arc::new(PushSupplier::<f64>::new(
            "src".into(),
            "Output",
            Arc::new(EventQueue::new()),
            DispatchPolicy::unbounded(),
        ));
        assert!(matches!(
            consumer.plan_connect(supplier),
            Err(ContractError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_pull_unconnected_and_upstream_failure() {
        let consumer = Arc::new(PullConsumer::<f64>::new("sink".into(), "Input"));
        assert!(matches!(
            consumer.get(10),
            Err(ContractError::NotAvailable { timestamp: 10, .. })
        ));

        let supplier = Arc::new(PullSupplier::<f64>::new(
            "src".into(),
            "Output",
            Arc::new(|t: Timestamp| {
                if t < 100 {
                    Ok(Measurement::new(t, t as f64))
                } else {
                    Err(ContractError::Other("too late".into()))
                }
            }),
        ));
        consumer.connect(supplier);

        assert_eq!(*consumer.get(42).unwrap().value(), 42.0);
        let err = consumer.get(500).unwrap_err();
        assert!(matches!(err, ContractError::NotAvailable { .. }));
        assert!(err.to_string().contains("too late"));

        assert_eq!(consumer.detach_owner(&"src".into()), 1);
        assert!(!consumer.is_connected());
    }
}
