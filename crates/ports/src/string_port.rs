//! String access to typed ports
//!
//! Lets callers that only know a component by name exchange measurements in
//! their string form, whatever the measurement kind.

use std::sync::Arc;

use contracts::{ContractError, MeasurementKind, Timestamp};

/// Consumer of string-encoded measurements
pub trait StringReceiver: Send + Sync {
    fn receive_string(&self, value: &str);
}

impl<F> StringReceiver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn receive_string(&self, value: &str) {
        self(value)
    }
}

/// Push sink able to deliver strings
pub trait StringSink: Send + Sync {
    /// Kind of the measurements being encoded
    fn kind(&self) -> MeasurementKind;

    /// Deliver string-encoded measurements to `receiver`, replacing any callback
    fn set_string_callback(&self, receiver: Arc<dyn StringReceiver>);

    /// Remove any callback
    fn clear_callback(&self);
}

/// Pull sink able to answer with strings
pub trait StringPull: Send + Sync {
    /// Kind of the measurements being encoded
    fn kind(&self) -> MeasurementKind;

    /// String-encoded measurement for `t`
    fn get_string(&self, t: Timestamp) -> Result<String, ContractError>;
}
