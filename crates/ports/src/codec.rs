//! String form of measurements (JSON)

use contracts::{ContractError, Measurement, MeasurementValue};

/// Encode `m` as a JSON object `{"timestamp": .., "value": ..}`
pub fn encode<T: MeasurementValue>(m: &Measurement<T>) -> Result<String, ContractError> {
    serde_json::to_string(m).map_err(|e| {
        ContractError::parse_with_source(format!("cannot encode {} measurement", T::KIND), e)
    })
}

/// Decode a JSON measurement; a missing timestamp decodes as `0`
pub fn decode<T: MeasurementValue>(s: &str) -> Result<Measurement<T>, ContractError> {
    serde_json::from_str(s).map_err(|e| {
        ContractError::parse_with_source(format!("cannot decode {} measurement", T::KIND), e)
    })
}
