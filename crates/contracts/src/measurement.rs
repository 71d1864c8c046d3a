//! Measurement - timestamped, immutable tracking value
//!
//! Every value type flowing through the dataflow is tagged with exactly one
//! [`MeasurementKind`]; the tag selects dispatch policy and component classes.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Nanoseconds since the Unix epoch. `0` means "not stamped".
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`]
pub fn now() -> Timestamp {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|ns| ns.max(0) as u64)
        .unwrap_or_default()
}

/// Type tag of a measurement value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Pose,
    ErrorPose,
    Position,
    #[serde(rename = "position2d")]
    Position2D,
    ErrorPosition,
    Rotation,
    PositionList,
    PositionList2,
    ErrorPositionList,
    PoseList,
    Matrix3x3,
    Matrix3x4,
    Matrix4x4,
    Distance,
    Button,
    Image,
}

impl MeasurementKind {
    /// All kinds, in declaration order
    pub const ALL: [MeasurementKind; 16] = [
        Self::Pose,
        Self::ErrorPose,
        Self::Position,
        Self::Position2D,
        Self::ErrorPosition,
        Self::Rotation,
        Self::PositionList,
        Self::PositionList2,
        Self::ErrorPositionList,
        Self::PoseList,
        Self::Matrix3x3,
        Self::Matrix3x4,
        Self::Matrix4x4,
        Self::Distance,
        Self::Button,
        Self::Image,
    ];

    /// Configuration / metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::ErrorPose => "error_pose",
            Self::Position => "position",
            Self::Position2D => "position2d",
            Self::ErrorPosition => "error_position",
            Self::Rotation => "rotation",
            Self::PositionList => "position_list",
            Self::PositionList2 => "position_list2",
            Self::ErrorPositionList => "error_position_list",
            Self::PoseList => "pose_list",
            Self::Matrix3x3 => "matrix3x3",
            Self::Matrix3x4 => "matrix3x4",
            Self::Matrix4x4 => "matrix4x4",
            Self::Distance => "distance",
            Self::Button => "button",
            Self::Image => "image",
        }
    }

    /// Suffix used in component class names, e.g. `ApplicationPushSinkPose`
    pub fn class_suffix(&self) -> &'static str {
        match self {
            Self::Pose => "Pose",
            Self::ErrorPose => "ErrorPose",
            Self::Position => "Position",
            Self::Position2D => "Position2D",
            Self::ErrorPosition => "ErrorPosition",
            Self::Rotation => "Rotation",
            Self::PositionList => "PositionList",
            Self::PositionList2 => "Position2DList",
            Self::ErrorPositionList => "ErrorPositionList",
            Self::PoseList => "PoseList",
            Self::Matrix3x3 => "Matrix3x3",
            Self::Matrix3x4 => "Matrix3x4",
            Self::Matrix4x4 => "Matrix4x4",
            Self::Distance => "Distance",
            Self::Button => "Button",
            Self::Image => "VisionImage",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lowered || k.class_suffix().eq_ignore_ascii_case(s))
            .ok_or_else(|| ContractError::parse(format!("unknown measurement kind '{s}'")))
    }
}

/// A value type that can travel through the dataflow
pub trait MeasurementValue:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Type tag of this value
    const KIND: MeasurementKind;
}

/// Timestamped measurement
///
/// Immutable once built; ports copy it across boundaries instead of sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement<T> {
    /// Nanoseconds since epoch, `0` if unset
    #[serde(default)]
    timestamp: Timestamp,

    /// Payload
    value: T,
}

impl<T> Measurement<T> {
    /// Create a measurement
    pub fn new(timestamp: Timestamp, value: T) -> Self {
        Self { timestamp, value }
    }

    /// Create a measurement stamped with the current time
    pub fn now(value: T) -> Self {
        Self::new(now(), value)
    }

    /// Measurement time
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether a timestamp has been set
    #[inline]
    pub fn has_timestamp(&self) -> bool {
        self.timestamp != 0
    }

    /// Borrow the value
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume into the value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Copy with another timestamp
    pub fn with_timestamp(self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            value: self.value,
        }
    }
}

impl<T: MeasurementValue> Measurement<T> {
    /// Type tag of the value
    pub fn kind(&self) -> MeasurementKind {
        T::KIND
    }
}
