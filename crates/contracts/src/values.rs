//! Measurement value types
//!
//! Geometric values are plain `nalgebra` types; compound values get their
//! own structs. Each type maps to exactly one [`MeasurementKind`].

use bytes::Bytes;
use nalgebra::{Matrix3, Matrix4, Matrix6, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{MeasurementKind, MeasurementValue};

/// 3D position
pub type Position = Vector3<f64>;

/// 2D position (image coordinates)
pub type Position2D = Vector2<f64>;

/// Orientation
pub type Rotation = UnitQuaternion<f64>;

/// List of 3D positions
pub type PositionList = Vec<Position>;

/// List of 2D positions
pub type PositionList2 = Vec<Position2D>;

/// List of 3D positions with covariance
pub type ErrorPositionList = Vec<ErrorPosition>;

/// List of poses
pub type PoseList = Vec<Pose>;

/// 3x3 matrix (e.g. camera intrinsics)
pub type Matrix3x3 = Matrix3<f64>;

/// 3x4 matrix (e.g. projection)
pub type Matrix3x4 = nalgebra::Matrix3x4<f64>;

/// 4x4 homogeneous matrix
pub type Matrix4x4 = Matrix4<f64>;

/// Scalar distance
pub type Distance = f64;

/// Button / scalar event code
pub type Button = i32;

/// Rigid body transformation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation part
    pub rotation: UnitQuaternion<f64>,

    /// Translation part
    pub translation: Vector3<f64>,
}

impl Pose {
    /// Create a pose
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity transform
    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity(), Vector3::zeros())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Pose with a 6x6 covariance (translation first, then rotation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPose {
    /// Mean pose
    pub pose: Pose,

    /// Covariance
    pub covariance: Matrix6<f64>,
}

/// 3D position with a 3x3 covariance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPosition {
    /// Mean position
    pub value: Vector3<f64>,

    /// Covariance
    pub covariance: Matrix3<f64>,
}

/// Camera frame
///
/// The payload is carried as-is; pixel semantics belong to vision components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Channels per pixel
    pub channels: u32,

    /// Bits per channel
    pub depth: u32,

    /// Bytes per row
    pub width_step: u32,

    /// Raw pixel data
    pub data: Bytes,
}

impl ImageData {
    /// Total payload size
    pub fn image_size(&self) -> usize {
        self.width_step as usize * self.height as usize
    }
}

macro_rules! measurement_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl MeasurementValue for $ty {
                const KIND: MeasurementKind = MeasurementKind::$kind;
            }
        )*
    };
}

measurement_value! {
    Pose => Pose,
    ErrorPose => ErrorPose,
    Position => Position,
    Position2D => Position2D,
    ErrorPosition => ErrorPosition,
    Rotation => Rotation,
    PositionList => PositionList,
    PositionList2 => PositionList2,
    ErrorPositionList => ErrorPositionList,
    PoseList => PoseList,
    Matrix3x3 => Matrix3x3,
    Matrix3x4 => Matrix3x4,
    Matrix4x4 => Matrix4x4,
    Distance => Distance,
    Button => Button,
    ImageData => Image,
}
