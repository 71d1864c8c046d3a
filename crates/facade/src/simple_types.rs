//! Flat value types of the simple boundary
//!
//! Plain `f64` fields and arrays, each carrying its own timestamp. Matrices
//! are row-major.

use bytes::Bytes;
use nalgebra::{Matrix3, Matrix6, Quaternion, UnitQuaternion, Vector2, Vector3};

use contracts::{
    Button, ContractError, Distance, ErrorPose, ErrorPosition, ErrorPositionList, ImageData, Matrix3x3,
    Matrix3x4, Matrix4x4, Measurement, MeasurementValue, Pose, Position, Position2D, PositionList,
    PositionList2, Timestamp,
};

/// Conversion between a flat value and its measurement
pub trait SimpleValue: Sized + Send + 'static {
    /// Measurement value carried on the bus
    type Value: MeasurementValue;

    fn from_measurement(m: Measurement<Self::Value>) -> Self;

    /// Fails when the flat value cannot represent a valid measurement
    fn into_measurement(self) -> Result<Measurement<Self::Value>, ContractError>;
}

fn row_major<const N: usize>(column_major_transposed: &[f64]) -> [f64; N] {
    let mut out = [0.0; N];
    out.copy_from_slice(column_major_transposed);
    out
}

fn rotation(rx: f64, ry: f64, rz: f64, rw: f64) -> Result<UnitQuaternion<f64>, ContractError> {
    let q = Quaternion::new(rw, rx, ry, rz);
    if q.norm() == 0.0 || !q.norm().is_finite() {
        return Err(ContractError::parse("rotation quaternion must be non-zero and finite"));
    }
    Ok(UnitQuaternion::from_quaternion(q))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimplePose {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub rw: f64,
    pub timestamp: Timestamp,
}

impl SimplePose {
    fn from_pose(pose: &Pose, timestamp: Timestamp) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            tx: pose.translation.x,
            ty: pose.translation.y,
            tz: pose.translation.z,
            rx: q.i,
            ry: q.j,
            rz: q.k,
            rw: q.w,
            timestamp,
        }
    }

    fn to_pose(self) -> Result<Pose, ContractError> {
        Ok(Pose::new(
            rotation(self.rx, self.ry, self.rz, self.rw)?,
            Vector3::new(self.tx, self.ty, self.tz),
        ))
    }
}

impl SimpleValue for SimplePose {
    type Value = Pose;

    fn from_measurement(m: Measurement<Pose>) -> Self {
        Self::from_pose(m.value(), m.timestamp())
    }

    fn into_measurement(self) -> Result<Measurement<Pose>, ContractError> {
        Ok(Measurement::new(self.timestamp, self.to_pose()?))
    }
}

/// Pose with a row-major 6x6 covariance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleErrorPose {
    pub pose: SimplePose,
    pub covariance: Vec<f64>,
}

impl SimpleValue for SimpleErrorPose {
    type Value = ErrorPose;

    fn from_measurement(m: Measurement<ErrorPose>) -> Self {
        let timestamp = m.timestamp();
        let value = m.into_value();
        Self {
            pose: SimplePose::from_pose(&value.pose, timestamp),
            covariance: value.covariance.transpose().as_slice().to_vec(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<ErrorPose>, ContractError> {
        if self.covariance.len() != 36 {
            return Err(ContractError::parse(format!(
                "error pose covariance needs 36 values, got {}",
                self.covariance.len()
            )));
        }
        let value = ErrorPose {
            pose: self.pose.to_pose()?,
            covariance: Matrix6::from_row_slice(&self.covariance),
        };
        Ok(Measurement::new(self.pose.timestamp, value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimplePosition2D {
    pub x: f64,
    pub y: f64,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimplePosition2D {
    type Value = Position2D;

    fn from_measurement(m: Measurement<Position2D>) -> Self {
        Self {
            x: m.value().x,
            y: m.value().y,
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<Position2D>, ContractError> {
        Ok(Measurement::new(self.timestamp, Vector2::new(self.x, self.y)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimplePosition3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimplePosition3D {
    type Value = Position;

    fn from_measurement(m: Measurement<Position>) -> Self {
        Self {
            x: m.value().x,
            y: m.value().y,
            z: m.value().z,
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<Position>, ContractError> {
        Ok(Measurement::new(self.timestamp, Vector3::new(self.x, self.y, self.z)))
    }
}

/// 3D position with a row-major 3x3 covariance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimpleErrorPosition3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub covariance: [f64; 9],
    pub timestamp: Timestamp,
}

impl SimpleErrorPosition3D {
    fn from_value(value: &ErrorPosition, timestamp: Timestamp) -> Self {
        Self {
            x: value.value.x,
            y: value.value.y,
            z: value.value.z,
            covariance: row_major(value.covariance.transpose().as_slice()),
            timestamp,
        }
    }

    fn to_value(self) -> ErrorPosition {
        ErrorPosition {
            value: Vector3::new(self.x, self.y, self.z),
            covariance: Matrix3::from_row_slice(&self.covariance),
        }
    }
}

impl SimpleValue for SimpleErrorPosition3D {
    type Value = ErrorPosition;

    fn from_measurement(m: Measurement<ErrorPosition>) -> Self {
        Self::from_value(m.value(), m.timestamp())
    }

    fn into_measurement(self) -> Result<Measurement<ErrorPosition>, ContractError> {
        Ok(Measurement::new(self.timestamp, self.to_value()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplePosition2DList {
    pub values: Vec<[f64; 2]>,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimplePosition2DList {
    type Value = PositionList2;

    fn from_measurement(m: Measurement<PositionList2>) -> Self {
        Self {
            values: m.value().iter().map(|p| [p.x, p.y]).collect(),
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<PositionList2>, ContractError> {
        let values = self.values.iter().map(|[x, y]| Vector2::new(*x, *y)).collect();
        Ok(Measurement::new(self.timestamp, values))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplePositionList3D {
    pub values: Vec<[f64; 3]>,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimplePositionList3D {
    type Value = PositionList;

    fn from_measurement(m: Measurement<PositionList>) -> Self {
        Self {
            values: m.value().iter().map(|p| [p.x, p.y, p.z]).collect(),
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<PositionList>, ContractError> {
        let values = self.values.iter().map(|[x, y, z]| Vector3::new(*x, *y, *z)).collect();
        Ok(Measurement::new(self.timestamp, values))
    }
}

/// List of positions with covariance; element timestamps are ignored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleErrorPositionList3D {
    pub values: Vec<SimpleErrorPosition3D>,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimpleErrorPositionList3D {
    type Value = ErrorPositionList;

    fn from_measurement(m: Measurement<ErrorPositionList>) -> Self {
        let timestamp = m.timestamp();
        Self {
            values: m
                .value()
                .iter()
                .map(|p| SimpleErrorPosition3D::from_value(p, timestamp))
                .collect(),
            timestamp,
        }
    }

    fn into_measurement(self) -> Result<Measurement<ErrorPositionList>, ContractError> {
        let values = self.values.into_iter().map(SimpleErrorPosition3D::to_value).collect();
        Ok(Measurement::new(self.timestamp, values))
    }
}

macro_rules! simple_matrix {
    ($(#[$doc:meta])* $name:ident, $value:ty, $len:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            /// Row-major elements
            pub values: [f64; $len],
            pub timestamp: Timestamp,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    values: [0.0; $len],
                    timestamp: 0,
                }
            }
        }

        impl SimpleValue for $name {
            type Value = $value;

            fn from_measurement(m: Measurement<$value>) -> Self {
                Self {
                    values: row_major(m.value().transpose().as_slice()),
                    timestamp: m.timestamp(),
                }
            }

            fn into_measurement(self) -> Result<Measurement<$value>, ContractError> {
                Ok(Measurement::new(self.timestamp, <$value>::from_row_slice(&self.values)))
            }
        }
    };
}

simple_matrix!(
    /// 3x3 matrix
    SimpleMatrix3x3, Matrix3x3, 9
);
simple_matrix!(
    /// 3x4 matrix
    SimpleMatrix3x4, Matrix3x4, 12
);
simple_matrix!(
    /// 4x4 matrix
    SimpleMatrix4x4, Matrix4x4, 16
);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimpleDistance {
    pub d: f64,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimpleDistance {
    type Value = Distance;

    fn from_measurement(m: Measurement<Distance>) -> Self {
        Self {
            d: *m.value(),
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<Distance>, ContractError> {
        Ok(Measurement::new(self.timestamp, self.d))
    }
}

/// Button press; `event` is the button code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimpleButton {
    pub event: i32,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimpleButton {
    type Value = Button;

    fn from_measurement(m: Measurement<Button>) -> Self {
        Self {
            event: *m.value(),
            timestamp: m.timestamp(),
        }
    }

    fn into_measurement(self) -> Result<Measurement<Button>, ContractError> {
        Ok(Measurement::new(self.timestamp, self.event))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub depth: u32,
    pub width_step: u32,
    pub data: Bytes,
    pub timestamp: Timestamp,
}

impl SimpleValue for SimpleImage {
    type Value = ImageData;

    fn from_measurement(m: Measurement<ImageData>) -> Self {
        let timestamp = m.timestamp();
        let image = m.into_value();
        Self {
            width: image.width,
            height: image.height,
            channels: image.channels,
            depth: image.depth,
            width_step: image.width_step,
            data: image.data,
            timestamp,
        }
    }

    fn into_measurement(self) -> Result<Measurement<ImageData>, ContractError> {
        let image = ImageData {
            width: self.width,
            height: self.height,
            channels: self.channels,
            depth: self.depth,
            width_step: self.width_step,
            data: self.data,
        };
        if image.data.len() < image.image_size() {
            return Err(ContractError::parse(format!(
                "image needs {} bytes, got {}",
                image.image_size(),
                image.data.len()
            )));
        }
        Ok(Measurement::new(self.timestamp, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_conversion_keeps_quaternion() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let pose = Pose::new(rotation, Vector3::new(1.0, 2.0, 3.0));
        let simple = SimplePose::from_measurement(Measurement::new(42, pose));

        assert_eq!((simple.tx, simple.ty, simple.tz), (1.0, 2.0, 3.0));
        assert_eq!(simple.timestamp, 42);
        let back = simple.into_measurement().unwrap();
        assert!(back.value().rotation.angle_to(&rotation) < 1e-12);
    }

    #[test]
    fn test_zero_quaternion_rejected() {
        let simple = SimplePose::default();
        assert!(matches!(simple.into_measurement(), Err(ContractError::Parse { .. })));
    }

    #[test]
    fn test_matrix_is_row_major() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let simple = SimpleMatrix3x4 { values, timestamp: 1 };
        let m = simple.into_measurement().unwrap();
        assert_eq!(m.value()[(0, 1)], 2.0);
        assert_eq!(m.value()[(1, 0)], 5.0);
        assert_eq!(SimpleMatrix3x4::from_measurement(m).values, values);
    }

    #[test]
    fn test_error_pose_covariance_length_checked() {
        let simple = SimpleErrorPose {
            pose: SimplePose {
                rw: 1.0,
                ..SimplePose::default()
            },
            covariance: vec![0.0; 35],
        };
        assert!(simple.into_measurement().is_err());
    }

    #[test]
    fn test_short_image_rejected() {
        let image = SimpleImage {
            width: 2,
            height: 2,
            channels: 1,
            depth: 8,
            width_step: 2,
            data: Bytes::from_static(&[0, 0, 0]),
            timestamp: 0,
        };
        assert!(image.into_measurement().is_err());
    }
}
