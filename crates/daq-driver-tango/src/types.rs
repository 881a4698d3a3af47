//! Domain values shared by the binding and the session: axes, units, and
//! per-axis readings.

use std::fmt;
use std::os::raw::c_int;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TangoError;

/// One independently controllable degree of freedom of the stage.
///
/// Deserializes through [`FromStr`], so configuration accepts the same
/// spellings as the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[repr(i32)]
pub enum Axis {
    #[serde(rename = "x")]
    X = tango_sys::AXIS_X,
    #[serde(rename = "y")]
    Y = tango_sys::AXIS_Y,
    #[serde(rename = "z")]
    Z = tango_sys::AXIS_Z,
    #[serde(rename = "a")]
    Auxiliary = tango_sys::AXIS_A,
}

impl Axis {
    /// All axes in controller order.
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::Auxiliary];

    /// Axis number expected by the native protocol.
    pub fn code(self) -> c_int {
        self as c_int
    }

    /// Short name used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Auxiliary => "a",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = TangoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            "a" | "aux" | "auxiliary" => Ok(Self::Auxiliary),
            _ => Err(TangoError::UnknownAxis {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Axis {
    type Error = TangoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Physical unit the controller reports and accepts coordinates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[repr(i32)]
pub enum Unit {
    #[serde(rename = "microsteps")]
    Microsteps = tango_sys::DIM_MICROSTEPS,
    #[serde(rename = "um")]
    Micrometer = tango_sys::DIM_MICROMETER,
    #[serde(rename = "mm")]
    Millimeter = tango_sys::DIM_MILLIMETER,
    #[serde(rename = "degree")]
    Degree = tango_sys::DIM_DEGREE,
    #[serde(rename = "revolutions")]
    Revolution = tango_sys::DIM_REVOLUTIONS,
    #[serde(rename = "cm")]
    Centimeter = tango_sys::DIM_CENTIMETER,
    #[serde(rename = "m")]
    Meter = tango_sys::DIM_METER,
    #[serde(rename = "inch")]
    Inch = tango_sys::DIM_INCH,
    #[serde(rename = "mil")]
    Mil = tango_sys::DIM_MIL,
}

impl Unit {
    /// Every unit the controller understands.
    pub const ALL: [Unit; 9] = [
        Unit::Microsteps,
        Unit::Micrometer,
        Unit::Millimeter,
        Unit::Degree,
        Unit::Revolution,
        Unit::Centimeter,
        Unit::Meter,
        Unit::Inch,
        Unit::Mil,
    ];

    /// Dimension code for `LSX_SetDimensions`.
    pub fn code(self) -> c_int {
        self as c_int
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Microsteps => "microsteps",
            Self::Micrometer => "um",
            Self::Millimeter => "mm",
            Self::Degree => "degree",
            Self::Revolution => "revolutions",
            Self::Centimeter => "cm",
            Self::Meter => "m",
            Self::Inch => "inch",
            Self::Mil => "mil",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Unit {
    type Err = TangoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microsteps" | "microstep" => Ok(Self::Microsteps),
            "um" | "micrometer" | "micrometers" => Ok(Self::Micrometer),
            "mm" | "millimeter" | "millimeters" => Ok(Self::Millimeter),
            "degree" | "degrees" | "deg" => Ok(Self::Degree),
            "revolutions" | "revolution" | "rev" => Ok(Self::Revolution),
            "cm" | "centimeter" | "centimeters" => Ok(Self::Centimeter),
            "m" | "meter" | "meters" => Ok(Self::Meter),
            "inch" | "inches" | "in" => Ok(Self::Inch),
            "mil" | "mils" => Ok(Self::Mil),
            _ => Err(TangoError::UnknownUnit {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Unit {
    type Error = TangoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One reading per axis, in the session's active unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisValues {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
}

/// Stage coordinates, re-read from hardware on every query.
pub type Position = AxisValues;

/// Per-axis speed in the active unit per second.
pub type Velocity = AxisValues;

impl AxisValues {
    pub fn new(x: f64, y: f64, z: f64, a: f64) -> Self {
        Self { x, y, z, a }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::Auxiliary => self.a,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::Auxiliary => self.a = value,
        }
    }

    /// Labeled values in controller order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL.into_iter().map(move |axis| (axis, self.get(axis)))
    }
}

impl fmt::Display for AxisValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={:.4} y={:.4} z={:.4} a={:.4}",
            self.x, self.y, self.z, self.a
        )
    }
}
