//! Safe Rust driver for Marzhauser Tango stage controllers.
//!
//! This crate wraps the raw entry points from `tango-sys` in a typed,
//! unit-aware, axis-aware API with explicit status-code translation and
//! RAII session cleanup.
//!
//! # Architecture
//!
//! ## Binding
//! - [`MotionBinding`] - Typed entry points (plain values in, plain values out)
//! - [`NativeBinding`] - Implementation over the vendor DLL, loaded at runtime
//! - [`MockBinding`] - In-memory controller for tests (`mock` feature)
//!
//! ## Session
//! - [`StageSession`] - One controller connection with lifecycle tracking
//! - [`StageSettings`] - Port, baud rate, and unit for a connection
//!
//! ## Values
//! - [`Axis`], [`Unit`] - Enumerated axes and units with their native codes
//! - [`Position`], [`Velocity`] - Four-axis readings
//!
//! # Concurrency
//!
//! Everything here is synchronous and blocking. A session is used from one
//! thread at a time; no call has a timeout, so a hung native call hangs the
//! caller.
//!
//! # Example
//!
//! ```no_run
//! use daq_driver_tango::{Axis, NativeBinding, StageSession, StageSettings, Unit};
//!
//! # fn example() -> daq_driver_tango::Result<()> {
//! let binding = NativeBinding::load("C:/Program Files/Tango/64/Tango_DLL.dll")?;
//! let settings = StageSettings {
//!     port: "COM3".to_string(),
//!     unit: Unit::Millimeter,
//!     ..Default::default()
//! };
//! let mut stage = StageSession::open(binding, settings)?;
//!
//! stage.move_to(Axis::X, 5.0, true)?;
//! println!("z = {:.3} mm", stage.axis_position(Axis::Z)?);
//!
//! stage.close()?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod session;
pub mod types;

pub use binding::{check_status, MotionBinding, NativeBinding, Operation};
pub use error::{Result, TangoError};
#[cfg(feature = "mock")]
pub use mock::MockBinding;
pub use session::{PositionReading, SessionState, StageSession, StageSettings};
pub use types::{Axis, AxisValues, Position, Unit, Velocity};
