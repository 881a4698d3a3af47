//! Stage session: one controller connection and the domain API over it.
//!
//! A [`StageSession`] owns exactly one native session id and walks it through
//!
//! ```text
//! Uninitialized -> Created -> Connected -> Configured -> Ready -> Closed
//! ```
//!
//! Motion and query calls are only accepted in `Ready`. Every call blocks
//! until the controller has answered; moves always wait for the stage to stop.
//! Positions and velocities are re-read from the controller on every call.
//!
//! Closing disconnects and then frees the session id. Both steps are always
//! attempted. Dropping a session that was not closed runs the same sequence.

use std::fmt;

use tracing::{debug, info, warn};

use crate::binding::MotionBinding;
use crate::error::{Result, TangoError};
use crate::types::{Axis, Position, Unit, Velocity};

/// Lifecycle state of a [`StageSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Uninitialized,
    Created,
    Connected,
    Configured,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Configured => "configured",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Connection parameters for [`StageSession::connect`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    /// Serial port name, e.g. "COM1".
    pub port: String,
    pub baud_rate: i32,
    /// Interface type passed to `LSX_ConnectSimple` (1 = RS-232).
    pub interface_type: i32,
    /// Ask the DLL to show its protocol window.
    pub show_protocol: bool,
    /// Unit applied to all four axes after connecting.
    pub unit: Unit,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            port: "COM1".to_string(),
            baud_rate: tango_sys::DEFAULT_BAUD_RATE,
            interface_type: tango_sys::INTERFACE_RS232,
            show_protocol: false,
            unit: Unit::Micrometer,
        }
    }
}

/// Result of [`StageSession::get_position`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionReading {
    All(Position),
    Single(f64),
}

/// A single Tango controller connection.
///
/// Not thread-safe by contract: one owner issues one call at a time.
pub struct StageSession<B: MotionBinding> {
    binding: B,
    settings: StageSettings,
    lsid: Option<i32>,
    state: SessionState,
    unit: Unit,
}

impl<B: MotionBinding> StageSession<B> {
    /// Wrap a binding without touching the hardware.
    pub fn new(binding: B, settings: StageSettings) -> Self {
        let unit = settings.unit;
        Self {
            binding,
            settings,
            lsid: None,
            state: SessionState::Uninitialized,
            unit,
        }
    }

    /// Create, connect, and configure a session in one step.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use daq_driver_tango::{NativeBinding, StageSession, StageSettings};
    ///
    /// let binding = NativeBinding::load("C:/Tango/64/Tango_DLL.dll")?;
    /// let mut stage = StageSession::open(binding, StageSettings::default())?;
    /// stage.move_axis(5.0, "x", true)?;
    /// println!("{}", stage.position()?);
    /// stage.close()?;
    /// # Ok::<(), daq_driver_tango::TangoError>(())
    /// ```
    pub fn open(binding: B, settings: StageSettings) -> Result<Self> {
        let mut session = Self::new(binding, settings);
        session.connect()?;
        Ok(session)
    }

    /// Bring the session from `Uninitialized` to `Ready`.
    ///
    /// If no session id can be created the session stays `Uninitialized`.
    /// If connecting or configuring fails afterwards, the session id is
    /// released and the session ends up `Closed`; open a new one to retry.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(self.lifecycle_error("connect"));
        }

        let lsid = self.binding.create_session()?;
        self.lsid = Some(lsid);
        self.state = SessionState::Created;
        debug!(lsid, "Created Tango session id");

        if let Err(err) = self.connect_and_configure(lsid) {
            if let Err(cleanup) = self.close() {
                warn!(lsid, error = %cleanup, "Failed to release Tango session after open error");
            }
            return Err(err);
        }

        info!(
            lsid,
            port = %self.settings.port,
            baud_rate = self.settings.baud_rate,
            unit = %self.unit,
            "Tango stage ready"
        );
        Ok(())
    }

    fn connect_and_configure(&mut self, lsid: i32) -> Result<()> {
        let settings = &self.settings;
        self.binding.connect(
            lsid,
            settings.interface_type,
            &settings.port,
            settings.baud_rate,
            settings.show_protocol,
        )?;
        self.state = SessionState::Connected;

        let unit = self.settings.unit;
        self.apply_unit(lsid, unit)?;
        self.state = SessionState::Configured;

        self.state = SessionState::Ready;
        Ok(())
    }

    /// Disconnect, then free the session id.
    ///
    /// The free step runs even if disconnect fails. Failures of either step
    /// are returned together in [`TangoError::Close`]. The session is
    /// `Closed` afterwards regardless.
    pub fn close(&mut self) -> Result<()> {
        let lsid = match (self.state, self.lsid) {
            (SessionState::Closed, _) | (SessionState::Uninitialized, _) | (_, None) => {
                return Err(self.lifecycle_error("close"));
            }
            (_, Some(lsid)) => lsid,
        };

        let disconnect = if self.state >= SessionState::Connected {
            self.binding.disconnect(lsid).err()
        } else {
            None
        };
        let free = self.binding.free_session(lsid).err();

        self.state = SessionState::Closed;
        self.lsid = None;

        match (disconnect, free) {
            (None, None) => {
                info!(lsid, "Closed Tango session");
                Ok(())
            }
            (disconnect, free) => Err(TangoError::Close {
                disconnect: disconnect.map(Box::new),
                free: free.map(Box::new),
            }),
        }
    }

    /// Move one axis, addressed by name, and wait for it to stop.
    ///
    /// The axis name is validated before anything is sent to the controller.
    pub fn move_axis(&mut self, value: f64, axis: &str, relative: bool) -> Result<()> {
        let lsid = self.ready_lsid("move")?;
        let axis: Axis = axis.parse()?;
        self.move_on(lsid, axis, value, relative)
    }

    /// Typed form of [`StageSession::move_axis`].
    pub fn move_to(&mut self, axis: Axis, value: f64, relative: bool) -> Result<()> {
        let lsid = self.ready_lsid("move")?;
        self.move_on(lsid, axis, value, relative)
    }

    fn move_on(&mut self, lsid: i32, axis: Axis, value: f64, relative: bool) -> Result<()> {
        debug!(%axis, value, relative, unit = %self.unit, "Moving stage");
        if relative {
            self.binding.move_relative(lsid, axis.code(), value, true)
        } else {
            self.binding.move_absolute(lsid, axis.code(), value, true)
        }
    }

    /// All axes when `axis` is `None`, otherwise the named axis.
    pub fn get_position(&self, axis: Option<&str>) -> Result<PositionReading> {
        let lsid = self.ready_lsid("get position")?;
        match axis {
            None => Ok(PositionReading::All(self.binding.get_position(lsid)?)),
            Some(name) => {
                let axis: Axis = name.parse()?;
                Ok(PositionReading::Single(
                    self.binding.get_position_single_axis(lsid, axis.code())?,
                ))
            }
        }
    }

    pub fn position(&self) -> Result<Position> {
        let lsid = self.ready_lsid("get position")?;
        self.binding.get_position(lsid)
    }

    pub fn axis_position(&self, axis: Axis) -> Result<f64> {
        let lsid = self.ready_lsid("get position")?;
        self.binding.get_position_single_axis(lsid, axis.code())
    }

    /// Whether any of `axes` (all axes when `None`) reports a non-zero velocity.
    ///
    /// This reads `LSX_GetVel`, which is a velocity readback rather than a
    /// motion status flag.
    pub fn is_moving(&self, axes: Option<&[Axis]>) -> Result<bool> {
        let velocity = self.get_velocity()?;
        let axes = axes.unwrap_or(&Axis::ALL);
        Ok(axes.iter().any(|axis| velocity.get(*axis) != 0.0))
    }

    pub fn get_velocity(&self) -> Result<Velocity> {
        let lsid = self.ready_lsid("get velocity")?;
        self.binding.get_velocity(lsid)
    }

    /// Set the velocity of one axis, addressed by name.
    pub fn set_velocity(&mut self, axis: &str, value: f64) -> Result<()> {
        let lsid = self.ready_lsid("set velocity")?;
        let axis: Axis = axis.parse()?;
        self.set_velocity_on(lsid, axis, value)
    }

    /// Typed form of [`StageSession::set_velocity`].
    pub fn set_axis_velocity(&mut self, axis: Axis, value: f64) -> Result<()> {
        let lsid = self.ready_lsid("set velocity")?;
        self.set_velocity_on(lsid, axis, value)
    }

    fn set_velocity_on(&mut self, lsid: i32, axis: Axis, value: f64) -> Result<()> {
        debug!(%axis, value, "Setting axis velocity");
        self.binding.set_velocity_single_axis(lsid, axis.code(), value)
    }

    /// Switch all four axes to the named unit.
    pub fn set_units(&mut self, unit: &str) -> Result<()> {
        let lsid = self.ready_lsid("set units")?;
        let unit: Unit = unit.parse()?;
        self.apply_unit(lsid, unit)
    }

    /// Typed form of [`StageSession::set_units`].
    pub fn set_unit(&mut self, unit: Unit) -> Result<()> {
        let lsid = self.ready_lsid("set units")?;
        self.apply_unit(lsid, unit)
    }

    fn apply_unit(&mut self, lsid: i32, unit: Unit) -> Result<()> {
        let code = unit.code();
        self.binding.set_dimensions(lsid, code, code, code, code)?;
        self.unit = unit;
        debug!(%unit, "Applied unit to all axes");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Active unit for positions and velocities.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Native session id, while one is held.
    pub fn session_id(&self) -> Option<i32> {
        self.lsid
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    fn ready_lsid(&self, operation: &'static str) -> Result<i32> {
        match (self.state, self.lsid) {
            (SessionState::Ready, Some(lsid)) => Ok(lsid),
            _ => Err(self.lifecycle_error(operation)),
        }
    }

    fn lifecycle_error(&self, operation: &'static str) -> TangoError {
        TangoError::Lifecycle {
            operation,
            state: self.state,
        }
    }
}

impl<B: MotionBinding> fmt::Debug for StageSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSession")
            .field("lsid", &self.lsid)
            .field("state", &self.state)
            .field("unit", &self.unit)
            .field("port", &self.settings.port)
            .finish()
    }
}

impl<B: MotionBinding> Drop for StageSession<B> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Closed
        ) {
            return;
        }
        debug!(lsid = ?self.lsid, "Closing Tango session on drop");
        if let Err(err) = self.close() {
            warn!(error = %err, "Error closing Tango session");
        }
    }
}
