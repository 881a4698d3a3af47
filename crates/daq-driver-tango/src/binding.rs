//! Typed wrappers around the Tango entry points.
//!
//! [`MotionBinding`] is the seam between the session and the foreign library:
//! every method takes plain numbers, strings, and booleans, returns plain
//! values, and maps the native status code into [`TangoError`]. The only
//! production implementation is [`NativeBinding`]; tests use
//! [`crate::mock::MockBinding`].
//!
//! Calls block until the native function returns. There is no timeout: a
//! native call that never returns hangs the calling thread.

use std::ffi::CString;
use std::fmt;
use std::os::raw::{c_double, c_int};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace};

use tango_sys::TangoLibrary;

use crate::error::{Result, TangoError};
use crate::types::AxisValues;

/// Native entry points wrapped by the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateSession,
    Connect,
    Disconnect,
    FreeSession,
    SetDimensions,
    MoveAbsolute,
    MoveRelative,
    GetPosition,
    GetPositionSingleAxis,
    GetVelocity,
    SetVelocitySingleAxis,
}

impl Operation {
    /// Stable logical name, used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::FreeSession => "free-session",
            Self::SetDimensions => "set-dimensions",
            Self::MoveAbsolute => "move-absolute-single-axis",
            Self::MoveRelative => "move-relative-single-axis",
            Self::GetPosition => "get-position",
            Self::GetPositionSingleAxis => "get-position-single-axis",
            Self::GetVelocity => "get-velocity",
            Self::SetVelocitySingleAxis => "set-velocity-single-axis",
        }
    }

    /// NUL-terminated export name in the vendor library.
    pub fn symbol(self) -> &'static [u8] {
        match self {
            Self::CreateSession => tango_sys::SYM_CREATE_LSID,
            Self::Connect => tango_sys::SYM_CONNECT_SIMPLE,
            Self::Disconnect => tango_sys::SYM_DISCONNECT,
            Self::FreeSession => tango_sys::SYM_FREE_LSID,
            Self::SetDimensions => tango_sys::SYM_SET_DIMENSIONS,
            Self::MoveAbsolute => tango_sys::SYM_MOVE_ABS_SINGLE_AXIS,
            Self::MoveRelative => tango_sys::SYM_MOVE_REL_SINGLE_AXIS,
            Self::GetPosition => tango_sys::SYM_GET_POS,
            Self::GetPositionSingleAxis => tango_sys::SYM_GET_POS_SINGLE_AXIS,
            Self::GetVelocity => tango_sys::SYM_GET_VEL,
            Self::SetVelocitySingleAxis => tango_sys::SYM_SET_VEL_SINGLE_AXIS,
        }
    }

    /// Export name without the trailing NUL, for display.
    pub fn native_name(self) -> &'static str {
        let symbol = self.symbol();
        std::str::from_utf8(&symbol[..symbol.len() - 1]).unwrap_or("LSX_?")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a native status code to a result. Out-parameters must not be read
/// unless this returns `Ok`.
pub fn check_status(operation: Operation, code: c_int) -> Result<()> {
    if code == tango_sys::LSX_SUCCESS {
        Ok(())
    } else {
        Err(TangoError::Status { operation, code })
    }
}

/// Typed access to the Tango entry points.
///
/// `lsid` is the session id returned by [`MotionBinding::create_session`].
/// Implementations perform no locking; callers serialize access.
pub trait MotionBinding {
    /// `LSX_CreateLSID`: allocate a session id.
    fn create_session(&self) -> Result<i32>;

    /// `LSX_ConnectSimple`: open the controller connection.
    fn connect(
        &self,
        lsid: i32,
        interface_type: i32,
        port: &str,
        baud_rate: i32,
        show_protocol: bool,
    ) -> Result<()>;

    /// `LSX_Disconnect`
    fn disconnect(&self, lsid: i32) -> Result<()>;

    /// `LSX_FreeLSID`
    fn free_session(&self, lsid: i32) -> Result<()>;

    /// `LSX_SetDimensions`: one unit code per axis.
    fn set_dimensions(&self, lsid: i32, x: i32, y: i32, z: i32, a: i32) -> Result<()>;

    /// `LSX_MoveAbsSingleAxis`
    fn move_absolute(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()>;

    /// `LSX_MoveRelSingleAxis`
    fn move_relative(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()>;

    /// `LSX_GetPos`
    fn get_position(&self, lsid: i32) -> Result<AxisValues>;

    /// `LSX_GetPosSingleAxis`
    fn get_position_single_axis(&self, lsid: i32, axis: i32) -> Result<f64>;

    /// `LSX_GetVel`
    fn get_velocity(&self, lsid: i32) -> Result<AxisValues>;

    /// `LSX_SetVelSingleAxis`
    fn set_velocity_single_axis(&self, lsid: i32, axis: i32, velocity: f64) -> Result<()>;
}

macro_rules! forward_binding {
    ($ty:ty) => {
        impl<B: MotionBinding + ?Sized> MotionBinding for $ty {
            fn create_session(&self) -> Result<i32> {
                (**self).create_session()
            }
            fn connect(
                &self,
                lsid: i32,
                interface_type: i32,
                port: &str,
                baud_rate: i32,
                show_protocol: bool,
            ) -> Result<()> {
                (**self).connect(lsid, interface_type, port, baud_rate, show_protocol)
            }
            fn disconnect(&self, lsid: i32) -> Result<()> {
                (**self).disconnect(lsid)
            }
            fn free_session(&self, lsid: i32) -> Result<()> {
                (**self).free_session(lsid)
            }
            fn set_dimensions(&self, lsid: i32, x: i32, y: i32, z: i32, a: i32) -> Result<()> {
                (**self).set_dimensions(lsid, x, y, z, a)
            }
            fn move_absolute(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
                (**self).move_absolute(lsid, axis, value, wait)
            }
            fn move_relative(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
                (**self).move_relative(lsid, axis, value, wait)
            }
            fn get_position(&self, lsid: i32) -> Result<AxisValues> {
                (**self).get_position(lsid)
            }
            fn get_position_single_axis(&self, lsid: i32, axis: i32) -> Result<f64> {
                (**self).get_position_single_axis(lsid, axis)
            }
            fn get_velocity(&self, lsid: i32) -> Result<AxisValues> {
                (**self).get_velocity(lsid)
            }
            fn set_velocity_single_axis(&self, lsid: i32, axis: i32, velocity: f64) -> Result<()> {
                (**self).set_velocity_single_axis(lsid, axis, velocity)
            }
        }
    };
}

forward_binding!(&B);
forward_binding!(Box<B>);
forward_binding!(Arc<B>);

/// Binding over the vendor shared library loaded at runtime.
///
/// Entry points are resolved on each call, so a library that lacks one of
/// them still loads; calling the missing entry point reports
/// [`TangoError::BindingCall`].
#[derive(Debug)]
pub struct NativeBinding {
    library: TangoLibrary,
}

impl NativeBinding {
    /// Load the Tango library from an explicit path.
    ///
    /// The path is resolved by the caller's configuration layer (driver
    /// directory and process architecture); it is never searched for here.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: the configured path names the vendor Tango DLL, whose
        // initialisation routines have no preconditions.
        let library = unsafe { TangoLibrary::load(path) }.map_err(|e| TangoError::LibraryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), "Loaded Tango library");
        Ok(Self { library })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        self.library.path()
    }

    fn entry<T>(&self, operation: Operation) -> Result<tango_sys::Symbol<'_, T>> {
        // SAFETY: every caller pairs `operation` with the matching `LSX_*`
        // function pointer type from tango-sys.
        unsafe { self.library.get::<T>(operation.symbol()) }.map_err(|e| TangoError::BindingCall {
            operation,
            message: format!("{}: {}", operation.native_name(), e),
        })
    }
}

impl MotionBinding for NativeBinding {
    fn create_session(&self) -> Result<i32> {
        let op = Operation::CreateSession;
        let create = self.entry::<tango_sys::LSX_CreateLSID>(op)?;
        let mut lsid: c_int = 0;
        // SAFETY: `lsid` is a valid, writable c_int for the duration of the call.
        let code = unsafe { create(&mut lsid) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)?;
        Ok(lsid)
    }

    fn connect(
        &self,
        lsid: i32,
        interface_type: i32,
        port: &str,
        baud_rate: i32,
        show_protocol: bool,
    ) -> Result<()> {
        let op = Operation::Connect;
        let port_c = encode_port(port)?;
        let connect = self.entry::<tango_sys::LSX_ConnectSimple>(op)?;
        debug!(lsid, interface_type, port, baud_rate, "LSX_ConnectSimple");
        // SAFETY: `port_c` outlives the call and is NUL-terminated.
        let code = unsafe {
            connect(
                lsid,
                interface_type,
                port_c.as_ptr(),
                baud_rate,
                tango_sys::BOOL::from(show_protocol),
            )
        };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn disconnect(&self, lsid: i32) -> Result<()> {
        let op = Operation::Disconnect;
        let disconnect = self.entry::<tango_sys::LSX_Disconnect>(op)?;
        // SAFETY: scalar arguments only.
        let code = unsafe { disconnect(lsid) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn free_session(&self, lsid: i32) -> Result<()> {
        let op = Operation::FreeSession;
        let free = self.entry::<tango_sys::LSX_FreeLSID>(op)?;
        // SAFETY: scalar arguments only.
        let code = unsafe { free(lsid) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn set_dimensions(&self, lsid: i32, x: i32, y: i32, z: i32, a: i32) -> Result<()> {
        let op = Operation::SetDimensions;
        let set_dimensions = self.entry::<tango_sys::LSX_SetDimensions>(op)?;
        debug!(lsid, x, y, z, a, "LSX_SetDimensions");
        // SAFETY: scalar arguments only.
        let code = unsafe { set_dimensions(lsid, x, y, z, a) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn move_absolute(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
        let op = Operation::MoveAbsolute;
        let move_abs = self.entry::<tango_sys::LSX_MoveAbsSingleAxis>(op)?;
        debug!(lsid, axis, value, wait, "LSX_MoveAbsSingleAxis");
        // SAFETY: scalar arguments only.
        let code = unsafe { move_abs(lsid, axis, value, tango_sys::BOOL::from(wait)) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn move_relative(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
        let op = Operation::MoveRelative;
        let move_rel = self.entry::<tango_sys::LSX_MoveRelSingleAxis>(op)?;
        debug!(lsid, axis, value, wait, "LSX_MoveRelSingleAxis");
        // SAFETY: scalar arguments only.
        let code = unsafe { move_rel(lsid, axis, value, tango_sys::BOOL::from(wait)) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }

    fn get_position(&self, lsid: i32) -> Result<AxisValues> {
        let op = Operation::GetPosition;
        let get_pos = self.entry::<tango_sys::LSX_GetPos>(op)?;
        let (mut x, mut y, mut z, mut a): (c_double, c_double, c_double, c_double) =
            (0.0, 0.0, 0.0, 0.0);
        // SAFETY: the four out-pointers are distinct, valid locals.
        let code = unsafe { get_pos(lsid, &mut x, &mut y, &mut z, &mut a) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)?;
        Ok(AxisValues::new(x, y, z, a))
    }

    fn get_position_single_axis(&self, lsid: i32, axis: i32) -> Result<f64> {
        let op = Operation::GetPositionSingleAxis;
        let get_pos = self.entry::<tango_sys::LSX_GetPosSingleAxis>(op)?;
        let mut position: c_double = 0.0;
        // SAFETY: `position` is a valid, writable local.
        let code = unsafe { get_pos(lsid, axis, &mut position) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)?;
        Ok(position)
    }

    fn get_velocity(&self, lsid: i32) -> Result<AxisValues> {
        let op = Operation::GetVelocity;
        let get_vel = self.entry::<tango_sys::LSX_GetVel>(op)?;
        let (mut x, mut y, mut z, mut a): (c_double, c_double, c_double, c_double) =
            (0.0, 0.0, 0.0, 0.0);
        // SAFETY: the four out-pointers are distinct, valid locals.
        let code = unsafe { get_vel(lsid, &mut x, &mut y, &mut z, &mut a) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)?;
        Ok(AxisValues::new(x, y, z, a))
    }

    fn set_velocity_single_axis(&self, lsid: i32, axis: i32, velocity: f64) -> Result<()> {
        let op = Operation::SetVelocitySingleAxis;
        let set_vel = self.entry::<tango_sys::LSX_SetVelSingleAxis>(op)?;
        debug!(lsid, axis, velocity, "LSX_SetVelSingleAxis");
        // SAFETY: scalar arguments only.
        let code = unsafe { set_vel(lsid, axis, velocity) };
        trace!(op = %op, code, "native call returned");
        check_status(op, code)
    }
}

/// Transcode a port name to the single-byte C string the DLL expects.
fn encode_port(port: &str) -> Result<CString> {
    if !port.is_ascii() {
        return Err(TangoError::InvalidArgument {
            operation: Operation::Connect,
            message: format!("port name '{}' is not ASCII", port),
        });
    }
    CString::new(port).map_err(|_| TangoError::InvalidArgument {
        operation: Operation::Connect,
        message: format!("port name '{}' contains a NUL byte", port.escape_debug()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert!(check_status(Operation::Connect, 0).is_ok());
        let err = check_status(Operation::MoveAbsolute, -7).unwrap_err();
        assert_eq!(err.status_code(), Some(-7));
        assert_eq!(err.operation(), Some(Operation::MoveAbsolute));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::MoveAbsolute.to_string(), "move-absolute-single-axis");
        assert_eq!(Operation::MoveRelative.native_name(), "LSX_MoveRelSingleAxis");
        assert_eq!(Operation::CreateSession.native_name(), "LSX_CreateLSID");
    }

    #[test]
    fn test_encode_port() {
        assert_eq!(encode_port("COM1").unwrap().as_bytes(), b"COM1");
        assert!(encode_port("COM\01").unwrap_err().is_validation());
        assert!(encode_port("CÖM1").unwrap_err().is_validation());
    }

    #[test]
    fn test_load_missing_library() {
        let err = NativeBinding::load("/nonexistent/64/Tango_DLL.dll").unwrap_err();
        assert!(matches!(err, TangoError::LibraryLoad { .. }));
        assert!(err.is_binding_failure());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_entry_point_is_binding_call() {
        // loads fine, but exports none of the LSX_* symbols
        let binding = NativeBinding::load("libc.so.6").unwrap();
        let err = binding.create_session().unwrap_err();

        assert!(matches!(
            err,
            TangoError::BindingCall {
                operation: Operation::CreateSession,
                ..
            }
        ));
        assert!(err.is_binding_failure());
        assert_eq!(err.status_code(), None);
        assert!(err.to_string().contains("LSX_CreateLSID"));
    }
}
