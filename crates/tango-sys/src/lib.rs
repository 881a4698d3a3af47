//! Low-level FFI surface for the Marzhauser Tango motion-controller library.
//!
//! This crate describes the vendor `Tango_DLL` entry points exactly as the
//! vendor documentation declares them: C calling convention, `int` status
//! return, results written through caller-supplied pointers. The library is
//! loaded at runtime from an explicit path.
//!
//! # Tango Overview
//!
//! The Tango DLL can drive up to eight controllers at once. Each controller
//! connection is addressed by an "LSID" (an `int` handed out by
//! `LSX_CreateLSID`) which must be passed to every subsequent call and
//! released with `LSX_FreeLSID`.
//!
//! # Safety
//!
//! Every function pointer type in this crate is `unsafe` to call: the caller
//! must pass a live LSID and valid, writable out-pointers. For a safe wrapper,
//! use the `daq-driver-tango` crate instead.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use std::os::raw::c_int;
//! use tango_sys::*;
//!
//! unsafe {
//!     let lib = TangoLibrary::load("C:/Tango/64/Tango_DLL.dll").unwrap();
//!     let create = lib.get::<LSX_CreateLSID>(SYM_CREATE_LSID).unwrap();
//!     let mut lsid: c_int = 0;
//!     if create(&mut lsid) == LSX_SUCCESS {
//!         println!("Got LSID {}", lsid);
//!     }
//! }
//! ```

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::os::raw::{c_char, c_double, c_int};
use std::path::{Path, PathBuf};

pub use libloading::Symbol;

// =============================================================================
// Entry point signatures
// =============================================================================

/// Win32 `BOOL`: a 4-byte `int`, zero for false.
pub type BOOL = c_int;

/// Win32 `TRUE`.
pub const TRUE: BOOL = 1;

/// Win32 `FALSE`.
pub const FALSE: BOOL = 0;

/// `int LSX_CreateLSID(int *plID)`
pub type LSX_CreateLSID = unsafe extern "C" fn(lsid: *mut c_int) -> c_int;

/// `int LSX_ConnectSimple(int lID, int lAnInterfaceType, char *pcAComName, int lABR, BOOL bAShowProt)`
pub type LSX_ConnectSimple = unsafe extern "C" fn(
    lsid: c_int,
    interface_type: c_int,
    com_name: *const c_char,
    baud_rate: c_int,
    show_protocol: BOOL,
) -> c_int;

/// `int LSX_Disconnect(int lID)`
pub type LSX_Disconnect = unsafe extern "C" fn(lsid: c_int) -> c_int;

/// `int LSX_FreeLSID(int lID)`
pub type LSX_FreeLSID = unsafe extern "C" fn(lsid: c_int) -> c_int;

/// `int LSX_SetDimensions(int lID, int lXD, int lYD, int lZD, int lAD)`
pub type LSX_SetDimensions =
    unsafe extern "C" fn(lsid: c_int, x: c_int, y: c_int, z: c_int, a: c_int) -> c_int;

/// `int LSX_MoveAbsSingleAxis(int lID, int lAxis, double dValue, BOOL bWait)`
pub type LSX_MoveAbsSingleAxis =
    unsafe extern "C" fn(lsid: c_int, axis: c_int, value: c_double, wait: BOOL) -> c_int;

/// `int LSX_MoveRelSingleAxis(int lID, int lAxis, double dValue, BOOL bWait)`
pub type LSX_MoveRelSingleAxis =
    unsafe extern "C" fn(lsid: c_int, axis: c_int, value: c_double, wait: BOOL) -> c_int;

/// `int LSX_GetPos(int lID, double *pdX, double *pdY, double *pdZ, double *pdA)`
pub type LSX_GetPos = unsafe extern "C" fn(
    lsid: c_int,
    x: *mut c_double,
    y: *mut c_double,
    z: *mut c_double,
    a: *mut c_double,
) -> c_int;

/// `int LSX_GetPosSingleAxis(int lID, int lAxis, double *pdPos)`
pub type LSX_GetPosSingleAxis =
    unsafe extern "C" fn(lsid: c_int, axis: c_int, position: *mut c_double) -> c_int;

/// `int LSX_GetVel(int lID, double *pdX, double *pdY, double *pdZ, double *pdA)`
pub type LSX_GetVel = unsafe extern "C" fn(
    lsid: c_int,
    x: *mut c_double,
    y: *mut c_double,
    z: *mut c_double,
    a: *mut c_double,
) -> c_int;

/// `int LSX_SetVelSingleAxis(int lID, int lAxis, double dVel)`
pub type LSX_SetVelSingleAxis =
    unsafe extern "C" fn(lsid: c_int, axis: c_int, velocity: c_double) -> c_int;

// =============================================================================
// Symbol names (NUL-terminated for libloading)
// =============================================================================

pub const SYM_CREATE_LSID: &[u8] = b"LSX_CreateLSID\0";
pub const SYM_CONNECT_SIMPLE: &[u8] = b"LSX_ConnectSimple\0";
pub const SYM_DISCONNECT: &[u8] = b"LSX_Disconnect\0";
pub const SYM_FREE_LSID: &[u8] = b"LSX_FreeLSID\0";
pub const SYM_SET_DIMENSIONS: &[u8] = b"LSX_SetDimensions\0";
pub const SYM_MOVE_ABS_SINGLE_AXIS: &[u8] = b"LSX_MoveAbsSingleAxis\0";
pub const SYM_MOVE_REL_SINGLE_AXIS: &[u8] = b"LSX_MoveRelSingleAxis\0";
pub const SYM_GET_POS: &[u8] = b"LSX_GetPos\0";
pub const SYM_GET_POS_SINGLE_AXIS: &[u8] = b"LSX_GetPosSingleAxis\0";
pub const SYM_GET_VEL: &[u8] = b"LSX_GetVel\0";
pub const SYM_SET_VEL_SINGLE_AXIS: &[u8] = b"LSX_SetVelSingleAxis\0";

// =============================================================================
// Protocol constants
// =============================================================================

/// Status code returned by every entry point on success.
pub const LSX_SUCCESS: c_int = 0;

/// Interface type for a serial (RS-232 / virtual COM) connection.
pub const INTERFACE_RS232: c_int = 1;

/// Baud rate the controller ships configured for.
pub const DEFAULT_BAUD_RATE: c_int = 57600;

/// File name of the vendor library inside its architecture directory.
pub const LIBRARY_FILE_NAME: &str = "Tango_DLL.dll";

// Axis numbers
pub const AXIS_X: c_int = 1;
pub const AXIS_Y: c_int = 2;
pub const AXIS_Z: c_int = 3;
pub const AXIS_A: c_int = 4;

// Dimension (unit) codes for LSX_SetDimensions
pub const DIM_MICROSTEPS: c_int = 0;
pub const DIM_MICROMETER: c_int = 1;
pub const DIM_MILLIMETER: c_int = 2;
pub const DIM_DEGREE: c_int = 3;
pub const DIM_REVOLUTIONS: c_int = 4;
pub const DIM_CENTIMETER: c_int = 5;
pub const DIM_METER: c_int = 6;
pub const DIM_INCH: c_int = 7;
pub const DIM_MIL: c_int = 8;

// =============================================================================
// Runtime loader
// =============================================================================

/// A loaded copy of the Tango shared library.
///
/// The library stays mapped for as long as this value lives; symbols borrowed
/// from it cannot outlive it.
pub struct TangoLibrary {
    lib: libloading::Library,
    path: PathBuf,
}

impl TangoLibrary {
    /// Load the library from `path`.
    ///
    /// # Safety
    ///
    /// Loading a shared library runs its initialisation routines. The caller
    /// must make sure `path` points at a genuine Tango DLL.
    pub unsafe fn load(path: impl AsRef<Path>) -> Result<Self, libloading::Error> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: upheld by the caller.
        let lib = unsafe { libloading::Library::new(&path)? };
        Ok(Self { lib, path })
    }

    /// Resolve an entry point by its NUL-terminated symbol name.
    ///
    /// # Safety
    ///
    /// `T` must be the exact function pointer type the symbol was exported
    /// with (one of the `LSX_*` aliases in this crate).
    pub unsafe fn get<T>(&self, symbol: &[u8]) -> Result<Symbol<'_, T>, libloading::Error> {
        // SAFETY: upheld by the caller.
        unsafe { self.lib.get(symbol) }
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for TangoLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TangoLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
