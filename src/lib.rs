//! # biofum
//!
//! Stage control and autofocus for the bio-fuel-cell imaging rig.
//!
//! The hardware side lives in the workspace crates:
//! - `tango-sys`: raw entry points of the Marzhauser Tango library
//! - `daq-driver-tango`: the safe binding and [`StageSession`](daq_driver_tango::StageSession)
//!
//! This crate adds what sits on top of a session:
//!
//! - **`autofocus`**: coarse-to-fine hill search over one axis, scored by a
//!   caller-supplied focus metric.
//! - **`cli`**: the stage commands behind the `biofum` binary.
//! - **`config`**: Figment-based configuration (TOML file plus `BIOFUM_`
//!   environment overrides).
//! - **`logging`**: `tracing-subscriber` setup driven by the configuration.

pub mod autofocus;
pub mod cli;
pub mod config;
pub mod logging;

pub use autofocus::{
    focus_stage, Autofocus, AutofocusError, AutofocusPlan, AutofocusResult, FocusDrive,
    FocusMetric, FocusPass, FocusSample, StageAxis,
};
pub use config::{BiofumConfig, ConfigError};
