//! Stage commands for the `biofum` binary.
//!
//! Parsing lives here rather than in `main.rs` so the commands can be run
//! against any [`MotionBinding`], including the in-memory one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_driver_tango::{Axis, MotionBinding, NativeBinding, PositionReading, StageSession};
use tracing::info;

use crate::config::{StageConfig, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "biofum")]
#[command(about = "Manual control of the Tango XYZ stage", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: StageCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StageCommand {
    /// Print the position of one axis, or of all four
    Position {
        /// x, y, z, or a
        #[arg(long)]
        axis: Option<String>,
    },

    /// Move one axis and wait for it to stop
    Move {
        /// Target (or distance with --relative) in the configured unit
        #[arg(allow_hyphen_values = true)]
        value: f64,

        #[arg(long)]
        axis: String,

        /// Move by `value` instead of to `value`
        #[arg(long)]
        relative: bool,
    },

    /// Print the velocity of every axis
    Velocity,

    /// Set the velocity of one axis
    SetVelocity {
        axis: String,
        value: f64,
    },

    /// Switch all axes to a unit (microsteps, um, mm, degree, revolutions, cm, m, inch, mil)
    Units { unit: String },

    /// Report whether any axis is moving
    Moving,
}

/// Run one command on an open session and return what to print.
pub fn execute<B: MotionBinding>(
    session: &mut StageSession<B>,
    command: &StageCommand,
) -> Result<String> {
    match command {
        StageCommand::Position { axis } => {
            let reading = session.get_position(axis.as_deref())?;
            Ok(match reading {
                PositionReading::All(position) => position.to_string(),
                PositionReading::Single(value) => format!("{:.4} {}", value, session.unit()),
            })
        }
        StageCommand::Move {
            value,
            axis,
            relative,
        } => {
            session.move_axis(*value, axis, *relative)?;
            let axis: Axis = axis.parse()?;
            let position = session.axis_position(axis)?;
            info!(%axis, position, "Move complete");
            Ok(format!("{} = {:.4} {}", axis, position, session.unit()))
        }
        StageCommand::Velocity => Ok(session.get_velocity()?.to_string()),
        StageCommand::SetVelocity { axis, value } => {
            session.set_velocity(axis, *value)?;
            Ok(format!("{} velocity set to {}", axis, value))
        }
        StageCommand::Units { unit } => {
            session.set_units(unit)?;
            Ok(format!("units set to {}", session.unit()))
        }
        StageCommand::Moving => {
            let moving = session.is_moving(None)?;
            Ok(if moving { "moving" } else { "idle" }.to_string())
        }
    }
}

/// Load the configured Tango library and open a session on it.
pub fn open_stage(config: &StageConfig) -> Result<StageSession<NativeBinding>> {
    let path = config.library_path()?;
    let binding = NativeBinding::load(&path)
        .with_context(|| format!("loading Tango library from {}", path.display()))?;
    let session = StageSession::open(binding, config.settings()?)
        .with_context(|| format!("opening stage on {}", config.port))?;
    Ok(session)
}
