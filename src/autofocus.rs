//! Coarse-to-fine autofocus over one stage axis.
//!
//! The controller only needs two capabilities: something that can move one
//! axis and report where it is ([`FocusDrive`]), and something that scores
//! the image at the current position ([`FocusMetric`]). It never sees a
//! camera or a stage type directly.
//!
//! # Algorithm
//!
//! A [`FocusPass`] samples `steps` positions spaced `step_size` apart,
//! symmetric about the position the pass starts at:
//!
//! ```text
//!   center - k*step ... center - step   center   center + step ... center + k*step
//!                                       (k = (steps - 1) / 2)
//! ```
//!
//! The center is scored first, without moving. The remaining offsets are
//! visited from lowest to highest, one blocking move and one score each. The
//! best score wins; equal scores go to the sample closest to the center, and
//! after that to the one visited first. The stage then moves to the winner,
//! which becomes the center of the next, finer pass.
//!
//! Any failed move or score aborts the run. There is no fallback to the best
//! position seen so far.
//!
//! # Example
//!
//! ```no_run
//! use biofum::autofocus::{focus_stage, AutofocusPlan};
//! use daq_driver_tango::{Axis, NativeBinding, StageSession, StageSettings};
//!
//! # fn sharpness() -> anyhow::Result<f64> { Ok(0.0) }
//! # fn main() -> anyhow::Result<()> {
//! let binding = NativeBinding::load("C:/Tango/64/Tango_DLL.dll")?;
//! let mut stage = StageSession::open(binding, StageSettings::default())?;
//!
//! let result = focus_stage(&mut stage, Axis::Z, sharpness, &AutofocusPlan::default())?;
//! println!("focused at z = {:.1}", result.position);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use daq_driver_tango::{Axis, MotionBinding, StageSession};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// Capabilities
// =============================================================================

/// One axis that can be positioned absolutely.
pub trait FocusDrive {
    /// Current position of the axis.
    fn position(&mut self) -> Result<f64>;

    /// Move to `position` and return once motion has stopped.
    fn move_to(&mut self, position: f64) -> Result<()>;
}

/// Focus score at the current position. Higher is sharper.
pub trait FocusMetric {
    fn score(&mut self) -> Result<f64>;
}

impl<F> FocusMetric for F
where
    F: FnMut() -> Result<f64>,
{
    fn score(&mut self) -> Result<f64> {
        self()
    }
}

/// [`FocusDrive`] over one axis of a [`StageSession`].
pub struct StageAxis<'a, B: MotionBinding> {
    session: &'a mut StageSession<B>,
    axis: Axis,
}

impl<'a, B: MotionBinding> StageAxis<'a, B> {
    pub fn new(session: &'a mut StageSession<B>, axis: Axis) -> Self {
        Self { session, axis }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }
}

impl<B: MotionBinding> FocusDrive for StageAxis<'_, B> {
    fn position(&mut self) -> Result<f64> {
        Ok(self.session.axis_position(self.axis)?)
    }

    fn move_to(&mut self, position: f64) -> Result<()> {
        Ok(self.session.move_to(self.axis, position, false)?)
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Reasons a plan or a sample is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutofocusError {
    #[error("Autofocus plan has no passes")]
    EmptyPlan,

    #[error("Pass {index}: steps must be odd and at least 1, got {steps}")]
    InvalidSteps { index: usize, steps: u32 },

    #[error("Pass {index}: step size must be finite and positive, got {step_size}")]
    InvalidStepSize { index: usize, step_size: f64 },

    #[error("Focus velocity must be finite and positive, got {velocity}")]
    InvalidVelocity { velocity: f64 },

    #[error("Focus metric returned NaN at position {position}")]
    InvalidScore { position: f64 },
}

/// One sweep at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPass {
    /// Distance between neighbouring samples, in the stage's unit.
    pub step_size: f64,
    /// Total samples including the center. Odd.
    pub steps: u32,
}

impl FocusPass {
    pub fn new(step_size: f64, steps: u32) -> Self {
        Self { step_size, steps }
    }

    /// Samples on each side of the center.
    pub fn half_width(&self) -> u32 {
        self.steps / 2
    }

    fn validate(&self, index: usize) -> std::result::Result<(), AutofocusError> {
        if self.steps == 0 || self.steps % 2 == 0 {
            return Err(AutofocusError::InvalidSteps {
                index,
                steps: self.steps,
            });
        }
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(AutofocusError::InvalidStepSize {
                index,
                step_size: self.step_size,
            });
        }
        Ok(())
    }
}

/// Passes to run, coarse to fine, plus the axis velocity to use while
/// focusing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofocusPlan {
    pub passes: Vec<FocusPass>,
    /// Velocity for the focus axis during the run. `None` leaves it alone.
    #[serde(default)]
    pub velocity: Option<f64>,
}

impl Default for AutofocusPlan {
    /// Rough focus to within 1000 units, then 200, 40, and 8.
    fn default() -> Self {
        Self {
            passes: vec![
                FocusPass::new(500.0, 7),
                FocusPass::new(100.0, 9),
                FocusPass::new(20.0, 9),
                FocusPass::new(4.0, 9),
            ],
            velocity: Some(15.0),
        }
    }
}

impl AutofocusPlan {
    pub fn new(passes: Vec<FocusPass>) -> Self {
        Self {
            passes,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), AutofocusError> {
        validate_passes(&self.passes)?;
        if let Some(velocity) = self.velocity {
            if !velocity.is_finite() || velocity <= 0.0 {
                return Err(AutofocusError::InvalidVelocity { velocity });
            }
        }
        Ok(())
    }
}

fn validate_passes(passes: &[FocusPass]) -> std::result::Result<(), AutofocusError> {
    if passes.is_empty() {
        return Err(AutofocusError::EmptyPlan);
    }
    passes
        .iter()
        .enumerate()
        .try_for_each(|(index, pass)| pass.validate(index))
}

// =============================================================================
// Results
// =============================================================================

/// One scored position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FocusSample {
    pub position: f64,
    pub score: f64,
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub pass: FocusPass,
    /// Position the pass started from.
    pub center: f64,
    /// Winning sample; the stage was left here.
    pub best: FocusSample,
    /// Samples in the order they were taken, center first.
    pub samples: Vec<FocusSample>,
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutofocusResult {
    /// Final focus position after the finest pass.
    pub position: f64,
    /// Score measured at `position`.
    pub score: f64,
    pub passes: Vec<PassReport>,
}

// =============================================================================
// Controller
// =============================================================================

/// Hill search over a [`FocusDrive`] scored by a [`FocusMetric`].
pub struct Autofocus<D, M> {
    drive: D,
    metric: M,
}

impl<D: FocusDrive, M: FocusMetric> Autofocus<D, M> {
    pub fn new(drive: D, metric: M) -> Self {
        Self { drive, metric }
    }

    /// Run every pass in order, each starting where the previous one ended.
    ///
    /// The passes are validated before the stage is touched.
    pub fn run(&mut self, passes: &[FocusPass]) -> Result<AutofocusResult> {
        validate_passes(passes)?;

        let mut reports = Vec::with_capacity(passes.len());
        for (index, pass) in passes.iter().enumerate() {
            let report = self
                .sweep(*pass)
                .with_context(|| format!("autofocus pass {} (step {})", index + 1, pass.step_size))?;
            info!(
                pass = index + 1,
                step_size = pass.step_size,
                steps = pass.steps,
                center = report.center,
                best = report.best.position,
                score = report.best.score,
                "Autofocus pass complete"
            );
            reports.push(report);
        }

        // validate_passes guarantees at least one report
        let best = reports
            .last()
            .map(|report| report.best)
            .ok_or(AutofocusError::EmptyPlan)?;

        Ok(AutofocusResult {
            position: best.position,
            score: best.score,
            passes: reports,
        })
    }

    /// One pass around the current position. Leaves the drive at the best
    /// sample.
    pub fn sweep(&mut self, pass: FocusPass) -> Result<PassReport> {
        pass.validate(0)?;

        let center = self.drive.position()?;
        let half = i64::from(pass.half_width());

        let mut samples = Vec::with_capacity(pass.steps as usize);
        let first = self.measure(center)?;
        samples.push(first);

        let mut best = first;
        let mut best_offset = 0_i64;
        let mut current = center;

        for offset in (-half..=half).filter(|offset| *offset != 0) {
            let position = center + offset as f64 * pass.step_size;
            self.drive.move_to(position)?;
            current = position;

            let sample = self.measure(position)?;
            samples.push(sample);

            let closer = offset.abs() < best_offset.abs();
            if sample.score > best.score || (sample.score == best.score && closer) {
                best = sample;
                best_offset = offset;
            }
        }

        if current != best.position {
            self.drive.move_to(best.position)?;
        }

        Ok(PassReport {
            pass,
            center,
            best,
            samples,
        })
    }

    fn measure(&mut self, position: f64) -> Result<FocusSample> {
        let score = self.metric.score()?;
        if score.is_nan() {
            return Err(AutofocusError::InvalidScore { position }.into());
        }
        debug!(position, score, "Focus sample");
        Ok(FocusSample { position, score })
    }

    pub fn into_parts(self) -> (D, M) {
        (self.drive, self.metric)
    }
}

/// Focus `axis` of an open stage session with `plan`.
///
/// When the plan carries a velocity, the axis runs at that velocity for the
/// duration and is put back to its previous velocity afterwards, whether or
/// not the run succeeded. A failed run reports its own error; a failed
/// restore is then only logged.
pub fn focus_stage<B, M>(
    session: &mut StageSession<B>,
    axis: Axis,
    metric: M,
    plan: &AutofocusPlan,
) -> Result<AutofocusResult>
where
    B: MotionBinding,
    M: FocusMetric,
{
    plan.validate()?;

    let previous = match plan.velocity {
        Some(velocity) => {
            let previous = session
                .get_velocity()
                .context("reading velocity before autofocus")?
                .get(axis);
            session
                .set_axis_velocity(axis, velocity)
                .context("setting focus velocity")?;
            Some(previous)
        }
        None => None,
    };

    info!(%axis, passes = plan.passes.len(), "Starting autofocus");
    let outcome = Autofocus::new(StageAxis::new(session, axis), metric).run(&plan.passes);

    if let Some(previous) = previous {
        if let Err(err) = session.set_axis_velocity(axis, previous) {
            if outcome.is_ok() {
                return Err(err).context("restoring velocity after autofocus");
            }
            warn!(%axis, error = %err, "Failed to restore velocity after autofocus");
        }
    }

    outcome
}
