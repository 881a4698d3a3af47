//! Autofocus driving a stage session over the in-memory controller.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_focus_default_plan_lands_on_peak` | Default plan converges on the sharpness peak |
//! | `test_focus_from_configuration` | Configured axis and passes drive the run |
//! | `test_focus_aborts_on_stage_failure` | Stage status errors abort the run |
//! | `test_velocity_is_set_during_run_and_restored` | Focus velocity applies during the run and is restored |
//! | `test_velocity_is_restored_after_failed_run` | Velocity is restored when the metric fails |
//! | `test_velocity_left_alone_without_plan_velocity` | No velocity calls without a plan velocity |
//! | `test_invalid_plan_never_touches_the_stage` | Rejected plans never touch the stage |

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use biofum::{focus_stage, AutofocusError, AutofocusPlan, BiofumConfig, FocusPass};
use daq_driver_tango::{
    Axis, AxisValues, MockBinding, Operation, StageSession, StageSettings, TangoError,
};
use tracing_test::traced_test;

fn open_stage() -> (Arc<MockBinding>, StageSession<Arc<MockBinding>>) {
    let mock = Arc::new(MockBinding::new());
    let session = StageSession::open(mock.clone(), StageSettings::default()).unwrap();
    (mock, session)
}

/// Sharpness peaked at `peak` along z, read straight from the simulated stage.
fn sharpness(mock: &Arc<MockBinding>, peak: f64) -> impl FnMut() -> Result<f64> {
    let mock = mock.clone();
    move || {
        let z = mock.position().z;
        Ok(1.0 / (1.0 + (z - peak).abs()))
    }
}

// =============================================================================
// Full runs
// =============================================================================

#[test]
#[traced_test]
fn test_focus_default_plan_lands_on_peak() {
    let (mock, mut session) = open_stage();
    mock.set_position(AxisValues::new(10.0, 20.0, 300.0, 0.0));

    let result = focus_stage(
        &mut session,
        Axis::Z,
        sharpness(&mock, 1042.0),
        &AutofocusPlan::default(),
    )
    .unwrap();

    assert!((result.position - 1042.0).abs() <= 4.0);
    assert_eq!(mock.position().z, result.position);
    // other axes untouched
    assert_eq!(mock.position().x, 10.0);
    assert_eq!(mock.position().y, 20.0);

    assert_eq!(result.passes.len(), 4);
    assert_eq!(result.passes[0].samples.len(), 7);
    assert_eq!(result.passes[0].center, 300.0);
    assert!(mock.moves().iter().all(|m| m.axis == Axis::Z.code() && !m.relative && m.wait));

    assert!(logs_contain("Autofocus pass complete"));
}

#[test]
fn test_focus_from_configuration() {
    let (mock, mut session) = open_stage();
    let mut config = BiofumConfig::default();
    config.autofocus.axis = Axis::X;
    config.autofocus.passes = vec![FocusPass::new(10.0, 5)];
    config.autofocus.velocity = None;

    let x_sharpness = {
        let mock = mock.clone();
        move || -> Result<f64> { Ok(-(mock.position().x - 20.0).abs()) }
    };
    let result = config.autofocus.focus(&mut session, x_sharpness).unwrap();

    assert_eq!(result.position, 20.0);
    assert_eq!(mock.position().x, 20.0);
    assert_eq!(mock.position().z, 0.0);
}

#[test]
fn test_focus_aborts_on_stage_failure() {
    let (mock, mut session) = open_stage();
    let metric = {
        let mock = mock.clone();
        let mut samples = 0;
        move || -> Result<f64> {
            samples += 1;
            if samples == 3 {
                mock.fail_with(Operation::MoveAbsolute, 4013);
            }
            Ok(1.0)
        }
    };

    let err = focus_stage(&mut session, Axis::Z, metric, &AutofocusPlan::default()).unwrap_err();
    let status = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<TangoError>())
        .and_then(|e| e.status_code());
    assert_eq!(status, Some(4013));
    assert_eq!(mock.moves().len(), 2);
}

// =============================================================================
// Velocity handling
// =============================================================================

#[test]
fn test_velocity_is_set_during_run_and_restored() {
    let (mock, mut session) = open_stage();
    mock.set_velocity(AxisValues::new(30.0, 30.0, 42.0, 30.0));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let metric = {
        let mock = mock.clone();
        let seen = seen.clone();
        move || -> Result<f64> {
            seen.borrow_mut().push(mock.velocity().z);
            Ok(0.0)
        }
    };

    let plan = AutofocusPlan::new(vec![FocusPass::new(10.0, 3)]).with_velocity(15.0);
    focus_stage(&mut session, Axis::Z, metric, &plan).unwrap();

    assert!(seen.borrow().iter().all(|v| *v == 15.0));
    assert_eq!(mock.velocity(), AxisValues::new(30.0, 30.0, 42.0, 30.0));
}

#[test]
fn test_velocity_is_restored_after_failed_run() {
    let (mock, mut session) = open_stage();
    mock.set_velocity(AxisValues::new(0.0, 0.0, 42.0, 0.0));

    let metric = || -> Result<f64> { anyhow::bail!("camera disconnected") };
    let err = focus_stage(&mut session, Axis::Z, metric, &AutofocusPlan::default()).unwrap_err();

    assert!(format!("{:#}", err).contains("camera disconnected"));
    assert_eq!(mock.velocity().z, 42.0);
    assert_eq!(mock.call_count(Operation::SetVelocitySingleAxis), 2);
}

#[test]
fn test_velocity_left_alone_without_plan_velocity() {
    let (mock, mut session) = open_stage();
    let plan = AutofocusPlan::new(vec![FocusPass::new(1.0, 3)]);
    focus_stage(&mut session, Axis::Z, sharpness(&mock, 0.0), &plan).unwrap();
    assert_eq!(mock.call_count(Operation::SetVelocitySingleAxis), 0);
    assert_eq!(mock.call_count(Operation::GetVelocity), 0);
}

// =============================================================================
// Plan validation
// =============================================================================

#[test]
fn test_invalid_plan_never_touches_the_stage() {
    let (mock, mut session) = open_stage();
    let calls_after_open = mock.calls().len();

    let plan = AutofocusPlan::new(vec![FocusPass::new(100.0, 9), FocusPass::new(10.0, 8)])
        .with_velocity(15.0);
    let err = focus_stage(&mut session, Axis::Z, sharpness(&mock, 0.0), &plan).unwrap_err();

    assert_eq!(
        err.downcast_ref::<AutofocusError>(),
        Some(&AutofocusError::InvalidSteps { index: 1, steps: 8 })
    );
    assert_eq!(mock.calls().len(), calls_after_open);
}
