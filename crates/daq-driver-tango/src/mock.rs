//! In-memory stand-in for the Tango library.
//!
//! [`MockBinding`] keeps a simulated controller (position, velocity, unit
//! codes, live session ids) behind a mutex, records every call it receives,
//! and can be told to fail a given operation with a chosen status code.
//! Moves complete instantly.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::binding::{check_status, MotionBinding, Operation};
use crate::error::{Result, TangoError};
use crate::types::{Axis, AxisValues};

/// Status code the mock returns for a call on an unknown or freed session id.
pub const INVALID_SESSION_CODE: i32 = 4005;

/// Status code the mock returns for an axis number outside 1..=4.
pub const INVALID_AXIS_CODE: i32 = 4010;

/// Record of one `connect` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectCall {
    pub lsid: i32,
    pub interface_type: i32,
    pub port: String,
    pub baud_rate: i32,
    pub show_protocol: bool,
}

/// Record of one move call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCall {
    pub axis: i32,
    pub value: f64,
    pub relative: bool,
    pub wait: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_lsid: i32,
    live: HashSet<i32>,
    connected: HashSet<i32>,
    dimensions: Option<[i32; 4]>,
    position: AxisValues,
    velocity: AxisValues,
    calls: Vec<Operation>,
    connects: Vec<ConnectCall>,
    moves: Vec<MoveCall>,
    failures: HashMap<Operation, i32>,
}

/// Simulated Tango controller.
#[derive(Debug)]
pub struct MockBinding {
    state: Mutex<MockState>,
}

impl Default for MockBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBinding {
    /// A controller at the origin with all velocities zero.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_lsid: 1,
                ..Default::default()
            }),
        }
    }

    /// Make every subsequent call of `operation` return `code`.
    pub fn fail_with(&self, operation: Operation, code: i32) {
        self.state.lock().failures.insert(operation, code);
    }

    /// Stop failing `operation`.
    pub fn clear_failure(&self, operation: Operation) {
        self.state.lock().failures.remove(&operation);
    }

    pub fn set_position(&self, position: AxisValues) {
        self.state.lock().position = position;
    }

    pub fn set_velocity(&self, velocity: AxisValues) {
        self.state.lock().velocity = velocity;
    }

    /// Simulated position, read without going through the binding.
    pub fn position(&self) -> AxisValues {
        self.state.lock().position
    }

    /// Simulated velocity, read without going through the binding.
    pub fn velocity(&self) -> AxisValues {
        self.state.lock().velocity
    }

    /// Unit codes from the last successful `set_dimensions`.
    pub fn dimensions(&self) -> Option<[i32; 4]> {
        self.state.lock().dimensions
    }

    /// Every call received, in order, including failed ones.
    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state.lock().calls.iter().filter(|op| **op == operation).count()
    }

    pub fn connects(&self) -> Vec<ConnectCall> {
        self.state.lock().connects.clone()
    }

    pub fn moves(&self) -> Vec<MoveCall> {
        self.state.lock().moves.clone()
    }

    /// Session ids handed out and not yet freed.
    pub fn live_sessions(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_connected(&self, lsid: i32) -> bool {
        self.state.lock().connected.contains(&lsid)
    }
}

impl MockState {
    /// Record the call and apply any injected failure.
    fn enter(&mut self, operation: Operation) -> Result<()> {
        self.calls.push(operation);
        match self.failures.get(&operation) {
            Some(code) => check_status(operation, *code),
            None => Ok(()),
        }
    }

    fn require_live(&self, operation: Operation, lsid: i32) -> Result<()> {
        if self.live.contains(&lsid) {
            Ok(())
        } else {
            check_status(operation, INVALID_SESSION_CODE)
        }
    }

    fn axis(operation: Operation, code: i32) -> Result<Axis> {
        Axis::ALL
            .into_iter()
            .find(|axis| axis.code() == code)
            .ok_or(TangoError::Status {
                operation,
                code: INVALID_AXIS_CODE,
            })
    }
}

impl MotionBinding for MockBinding {
    fn create_session(&self) -> Result<i32> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateSession)?;
        let lsid = state.next_lsid;
        state.next_lsid += 1;
        state.live.insert(lsid);
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
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        state.connects.push(ConnectCall {
            lsid,
            interface_type,
            port: port.to_string(),
            baud_rate,
            show_protocol,
        });
        state.connected.insert(lsid);
        Ok(())
    }

    fn disconnect(&self, lsid: i32) -> Result<()> {
        let op = Operation::Disconnect;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        state.connected.remove(&lsid);
        Ok(())
    }

    fn free_session(&self, lsid: i32) -> Result<()> {
        let op = Operation::FreeSession;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        state.live.remove(&lsid);
        state.connected.remove(&lsid);
        Ok(())
    }

    fn set_dimensions(&self, lsid: i32, x: i32, y: i32, z: i32, a: i32) -> Result<()> {
        let op = Operation::SetDimensions;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        state.dimensions = Some([x, y, z, a]);
        Ok(())
    }

    fn move_absolute(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
        let op = Operation::MoveAbsolute;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        let target = MockState::axis(op, axis)?;
        state.moves.push(MoveCall {
            axis,
            value,
            relative: false,
            wait,
        });
        state.position.set(target, value);
        Ok(())
    }

    fn move_relative(&self, lsid: i32, axis: i32, value: f64, wait: bool) -> Result<()> {
        let op = Operation::MoveRelative;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        let target = MockState::axis(op, axis)?;
        state.moves.push(MoveCall {
            axis,
            value,
            relative: true,
            wait,
        });
        let current = state.position.get(target);
        state.position.set(target, current + value);
        Ok(())
    }

    fn get_position(&self, lsid: i32) -> Result<AxisValues> {
        let op = Operation::GetPosition;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        Ok(state.position)
    }

    fn get_position_single_axis(&self, lsid: i32, axis: i32) -> Result<f64> {
        let op = Operation::GetPositionSingleAxis;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        let target = MockState::axis(op, axis)?;
        Ok(state.position.get(target))
    }

    fn get_velocity(&self, lsid: i32) -> Result<AxisValues> {
        let op = Operation::GetVelocity;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        Ok(state.velocity)
    }

    fn set_velocity_single_axis(&self, lsid: i32, axis: i32, velocity: f64) -> Result<()> {
        let op = Operation::SetVelocitySingleAxis;
        let mut state = self.state.lock();
        state.enter(op)?;
        state.require_live(op, lsid)?;
        let target = MockState::axis(op, axis)?;
        state.velocity.set(target, velocity);
        Ok(())
    }
}
