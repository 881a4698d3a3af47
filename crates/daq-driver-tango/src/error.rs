//! Error types for Tango stage operations.
//!
//! The variants follow the failure taxonomy of the driver:
//!
//! - **Binding invocation failures** ([`TangoError::LibraryLoad`],
//!   [`TangoError::BindingCall`]): the native call could not be made at all.
//! - **Native status failures** ([`TangoError::Status`]): the call ran but
//!   returned a non-zero status code.
//! - **Validation failures** ([`TangoError::UnknownAxis`],
//!   [`TangoError::UnknownUnit`], [`TangoError::InvalidArgument`]): rejected
//!   before any native call.
//! - **Lifecycle failures** ([`TangoError::Lifecycle`]): the session is not in
//!   a state that accepts the operation.
//!
//! [`TangoError::Close`] keeps the disconnect and free failures of a session
//! close side by side.

use std::path::PathBuf;

use thiserror::Error;

use crate::binding::Operation;
use crate::session::SessionState;

/// Result type alias for Tango operations.
pub type Result<T> = std::result::Result<T, TangoError>;

/// Errors that can occur when working with a Tango controller.
#[derive(Error, Debug)]
pub enum TangoError {
    /// The vendor library could not be loaded.
    #[error("Failed to load Tango library '{}': {message}", .path.display())]
    LibraryLoad { path: PathBuf, message: String },

    /// The foreign call could not be invoked (missing symbol, unloaded library).
    #[error("Binding call {operation} failed: {message}")]
    BindingCall { operation: Operation, message: String },

    /// The native call returned a non-success status code.
    #[error("Tango {operation} returned status {code}")]
    Status { operation: Operation, code: i32 },

    /// Axis name outside {x, y, z, a}.
    #[error("Unknown axis '{name}': must be one of x, y, z, a")]
    UnknownAxis { name: String },

    /// Unit name outside the controller's dimension table.
    #[error(
        "Unknown unit '{name}': must be one of microsteps, um, mm, degree, revolutions, cm, m, inch, mil"
    )]
    UnknownUnit { name: String },

    /// Argument that cannot be passed to the native call.
    #[error("Invalid argument for {operation}: {message}")]
    InvalidArgument { operation: Operation, message: String },

    /// Operation attempted in the wrong session state.
    #[error("Cannot {operation} while session is {state}")]
    Lifecycle {
        operation: &'static str,
        state: SessionState,
    },

    /// Closing the session failed in one or both steps.
    #[error("{}", describe_close(.disconnect.as_deref(), .free.as_deref()))]
    Close {
        disconnect: Option<Box<TangoError>>,
        free: Option<Box<TangoError>>,
    },
}

fn describe_close(disconnect: Option<&TangoError>, free: Option<&TangoError>) -> String {
    match (disconnect, free) {
        (Some(d), Some(f)) => format!("Failed to close session: disconnect: {d}; free: {f}"),
        (Some(d), None) => format!("Failed to close session: disconnect: {d}"),
        (None, Some(f)) => format!("Failed to close session: free: {f}"),
        (None, None) => "Failed to close session".to_string(),
    }
}

impl TangoError {
    /// Raw status code, if this is a native status failure.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Operation that produced this error, for binding and status failures.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::BindingCall { operation, .. }
            | Self::Status { operation, .. }
            | Self::InvalidArgument { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// Check if the caller's input was rejected before reaching the hardware.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownAxis { .. } | Self::UnknownUnit { .. } | Self::InvalidArgument { .. }
        )
    }

    /// Check if the native library could not be called.
    pub fn is_binding_failure(&self) -> bool {
        matches!(self, Self::LibraryLoad { .. } | Self::BindingCall { .. })
    }

    /// Check if this is a wrong-state error.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = TangoError::Status {
            operation: Operation::MoveAbsolute,
            code: -7,
        };
        let msg = err.to_string();
        assert!(msg.contains("move-absolute-single-axis"));
        assert!(msg.contains("-7"));
        assert_eq!(err.status_code(), Some(-7));
        assert_eq!(err.operation(), Some(Operation::MoveAbsolute));
    }

    #[test]
    fn test_close_display_keeps_both_errors() {
        let err = TangoError::Close {
            disconnect: Some(Box::new(TangoError::Status {
                operation: Operation::Disconnect,
                code: 4001,
            })),
            free: Some(Box::new(TangoError::Status {
                operation: Operation::FreeSession,
                code: 4002,
            })),
        };
        let msg = err.to_string();
        assert!(msg.contains("4001"));
        assert!(msg.contains("4002"));
    }

    #[test]
    fn test_classification() {
        assert!(TangoError::UnknownAxis { name: "w".into() }.is_validation());
        assert!(TangoError::UnknownUnit { name: "ft".into() }.is_validation());
        assert!(!TangoError::UnknownAxis { name: "w".into() }.is_binding_failure());
        assert!(TangoError::BindingCall {
            operation: Operation::GetPosition,
            message: "symbol not found".into(),
        }
        .is_binding_failure());
        assert!(TangoError::Lifecycle {
            operation: "move",
            state: SessionState::Closed,
        }
        .is_lifecycle());
    }
}
