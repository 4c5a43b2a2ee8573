//! Exit codes for the CLI

use brisk_core::BriskError;
use brisk_tasks::TaskError;

/// Success
pub const SUCCESS: u8 = 0;

/// General error
pub const ERROR: u8 = 1;

/// Configuration or build declaration error
pub const CONFIG_ERROR: u8 = 2;

/// The requested task does not exist
pub const UNKNOWN_TASK: u8 = 3;

/// A task or one of its commands failed
pub const TASK_FAILED: u8 = 4;

/// Map an error to the process exit code
pub fn for_error(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<TaskError>() {
        return match e {
            TaskError::UnknownTask(_) => UNKNOWN_TASK,
            TaskError::DuplicateTask(_) => CONFIG_ERROR,
            _ => TASK_FAILED,
        };
    }
    match err.downcast_ref::<BriskError>() {
        Some(BriskError::Config(_) | BriskError::Declaration(_)) => CONFIG_ERROR,
        _ => ERROR,
    }
}
