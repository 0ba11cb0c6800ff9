/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy shared by every component. Variants map 1:1 onto the
/// error classes components are required to surface rather than mask.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("convergence failure after {iterations} iterations, error bound {error_bound_ms} ms")]
    ConvergenceFailure { iterations: u32, error_bound_ms: f64 },

    #[error("state machine violation: {0}")]
    StateMachineViolation(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn dependency_unavailable(msg: impl Into<String>) -> Self {
        CoreError::DependencyUnavailable(msg.into())
    }

    pub fn state_violation(msg: impl Into<String>) -> Self {
        CoreError::StateMachineViolation(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        CoreError::Fatal(msg.into())
    }

    /// `true` for conditions a caller may retry without changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::DependencyUnavailable(_) | CoreError::DeadlineExceeded(_))
    }
}
