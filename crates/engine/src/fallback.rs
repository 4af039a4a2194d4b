//! Degradation state machine for the fallback controller.
//!
//! One cell per engine instance, never a global, so concurrent engines stay
//! independently testable. Transitions are forward-only for the process
//! lifetime:
//!
//! ```text
//! Hybrid ──► DegradedDense ──► ErrorOnly
//!    └─────► DegradedSparse ─────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Which retrieval path the engine is currently allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Both legs fused. The healthy state.
    Hybrid,
    /// Hybrid failed; dense-only retrieval.
    DegradedDense,
    /// Hybrid failed; sparse-only retrieval.
    DegradedSparse,
    /// The degraded retry failed too; only error results remain.
    ErrorOnly,
}

impl EngineState {
    fn rank(self) -> u8 {
        match self {
            EngineState::Hybrid => 0,
            EngineState::DegradedDense | EngineState::DegradedSparse => 1,
            EngineState::ErrorOnly => 2,
        }
    }

    fn encode(self) -> u8 {
        match self {
            EngineState::Hybrid => 0,
            EngineState::DegradedDense => 1,
            EngineState::DegradedSparse => 2,
            EngineState::ErrorOnly => 3,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => EngineState::DegradedDense,
            2 => EngineState::DegradedSparse,
            3 => EngineState::ErrorOnly,
            _ => EngineState::Hybrid,
        }
    }

    /// Label surfaced in result metadata.
    pub fn label(self) -> &'static str {
        match self {
            EngineState::Hybrid => "hybrid",
            EngineState::DegradedDense => "dense_fallback",
            EngineState::DegradedSparse => "sparse_fallback",
            EngineState::ErrorOnly => "error_only",
        }
    }
}

/// Atomic holder enforcing forward-only transitions.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(EngineState::Hybrid.encode()))
    }

    pub(crate) fn load(&self) -> EngineState {
        EngineState::decode(self.0.load(Ordering::Acquire))
    }

    /// Moves to `target` only if it is strictly further along than the
    /// current state. Returns the state in effect afterwards.
    pub(crate) fn degrade(&self, target: EngineState) -> EngineState {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if EngineState::decode(current).rank() >= target.rank() {
                return EngineState::decode(current);
            }
            match self.0.compare_exchange(
                current,
                target.encode(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return target,
                Err(actual) => current = actual,
            }
        }
    }
}
