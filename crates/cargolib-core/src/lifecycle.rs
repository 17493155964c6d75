use crate::FacadeError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    Uninitialized,
    Constructed,
    Ready,
}

impl fmt::Display for FacadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Constructed => "constructed",
            Self::Ready => "ready",
        })
    }
}

pub fn validate_transition(from: FacadeState, to: FacadeState) -> Result<(), FacadeError> {
    let valid = matches!(
        (from, to),
        (FacadeState::Uninitialized, FacadeState::Constructed)
            | (FacadeState::Constructed, FacadeState::Ready)
    );

    if valid {
        Ok(())
    } else {
        Err(FacadeError::InvalidTransition { from, to })
    }
}
