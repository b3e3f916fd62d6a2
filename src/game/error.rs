use crate::game::state::Identity;

/// Errors that abort a world action.
///
/// Any of these leaves the store exactly as it was before the action started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("World has not been initialized")]
    NotInitialized,
    #[error("World is already initialized")]
    AlreadyInitialized,
    #[error("No player record for identity {0}")]
    PlayerNotFound(Identity),
    #[error("Player {0} still owns circles")]
    AlreadyAlive(Identity),
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),
    #[error("World actor has stopped")]
    WorldStopped,
}

impl WorldError {
    /// Broken-invariant errors, as opposed to requests that are merely refused
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            WorldError::NotInitialized
                | WorldError::PlayerNotFound(_)
                | WorldError::ConsistencyViolation(_)
        )
    }
}
