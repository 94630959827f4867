use thiserror::Error;

/// Errors surfaced by the fleet manager and trading instances.
#[derive(Error, Debug)]
pub enum BotError {
    /// Caller is not the instance owner or the administrator.
    #[error("unauthorized: {0}")]
    Authorization(String),

    /// Operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// Instance is unknown or cannot cover the requested amounts.
    #[error("insufficient resources: {0}")]
    Resource(String),

    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Failure at the venue or oracle boundary.
    #[error(transparent)]
    Venue(#[from] anyhow::Error),
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_errors_keep_their_source_message() {
        let err: BotError = anyhow::anyhow!("keeper offline").into();
        assert_eq!(err.to_string(), "keeper offline");
    }

    #[test]
    fn taxonomy_messages_carry_context() {
        let err = BotError::State("bot already activated".to_string());
        assert_eq!(err.to_string(), "invalid state: bot already activated");
    }
}
