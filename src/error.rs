use thiserror::Error;

/// Errors the rating core reports to its caller.
///
/// None of them leaves a cat mutated or a cookie written.
#[derive(Error, Debug)]
pub enum CatError {
    #[error("Invalid rating: {stars} stars (expected more than 0 and at most 5)")]
    InvalidRating { stars: f64 },

    #[error("Cat not found: {id}")]
    NotFound { id: u64 },

    #[error("Repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

pub type CatResult<T> = Result<T, CatError>;
