#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graph contains an edge with a missing endpoint: edge #{edge}")]
    MissingEndpoint { edge: usize },
    #[error("invalid layout options: {message}")]
    InvalidOptions { message: String },
    #[error("layout was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
