/// Boxed error returned by query sources and consumers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ChangeStreamError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("subscriber has already been subscribed")]
    AlreadySubscribed,

    #[error("failed to query partition '{token}': {source}")]
    Query {
        token: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to decode change record row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("consumer failed: {0}")]
    Consumer(#[source] BoxError),

    #[error("change stream read cancelled")]
    Cancelled,

    #[error("partition reader task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChangeStreamError {
    /// Wrap an arbitrary error as a consumer failure.
    pub fn consumer(err: impl Into<BoxError>) -> Self {
        ChangeStreamError::Consumer(err.into())
    }

    pub fn query(token: impl Into<String>, err: impl Into<BoxError>) -> Self {
        ChangeStreamError::Query {
            token: token.into(),
            source: err.into(),
        }
    }
}

pub type Result<T, E = ChangeStreamError> = std::result::Result<T, E>;

macro_rules! config_err {
    ($($arg:tt)*) => {
        crate::errors::ChangeStreamError::Config(std::format!($($arg)*))
    };
}
pub(crate) use config_err;
