use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("peer at {url} returned malformed response: {source}")]
    Malformed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("stabilize timed out after {0:?}")]
    StabilizeTimeout(std::time::Duration),

    #[error("unknown replica id {0}")]
    UnknownReplica(u32),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
