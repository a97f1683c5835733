use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid url {url}: {reason}")]
    Url { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Why a record could not be given a business key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("map filename {0:?} has no usable event prefix")]
    MalformedFilename(String),
    #[error("event {0} has no province")]
    MissingProvince(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize)]
pub enum RunAborted {
    #[error("index page unreachable: {0}")]
    IndexUnreachable(String),
    #[error("no event links found on the index page")]
    NoLinks,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a run is already queued or in progress")]
    AlreadyRunning,
    #[error("run worker has stopped")]
    WorkerGone,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
