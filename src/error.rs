use std::error::Error;
use std::fmt;
use tokio_cron_scheduler::JobSchedulerError;

/// Custom Error and Result types to unify errors from all sources.
pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Debug)]
pub enum MirrorError {
    Config(String),
    Fetch(String),
    Parse(String),
    Cache(String),
    Scheduler(String),
}

impl MirrorError {
    /// Fetch errors are the only ones worth retrying against upstream.
    pub fn is_transient(&self) -> bool {
        matches!(self, MirrorError::Fetch(_))
    }
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MirrorError::Config(s) => write!(f, "Config Error: {}", s),
            MirrorError::Fetch(s) => write!(f, "Fetch Error: {}", s),
            MirrorError::Parse(s) => write!(f, "Parse Error: {}", s),
            MirrorError::Cache(s) => write!(f, "Cache Error: {}", s),
            MirrorError::Scheduler(s) => write!(f, "Scheduler Error: {}", s),
        }
    }
}

impl Error for MirrorError {}

impl From<reqwest::Error> for MirrorError {
    fn from(error: reqwest::Error) -> Self {
        MirrorError::Fetch(error.to_string())
    }
}

impl From<redis::RedisError> for MirrorError {
    fn from(error: redis::RedisError) -> Self {
        MirrorError::Cache(error.to_string())
    }
}

impl From<figment::Error> for MirrorError {
    fn from(error: figment::Error) -> Self {
        MirrorError::Config(error.to_string())
    }
}

impl From<JobSchedulerError> for MirrorError {
    fn from(error: JobSchedulerError) -> Self {
        MirrorError::Scheduler(error.to_string())
    }
}
