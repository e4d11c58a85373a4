use kube::Error as KubeError;
use kube::runtime::watcher::Error as WatcherError;
use thiserror::Error;

pub const CONFLICT: u16 = 409;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] KubeError),

    #[error("watch error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("reading {stream}: {source}")]
    Stream {
        stream: &'static str,
        source: Box<Error>,
    },

    #[error("could not add CRD: {0}")]
    Install(Box<Error>),

    #[error("watch on CRD {0} closed before it was established")]
    CrdWatchClosed(String),

    #[error("CRD {0} was not established in time")]
    CrdTimeout(String),
}

impl Error {
    pub fn stream(stream: &'static str, source: Error) -> Self {
        Error::Stream {
            stream,
            source: Box::new(source),
        }
    }

    /// HTTP status code reported by the API server, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube(KubeError::Api(resp)) => Some(resp.code),
            Error::Stream { source, .. } | Error::Install(source) => source.status_code(),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(CONFLICT)
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(KubeError::Api(kube::core::ErrorResponse {
        status: "Failure".into(),
        message: format!("{reason} (test)"),
        reason: reason.into(),
        code,
    }))
}
