use thiserror::Error;

/// Unified result type for the devsupport crate.
pub type Result<T> = std::result::Result<T, DevError>;

/// Errors funneled into the overlay's exception path.
///
/// All three kinds end up in the same place: an exception dialog when a host
/// is attached, the embedder's init-error callback when none is.
#[derive(Debug, Error)]
pub enum DevError {
    /// Resource fetch failed, the development server was unreachable.
    #[error("could not connect to development server, url `{url}`: {message}")]
    Connection { url: String, message: String },
    /// Uncaught error raised by the hosted application.
    #[error("uncaught application exception: {0}")]
    Runtime(String),
    /// Error surfaced by the remote-debug transport.
    #[error("remote debug failure: {0}")]
    RemoteDebug(String),
}

impl DevError {
    /// Build a connection error from a URL and an optional diagnostic.
    pub fn connection(url: impl Into<String>, message: Option<&str>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.unwrap_or("no further detail").to_string(),
        }
    }

    /// The URL the failure originated from, when one is known.
    pub fn source_url(&self) -> Option<&str> {
        match self {
            Self::Connection { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Short tag used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Runtime(_) => "runtime",
            Self::RemoteDebug(_) => "remote_debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_keeps_url() {
        let err = DevError::connection("http://localhost:38989/index.bundle", Some("timed out"));
        assert_eq!(
            err.source_url(),
            Some("http://localhost:38989/index.bundle")
        );
        let text = err.to_string();
        assert!(text.contains("index.bundle"));
        assert!(text.contains("timed out"));
    }

    #[test]
    fn connection_without_detail() {
        let err = DevError::connection("http://h/x", None);
        assert!(err.to_string().contains("no further detail"));
    }

    #[test]
    fn kinds_are_distinct() {
        assert_eq!(DevError::Runtime("boom".into()).kind(), "runtime");
        assert_eq!(DevError::RemoteDebug("lost".into()).kind(), "remote_debug");
        assert_eq!(DevError::connection("u", None).kind(), "connection");
    }
}
