/// Core error type for the exporter
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup connection error: {0}")]
    StartupConnection(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Prefix the message with `context`, keeping the variant.
    ///
    /// Scrape failures travel through two aggregation layers; the prefix records
    /// which collector and target produced them.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Error::Config(msg) => Error::Config(format!("{}: {}", context, msg)),
            Error::StartupConnection(msg) => {
                Error::StartupConnection(format!("{}: {}", context, msg))
            }
            Error::Cancelled(msg) => Error::Cancelled(format!("{}: {}", context, msg)),
            Error::Connection(msg) => Error::Connection(format!("{}: {}", context, msg)),
            Error::Query(msg) => Error::Query(format!("{}: {}", context, msg)),
            Error::Scan(msg) => Error::Scan(format!("{}: {}", context, msg)),
            Error::Encoding(msg) => Error::Encoding(format!("{}: {}", context, msg)),
            Error::Io(err) => Error::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {}", context, err),
            )),
        }
    }

    /// Whether this error only degrades a single scrape cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Query(_) | Error::Scan(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_variant() {
        let err = Error::Query("relation does not exist".to_string()).context("locks on db-a");
        assert!(matches!(err, Error::Query(_)));
        assert_eq!(
            err.to_string(),
            "Query error: locks on db-a: relation does not exist"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Connection("pool timed out".into()).is_recoverable());
        assert!(Error::Scan("missing column".into()).is_recoverable());
        assert!(!Error::Config("no targets".into()).is_recoverable());
        assert!(!Error::StartupConnection("gave up".into()).is_recoverable());
        assert!(!Error::Cancelled("ctrl-c".into()).is_recoverable());
    }
}
