//! Error taxonomy for compilation and simulation.
//!
//! Three kinds, with a strict boundary between them: configuration errors
//! surface before any iteration runs, state errors abort a run at the
//! offending entity, and resource errors wrap collaborator failures with the
//! iteration they happened in.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad attribute/value reference, undeclared parameter, malformed
    /// syntax, duplicate rule. Detected at construction time, never mid-run.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An entity's state could not be read or left its declared domain.
    /// Fatal; the run aborts at this entity.
    #[error("state error at {entity}: {detail}")]
    State { entity: String, detail: String },

    /// A collaborator (network generator, output sink) failed.
    #[error("resource error at iteration {iteration}: {source}")]
    Resource {
        iteration: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn state(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::State {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub fn resource(
        iteration: usize,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Resource {
            iteration,
            source: Box::new(source),
        }
    }
}

impl From<percolate_dsl::DefinitionError> for Error {
    fn from(err: percolate_dsl::DefinitionError) -> Self {
        Error::configuration(err.to_string())
    }
}

impl From<percolate_dsl::ConfigError> for Error {
    fn from(err: percolate_dsl::ConfigError) -> Self {
        Error::configuration(err.to_string())
    }
}

impl From<percolate_dsl::ParseError> for Error {
    fn from(err: percolate_dsl::ParseError) -> Self {
        Error::configuration(err.to_string())
    }
}
