use thiserror::Error;

pub type Result<T> = std::result::Result<T, RdpError>;

/// Errors surfaced to callers awaiting a remote request.
///
/// The enum is `Clone` because actor-fatal errors reject every pending request
/// of an actor with the same value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RdpError {
    #[error("no such actor {actor:?}")]
    NoSuchActor { actor: String },
    #[error("thread is in the wrong state for this request")]
    WrongState,
    #[error("thread exited")]
    Exited,
    #[error("thread detached")]
    Detached,
    #[error("thread paused before the detach completed")]
    Paused,
    #[error("remote error {error}{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Remote {
        error: String,
        message: Option<String>,
    },
    #[error("object grip {actor:?} was released")]
    Released { actor: String },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("actor {actor:?} is registered with a different kind than {expected}")]
    ActorKindMismatch {
        actor: String,
        expected: &'static str,
    },
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for RdpError {
    fn from(err: std::io::Error) -> Self {
        RdpError::Io {
            message: err.to_string(),
        }
    }
}

impl RdpError {
    /// Build the error for a generic `{ error, message }` reply.
    pub(crate) fn remote(error: &str, message: Option<&str>) -> Self {
        match error {
            "wrongState" => RdpError::WrongState,
            _ => RdpError::Remote {
                error: error.to_string(),
                message: message.map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_render_optional_message() {
        let err = RdpError::remote("unknownFrame", Some("frame 3 is gone"));
        assert_eq!(err.to_string(), "remote error unknownFrame: frame 3 is gone");

        let err = RdpError::remote("unknownFrame", None);
        assert_eq!(err.to_string(), "remote error unknownFrame");
    }

    #[test]
    fn io_errors_are_captured_by_message() {
        let err: RdpError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(
            err,
            RdpError::Io {
                message: "pipe".to_string()
            }
        );
    }
}
