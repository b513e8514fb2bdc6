use crate::isa;
use crate::jvm;
use crate::shuffle::ShuffleError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Jvm(jvm::Error),

    /// An instruction showed up where no probe shape exists for it
    UnsupportedInstruction {
        method: String,
        instruction: String,
    },

    MalformedDescriptor {
        descriptor: String,
        message: String,
    },

    /// The shuffler was asked to duplicate a value it has no sequence for
    ShuffleShapeUnsupported(ShuffleError),

    Isa(isa::Error),

    /// Invalid settings
    Settings(String),

    /// A caller-supplied class transform failed
    Stage {
        stage: String,
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Jvm(err) => err.fmt(f),
            Error::UnsupportedInstruction {
                method,
                instruction,
            } => write!(f, "no probe for `{}` in {}", instruction, method),
            Error::MalformedDescriptor {
                descriptor,
                message,
            } => write!(f, "malformed descriptor '{}': {}", descriptor, message),
            Error::ShuffleShapeUnsupported(err) => err.fmt(f),
            Error::Isa(err) => err.fmt(f),
            Error::Settings(msg) => write!(f, "invalid settings: {}", msg),
            Error::Stage { stage, message } => write!(f, "stage {} failed: {}", stage, message),
        }
    }
}

impl std::error::Error for Error {}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        match err {
            jvm::Error::MalformedDescriptor {
                descriptor,
                message,
            } => Error::MalformedDescriptor {
                descriptor,
                message,
            },
            other => Error::Jvm(other),
        }
    }
}

impl From<ShuffleError> for Error {
    fn from(err: ShuffleError) -> Error {
        Error::ShuffleShapeUnsupported(err)
    }
}

impl From<isa::Error> for Error {
    fn from(err: isa::Error) -> Error {
        Error::Isa(err)
    }
}
