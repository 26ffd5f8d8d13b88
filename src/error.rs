use std::{io, path::PathBuf};

use thiserror::Error;

/// Why a single record could not be parsed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("missing ';' separator")]
    MissingSeparator,

    #[error("empty value")]
    EmptyValue,

    #[error("unexpected byte {0:#04x} in value")]
    InvalidByte(u8),

    #[error("more than one decimal point in value")]
    ExtraDecimalPoint,

    #[error("value does not fit in tenths of i16")]
    OutOfRange,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("record at byte {offset} does not fit in a {capacity} byte chunk")]
    RecordTooLong { offset: u64, capacity: usize },

    #[error("malformed record at byte {offset}: {kind} ({line:?})")]
    Malformed {
        offset: u64,
        kind: MalformedRecord,
        line: String,
    },

    #[error("{stage} worker panicked")]
    WorkerPanicked { stage: &'static str },

    #[error("{stage} queue closed before the pipeline finished")]
    Disconnected { stage: &'static str },

    #[error("pipeline cancelled")]
    Cancelled,
}

impl Error {
    /// Errors raised only because another worker failed first.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Disconnected { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
