// error.rs — Internal-consistency errors raised by graph surgery
//
// These indicate a defect in a pass (or a frontend handing over a broken
// network), never an expected search outcome. They abort the enclosing pass.

use thiserror::Error;

use crate::id::Id;
use crate::process::{Direction, PortKey};

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("process '{id}' already exists in the network")]
    DuplicateId { id: Id },

    #[error("process '{id}' does not exist in the network")]
    UnknownProcess { id: Id },

    #[error("port {key} does not exist (removed or never allocated)")]
    UnknownPort { key: PortKey },

    #[error("process '{process}' already has an {direction} port named '{port}'")]
    DuplicatePort {
        process: Id,
        port: Id,
        direction: Direction,
    },

    #[error("port {key} is already connected")]
    PortInUse { key: PortKey },

    #[error("cannot connect {from} to {to}: connections must join an out-port to an in-port")]
    DirectionMismatch { from: PortKey, to: PortKey },

    #[error("removing port {key} of '{process}' would leave a dangling graph boundary port")]
    DanglingBoundaryPort { key: PortKey, process: Id },

    #[error("section '{start}'..'{end}' has interior chain length {length}, expected 1")]
    UnexpectedChainLength { start: Id, end: Id, length: usize },

    #[error("process '{id}' is a composite; this pass requires a flat network")]
    NotFlat { id: Id },

    #[error("composite '{id}' is malformed: {reason}")]
    MalformedComposite { id: Id, reason: String },

    #[error("process '{id}' has no {direction} port at index {index}")]
    MissingPortIndex {
        id: Id,
        direction: Direction,
        index: usize,
    },

    #[error("cannot serialize network description: {reason}")]
    Serialize { reason: String },
}
