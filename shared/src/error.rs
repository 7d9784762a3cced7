use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),

    #[error("datagram too large: {size} bytes (limit {limit})")]
    Oversize { size: usize, limit: usize },
}
