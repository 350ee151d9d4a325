use mavlink::error::{MessageReadError, MessageWriteError};
use std::num::ParseIntError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid URI")]
    InvalidUri,
    #[error("Invalid URI Scheme")]
    InvalidUriScheme,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid frame")]
    InvalidFrame,
    #[error("MAVLink decoding error: {0:?}")]
    ReadError(MessageReadError),
    #[error("MAVLink encoding error: {0:?}")]
    WriteError(MessageWriteError),
    #[error("Threading error: {0:?}")]
    ChannelRecvError(flume::RecvError),
    #[error("Threading error: {0:?}")]
    ChannelSendError(flume::SendError<Vec<u8>>),
}

impl From<MessageReadError> for Error {
    fn from(error: MessageReadError) -> Self {
        Error::ReadError(error)
    }
}

impl From<MessageWriteError> for Error {
    fn from(error: MessageWriteError) -> Self {
        Error::WriteError(error)
    }
}

impl From<flume::RecvError> for Error {
    fn from(error: flume::RecvError) -> Self {
        Error::ChannelRecvError(error)
    }
}

impl From<flume::SendError<Vec<u8>>> for Error {
    fn from(error: flume::SendError<Vec<u8>>) -> Self {
        Error::ChannelSendError(error)
    }
}

impl From<url::ParseError> for Error {
    fn from(_error: url::ParseError) -> Self {
        Error::InvalidUri
    }
}

impl From<ParseIntError> for Error {
    fn from(_error: ParseIntError) -> Self {
        Error::InvalidUri
    }
}
