pub mod del;
pub mod echo;
pub mod executable;
pub mod exists;
pub mod get;
pub mod info;
pub mod ping;
pub mod psync;
pub mod replconf;
pub mod set;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

use self::del::Del;
use self::echo::Echo;
use self::exists::Exists;
use self::get::Get;
use self::info::Info;
use self::ping::Ping;
use self::psync::Psync;
use self::replconf::Replconf;
use self::set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Ping(Ping),
    Echo(Echo),
    Set(Set),
    Get(Get),
    Del(Del),
    Exists(Exists),
    Info(Info),
    Replconf(Replconf),
    Psync(Psync),
}

impl Command {
    /// Write commands mutate the keyspace and are the only ones fanned out
    /// to replicas.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set(_) | Command::Del(_))
    }
}

impl Executable for Command {
    fn exec(self, shared: Shared) -> Result<Frame, Error> {
        match self {
            Command::Ping(cmd) => cmd.exec(shared),
            Command::Echo(cmd) => cmd.exec(shared),
            Command::Set(cmd) => cmd.exec(shared),
            Command::Get(cmd) => cmd.exec(shared),
            Command::Del(cmd) => cmd.exec(shared),
            Command::Exists(cmd) => cmd.exec(shared),
            Command::Info(cmd) => cmd.exec(shared),
            Command::Replconf(cmd) => cmd.exec(shared),
            Command::Psync(cmd) => cmd.exec(shared),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the server as arrays of bulk strings.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(Box::new(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                }))
            }
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser.parse_command_name()?;

        match &command_name[..] {
            "ping" => Ping::try_from(parser).map(Command::Ping),
            "echo" => Echo::try_from(parser).map(Command::Echo),
            "set" => Set::try_from(parser).map(Command::Set),
            "get" => Get::try_from(parser).map(Command::Get),
            "del" => Del::try_from(parser).map(Command::Del),
            "exists" => Exists::try_from(parser).map(Command::Exists),
            "info" => Info::try_from(parser).map(Command::Info),
            "replconf" => Replconf::try_from(parser).map(Command::Replconf),
            "psync" => Psync::try_from(parser).map(Command::Psync),
            name => Err(CommandError::Unknown(name.to_uppercase()).into()),
        }
    }
}

/// Errors with a client-visible `-ERR` rendering, as opposed to the
/// parser-internal [`CommandParserError`].
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{0}'")]
    WrongArity(String),
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR unknown command '{0}'")]
    Unknown(String),
}

pub struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match command_name {
            Frame::Simple(s) => Ok(s.to_lowercase()),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_lowercase())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. Strings
            // are parsed to UTF-8.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Trailing arguments beyond a command's shape are an arity error.
    fn expect_end(&mut self, verb: &str) -> Result<(), Error> {
        if self.parts.next().is_some() {
            return Err(CommandError::WrongArity(verb.to_string()).into());
        }
        Ok(())
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub(crate) enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("protocol error; attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
}

impl CommandParserError {
    /// A missing argument means the client got the command's arity wrong;
    /// other parse failures keep their protocol-error shape.
    pub(crate) fn wrong_arity(self, verb: &str) -> Error {
        match self {
            CommandParserError::EndOfStream => CommandError::WrongArity(verb.to_string()).into(),
            err => err.into(),
        }
    }
}
