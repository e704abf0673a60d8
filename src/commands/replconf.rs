use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

/// Replication configuration exchange.
///
/// On a primary every variant is acknowledged with `+OK`. The two variants
/// with extra behavior are recognised by the connection handlers instead of
/// here: `GETACK *` makes a replica report its applied offset, and
/// `ACK <offset>` is a replica's report which the primary logs.
#[derive(Debug, PartialEq)]
pub struct Replconf {
    pub args: Vec<String>,
}

impl Replconf {
    pub fn is_getack(&self) -> bool {
        self.args
            .first()
            .is_some_and(|arg| arg.eq_ignore_ascii_case("getack"))
    }

    pub fn is_ack(&self) -> bool {
        self.args
            .first()
            .is_some_and(|arg| arg.eq_ignore_ascii_case("ack"))
    }

    pub fn ack_offset(&self) -> Option<u64> {
        if !self.is_ack() {
            return None;
        }
        self.args.get(1).and_then(|arg| arg.parse().ok())
    }
}

impl Executable for Replconf {
    fn exec(self, _shared: Shared) -> Result<Frame, Error> {
        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Replconf {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut args = vec![];

        loop {
            match parser.next_string() {
                Ok(arg) => args.push(arg),
                Err(CommandParserError::EndOfStream) if !args.is_empty() => {
                    break;
                }
                Err(err) => return Err(err.wrong_arity("replconf")),
            }
        }

        Ok(Self { args })
    }
}
