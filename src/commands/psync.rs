use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

/// Synchronisation request from a replica.
///
/// `exec` only produces the `+FULLRESYNC <replid> <offset>` reply; sending
/// the snapshot and attaching the connection to the registry are side effects
/// the connection handler performs, since they need the socket.
#[derive(Debug, PartialEq)]
pub struct Psync {
    pub replid: String,
    pub offset: String,
}

impl Executable for Psync {
    fn exec(self, shared: Shared) -> Result<Frame, Error> {
        Ok(Frame::Simple(format!(
            "FULLRESYNC {} {}",
            shared.replication.replid, shared.replication.repl_offset
        )))
    }
}

impl TryFrom<&mut CommandParser> for Psync {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let replid = parser.next_string().map_err(|err| err.wrong_arity("psync"))?;
        let offset = parser.next_string().map_err(|err| err.wrong_arity("psync"))?;
        parser.expect_end("psync")?;

        Ok(Self { replid, offset })
    }
}
