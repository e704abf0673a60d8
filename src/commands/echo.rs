use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

/// Returns a copy of the argument as a bulk string.
#[derive(Debug, PartialEq)]
pub struct Echo {
    pub value: Bytes,
}

impl Executable for Echo {
    fn exec(self, _shared: Shared) -> Result<Frame, Error> {
        Ok(Frame::Bulk(self.value))
    }
}

impl TryFrom<&mut CommandParser> for Echo {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let value = parser.next_bytes().map_err(|err| err.wrong_arity("echo"))?;
        parser.expect_end("echo")?;

        Ok(Self { value })
    }
}
