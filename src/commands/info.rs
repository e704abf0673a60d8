use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::replication::{ReplicationInfo, Role};
use crate::server::Shared;
use crate::Error;

/// Reports server state as newline-separated `key:value` lines.
///
/// Only the `replication` section exists; asking for anything else yields an
/// empty bulk, the way stock Redis answers an unknown section.
#[derive(Debug, PartialEq)]
pub struct Info {
    pub section: Option<String>,
}

impl Executable for Info {
    fn exec(self, shared: Shared) -> Result<Frame, Error> {
        let section = self.section.map(|s| s.to_lowercase());

        let body = match section.as_deref() {
            None | Some("replication") => replication_section(&shared.replication),
            Some(_) => String::new(),
        };

        Ok(Frame::Bulk(Bytes::from(body)))
    }
}

fn replication_section(info: &ReplicationInfo) -> String {
    match info.role {
        Role::Primary => format!(
            "# Replication\nrole:master\nmaster_replid:{}\nmaster_repl_offset:{}",
            info.replid, info.repl_offset
        ),
        Role::Replica => "# Replication\nrole:slave".to_string(),
    }
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let section = match parser.next_string() {
            Ok(section) => Some(section),
            Err(CommandParserError::EndOfStream) => None,
            Err(err) => return Err(err.into()),
        };
        parser.expect_end("info")?;

        Ok(Self { section })
    }
}
