use bytes::Bytes;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

/// Installs or overwrites a key, optionally with an expiry.
///
/// `EX <seconds>` and `PX <milliseconds>` are accepted, one pair at most;
/// any other trailing option is a syntax error.
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub ttl: Option<Ttl>,
}

#[derive(Debug, PartialEq)]
pub enum Ttl {
    Ex(u64),
    Px(u64),
}

impl Ttl {
    pub fn duration(&self) -> Duration {
        match self {
            Ttl::Ex(seconds) => Duration::from_secs(*seconds),
            Ttl::Px(millis) => Duration::from_millis(*millis),
        }
    }
}

impl Executable for Set {
    fn exec(self, shared: Shared) -> Result<Frame, Error> {
        match self.ttl {
            Some(ttl) => shared.store.set_with_ttl(self.key, self.value, ttl.duration()),
            None => shared.store.set(self.key, self.value),
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string().map_err(|err| err.wrong_arity("set"))?;
        let value = parser.next_bytes().map_err(|err| err.wrong_arity("set"))?;

        let mut ttl = None;

        loop {
            let option = match parser.next_string() {
                Ok(option) => option,
                Err(CommandParserError::EndOfStream) => break,
                Err(err) => return Err(err.into()),
            };

            if ttl.is_some() {
                return Err(CommandError::Syntax.into());
            }

            // A dangling option name has no amount to pair with.
            let amount = match parser.next_string() {
                Ok(amount) => amount,
                Err(CommandParserError::EndOfStream) => return Err(CommandError::Syntax.into()),
                Err(err) => return Err(err.into()),
            };
            let amount = amount
                .parse::<u64>()
                .map_err(|_| CommandError::Syntax)?;

            ttl = match option.to_lowercase().as_str() {
                "ex" => Some(Ttl::Ex(amount)),
                "px" => Some(Ttl::Px(amount)),
                _ => return Err(CommandError::Syntax.into()),
            };
        }

        Ok(Self { key, value, ttl })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::Command;
    use crate::replication::ReplicationInfo;

    use super::*;

    fn parse(parts: &[&str]) -> Result<Command, Error> {
        Command::try_from(Frame::command(parts))
    }

    #[test]
    fn parse_without_options() {
        let cmd = parse(&["SET", "foo", "bar"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: "foo".to_string(),
                value: Bytes::from("bar"),
                ttl: None,
            })
        );
    }

    #[test]
    fn parse_with_px() {
        let cmd = parse(&["SET", "foo", "bar", "px", "100"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: "foo".to_string(),
                value: Bytes::from("bar"),
                ttl: Some(Ttl::Px(100)),
            })
        );
    }

    #[test]
    fn parse_with_ex_uppercase() {
        let cmd = parse(&["SET", "foo", "bar", "EX", "5"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: "foo".to_string(),
                value: Bytes::from("bar"),
                ttl: Some(Ttl::Ex(5)),
            })
        );
    }

    fn assert_syntax_error(parts: &[&str]) {
        let err = parse(parts).err().unwrap();
        let err = err.downcast_ref::<CommandError>().unwrap();
        assert_eq!(*err, CommandError::Syntax);
    }

    #[test]
    fn parse_rejects_unknown_option() {
        assert_syntax_error(&["SET", "foo", "bar", "keepttl", "1"]);
    }

    #[test]
    fn parse_rejects_dangling_option() {
        assert_syntax_error(&["SET", "foo", "bar", "px"]);
    }

    #[test]
    fn parse_rejects_two_expiry_pairs() {
        assert_syntax_error(&["SET", "foo", "bar", "px", "100", "ex", "1"]);
    }

    #[test]
    fn parse_rejects_non_numeric_amount() {
        assert_syntax_error(&["SET", "foo", "bar", "px", "soon"]);
    }

    #[test]
    fn parse_missing_value_is_an_arity_error() {
        let err = parse(&["SET", "foo"]).err().unwrap();
        let err = err.downcast_ref::<CommandError>().unwrap();
        assert_eq!(*err, CommandError::WrongArity("set".to_string()));
    }

    #[test]
    fn exec_stores_the_value() {
        let shared = Shared::new(ReplicationInfo::primary());

        let cmd = parse(&["SET", "foo", "bar"]).unwrap();
        let res = cmd.exec(shared.clone()).unwrap();

        assert_eq!(res, Frame::Simple("OK".to_string()));
        assert_eq!(shared.store.get("foo"), Some(Bytes::from("bar")));
    }

    #[tokio::test]
    async fn exec_with_ttl_expires() {
        let shared = Shared::new(ReplicationInfo::primary());

        let cmd = parse(&["SET", "foo", "bar", "px", "40"]).unwrap();
        cmd.exec(shared.clone()).unwrap();

        assert_eq!(shared.store.get("foo"), Some(Bytes::from("bar")));

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(shared.store.get("foo"), None);
    }
}
