use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

pub trait Executable {
    fn exec(self, shared: Shared) -> Result<Frame, Error>;
}
