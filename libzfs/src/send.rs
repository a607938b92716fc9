//! Send streams and their size estimates.

use tracing::instrument;

use crate::cmd::ZfsCmd;
use crate::error::ZfsError;
use crate::ioc::Ioc;
use crate::stream::SendStream;
use crate::transport::{Request, Zfs};
use crate::types::{SendOptions, SendSpaceOptions, SpaceResponse};

impl Zfs {
    /// Estimated size in bytes of the stream [`Zfs::send`] would produce.
    #[instrument(skip(self, options))]
    pub fn send_space(&self, name: &str, options: &SendSpaceOptions) -> Result<u64, ZfsError> {
        let req = Request::new(Ioc::SendSpace, name).with_record(options)?;
        let res: SpaceResponse = self.invoke(&req, &mut ZfsCmd::new())?;
        Ok(res.space)
    }

    /// Stream snapshot `name`, incrementally from `options.from` if set.
    ///
    /// Errors the kernel reports before the first byte are returned here;
    /// later ones surface when the stream is read to its end.
    #[instrument(skip(self, options))]
    pub fn send(&self, name: &str, options: SendOptions) -> Result<SendStream, ZfsError> {
        self.start_stream(Ioc::SendNew, name, ZfsCmd::new(), options)
    }
}
