//! Command transport.
//!
//! One call through [`Zfs::invoke`] or [`Zfs::execute`]:
//!
//! 1. store the target name (`NameTooLong` before the kernel is touched);
//! 2. pack the input and config lists once;
//! 3. allocate the output buffer at the configured initial size;
//! 4. issue the command;
//! 5. on `ENOMEM` grow the output buffer to the larger of what the kernel
//!    reported and twice the current size, then retry with the same packed
//!    input; past the configured ceiling fail with `OutputTooLarge`;
//! 6. decode exactly the bytes the kernel reported as filled.
//!
//! Aux scalars (`zc_cookie`, `zc_objset_type`, `zc_value`, ...) are set by
//! the caller on the [`ZfsCmd`] before the call and read back after it.

use std::fmt;
use std::sync::{Arc, LazyLock};

use libnvlist::{NvList, Record, pack, unpack};
use nix::errno::Errno;
use tracing::{debug, instrument, warn};

use crate::cmd::ZfsCmd;
use crate::config::{ZFS_CONFIG, ZfsConfig};
use crate::device::{ControlDevice, IoBuffers, ZfsDevice};
use crate::error::{KernelError, ZfsError};
use crate::ioc::Ioc;

/// One kernel command: opcode, target and optional packed lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<'a> {
    pub ioc: Ioc,
    /// Pool or dataset name, stored in `zc_name`.
    pub name: &'a str,
    /// Input list (`zc_nvlist_src`).
    pub input: Option<NvList>,
    /// Configuration list (`zc_nvlist_conf`).
    pub config: Option<NvList>,
}

impl<'a> Request<'a> {
    pub fn new(ioc: Ioc, name: &'a str) -> Self {
        Self {
            ioc,
            name,
            input: None,
            config: None,
        }
    }

    pub fn with_input(mut self, input: NvList) -> Self {
        self.input = Some(input);
        self
    }

    /// Attach a typed record as the input list.
    pub fn with_record<R: Record>(self, record: &R) -> Result<Self, ZfsError> {
        Ok(self.with_input(record.to_nvlist()?))
    }

    pub fn with_config(mut self, config: NvList) -> Self {
        self.config = Some(config);
        self
    }
}

/// Handle to the control device.
///
/// Cheap to clone; every clone shares the device. Each call owns its
/// buffers, so one handle serves any number of threads.
#[derive(Clone)]
pub struct Zfs {
    device: Arc<dyn ControlDevice>,
    config: Arc<ZfsConfig>,
}

impl fmt::Debug for Zfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zfs")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Zfs {
    /// Wrap a device, using the process-wide configuration.
    pub fn new(device: impl ControlDevice + 'static) -> Self {
        Self::with_config(device, ZFS_CONFIG.clone())
    }

    pub fn with_config(device: impl ControlDevice + 'static, config: ZfsConfig) -> Self {
        Self {
            device: Arc::new(device),
            config: Arc::new(config),
        }
    }

    /// Open the device named by `config`.
    pub fn open(config: ZfsConfig) -> Result<Self, ZfsError> {
        let device = ZfsDevice::open(&config.device)?;
        Ok(Self::with_config(device, config))
    }

    pub fn config(&self) -> &ZfsConfig {
        &self.config
    }

    /// Run a command and decode its output list into `O`.
    ///
    /// Use [`NvList`] for a dynamic result and `()` to discard it.
    #[instrument(skip_all, fields(ioc = %req.ioc, name = req.name))]
    pub fn invoke<O: Record>(&self, req: &Request<'_>, cmd: &mut ZfsCmd) -> Result<O, ZfsError> {
        let output = self.call(req, cmd, true)?;
        let list = match output {
            Some(bytes) => unpack(&bytes)?,
            None => NvList::new(),
        };
        Ok(O::from_nvlist(list)?)
    }

    /// Run a command that produces no output list.
    #[instrument(skip_all, fields(ioc = %req.ioc, name = req.name))]
    pub fn execute(&self, req: &Request<'_>, cmd: &mut ZfsCmd) -> Result<(), ZfsError> {
        self.call(req, cmd, false).map(drop)
    }

    /// Issue the command, growing the output buffer as asked. Returns the
    /// filled output bytes when output was requested and produced.
    fn call(
        &self,
        req: &Request<'_>,
        cmd: &mut ZfsCmd,
        want_output: bool,
    ) -> Result<Option<Vec<u8>>, ZfsError> {
        cmd.set_name(req.name)?;

        let encoding = self.config.encoding;
        let src = req.input.as_ref().map(|l| pack(l, encoding)).transpose()?;
        let conf = req.config.as_ref().map(|l| pack(l, encoding)).transpose()?;
        cmd.nvlist_src_size = src.as_ref().map_or(0, |b| b.len() as u64);
        cmd.nvlist_conf_size = conf.as_ref().map_or(0, |b| b.len() as u64);

        let mut dst = if want_output {
            vec![0u8; self.config.output_initial]
        } else {
            Vec::new()
        };

        loop {
            cmd.nvlist_dst_size = dst.len() as u64;
            cmd.nvlist_dst_filled = 0;
            debug!(
                src = cmd.nvlist_src_size,
                conf = cmd.nvlist_conf_size,
                dst = cmd.nvlist_dst_size,
                "issuing command"
            );

            let mut bufs = IoBuffers {
                src: src.as_deref(),
                conf: conf.as_deref(),
                dst: &mut dst,
            };
            match self.device.ioctl(req.ioc, cmd, &mut bufs) {
                Ok(()) => break,
                Err(e) if want_output && e.errno() == Errno::ENOMEM => {
                    let next = self.grow(dst.len(), cmd.nvlist_dst_size)?;
                    debug!(from = dst.len(), to = next, "growing output buffer");
                    dst = vec![0u8; next];
                }
                Err(e) => return Err(self.kernel_failure(req, e)),
            }
        }

        if !want_output || !cmd.dst_filled() {
            return Ok(None);
        }
        let filled = usize::try_from(cmd.nvlist_dst_size).unwrap_or(usize::MAX);
        if filled > dst.len() {
            return Err(ZfsError::invalid(format!(
                "kernel reported {filled} output bytes in a {} byte buffer",
                dst.len()
            )));
        }
        dst.truncate(filled);
        Ok(Some(dst))
    }

    /// Size of the next output buffer after `ENOMEM`.
    fn grow(&self, current: usize, reported: u64) -> Result<usize, ZfsError> {
        let max = self.config.output_max;
        let doubled = current.saturating_mul(2);
        let wanted = usize::try_from(reported).unwrap_or(usize::MAX).max(doubled);
        let next = wanted.min(max);
        if reported > max as u64 || next <= current {
            return Err(ZfsError::OutputTooLarge {
                needed: (wanted as u64).max(reported),
                max: max as u64,
            });
        }
        Ok(next)
    }

    fn kernel_failure(&self, req: &Request<'_>, e: KernelError) -> ZfsError {
        if e.is_not_found() || e.already_exists() || e.is_busy() {
            debug!(error = %e, "command failed");
        } else {
            warn!(ioc = %req.ioc, name = req.name, error = %e, "command failed");
        }
        ZfsError::Kernel(e)
    }
}

static ZFS: LazyLock<Result<Zfs, ZfsError>> = LazyLock::new(|| Zfs::open(ZFS_CONFIG.clone()));

/// The process-wide handle, opened on first use and never closed.
pub fn zfs() -> Result<&'static Zfs, ZfsError> {
    ZFS.as_ref().map_err(Clone::clone)
}
