//! The control-device seam.
//!
//! [`ControlDevice`] is the only place a kernel call happens. The transport
//! owns every buffer and hands them over as [`IoBuffers`]; an implementation
//! wires their addresses into the command and issues the call.
//! [`ZfsDevice`] is the real `/dev/zfs`; tests substitute a mock kernel.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::libc;
use tracing::debug;

use crate::cmd::ZfsCmd;
use crate::error::{KernelError, ZfsError};
use crate::ioc::Ioc;

/// Buffers attached to one kernel call.
///
/// Sizes are already stored in the command by the transport; devices only
/// read or fill the bytes.
#[derive(Debug)]
pub struct IoBuffers<'a> {
    /// Packed input list (`zc_nvlist_src`).
    pub src: Option<&'a [u8]>,
    /// Packed configuration list (`zc_nvlist_conf`).
    pub conf: Option<&'a [u8]>,
    /// Output area (`zc_nvlist_dst`); empty when no output is expected.
    pub dst: &'a mut [u8],
}

impl IoBuffers<'_> {
    /// Buffers for a command that carries no lists at all.
    pub fn none() -> IoBuffers<'static> {
        IoBuffers {
            src: None,
            conf: None,
            dst: &mut [],
        }
    }
}

/// Something that executes `zfs_cmd_t` commands.
pub trait ControlDevice: Send + Sync {
    /// Issue `ioc` with `cmd`. On failure the raw error code comes back
    /// untouched; `ENOMEM` with an updated `nvlist_dst_size` asks for a
    /// larger output buffer.
    fn ioctl(&self, ioc: Ioc, cmd: &mut ZfsCmd, bufs: &mut IoBuffers<'_>) -> Result<(), KernelError>;
}

/// The kernel control device.
#[derive(Debug)]
pub struct ZfsDevice {
    file: File,
    path: PathBuf,
}

impl ZfsDevice {
    /// Open `path` read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ZfsError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ZfsError::DeviceUnavailable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), "opened control device");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn addr(buf: Option<&[u8]>) -> u64 {
    buf.map_or(0, |b| b.as_ptr() as u64)
}

impl ControlDevice for ZfsDevice {
    fn ioctl(&self, ioc: Ioc, cmd: &mut ZfsCmd, bufs: &mut IoBuffers<'_>) -> Result<(), KernelError> {
        cmd.nvlist_src = addr(bufs.src);
        cmd.nvlist_conf = addr(bufs.conf);
        cmd.nvlist_dst = if bufs.dst.is_empty() {
            0
        } else {
            bufs.dst.as_mut_ptr() as u64
        };

        // SAFETY: `cmd` is a live, correctly laid out `zfs_cmd_t`. Every
        // address stored in it points into a buffer borrowed by `bufs` for
        // the duration of this call, with the matching size already set.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioc.request() as _,
                cmd as *mut ZfsCmd,
            )
        };

        cmd.nvlist_src = 0;
        cmd.nvlist_conf = 0;
        cmd.nvlist_dst = 0;

        Errno::result(rc).map(drop).map_err(KernelError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zfs");
        let err = ZfsDevice::open(&path).unwrap_err();
        match err {
            ZfsError::DeviceUnavailable { path: p, reason } => {
                assert_eq!(p, path.display().to_string());
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn regular_file_rejects_commands() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dev = ZfsDevice::open(file.path()).unwrap();
        assert_eq!(dev.path(), file.path());

        let mut cmd = ZfsCmd::new();
        cmd.set_name("tank").unwrap();
        let err = dev
            .ioctl(Ioc::PoolGetProps, &mut cmd, &mut IoBuffers::none())
            .unwrap_err();
        assert_eq!(err.errno(), Errno::ENOTTY);
        assert!(err.is_unsupported());
        assert_eq!(cmd.nvlist_dst, 0);
    }
}
