#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use libnvlist::{Encoding, NvList, pack, unpack};
use libzfs::{ControlDevice, Ioc, IoBuffers, KernelError, Zfs, ZfsCmd, ZfsConfig};
use nix::errno::Errno;
use tracing_subscriber::EnvFilter;

static LOGGER: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What the mock kernel saw in one call.
#[derive(Debug, Clone)]
pub struct Seen {
    pub ioc: Ioc,
    pub name: String,
    pub value: String,
    pub cookie: u64,
    pub objset_type: u64,
    pub defer_destroy: u32,
    pub input: Option<NvList>,
    /// Raw input bytes as handed to the kernel.
    pub src: Option<Vec<u8>>,
    pub config: Option<NvList>,
    pub dst_size: usize,
}

type Handler = dyn Fn(Ioc, &mut ZfsCmd, &mut IoBuffers<'_>) -> Result<(), KernelError> + Send + Sync;

struct Inner {
    calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    handler: Box<Handler>,
}

/// A scriptable stand-in for the kernel.
#[derive(Clone)]
pub struct MockKernel(Arc<Inner>);

impl MockKernel {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Ioc, &mut ZfsCmd, &mut IoBuffers<'_>) -> Result<(), KernelError> + Send + Sync + 'static,
    {
        Self(Arc::new(Inner {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }))
    }

    /// Succeeds without output.
    pub fn ok() -> Self {
        Self::new(|_, _, _| Ok(()))
    }

    /// Fails every call with `errno`.
    pub fn failing(errno: Errno) -> Self {
        Self::new(move |_, _, _| Err(errno.into()))
    }

    /// Answers every call with `list`.
    pub fn replying(list: NvList) -> Self {
        Self::new(move |_, cmd, bufs| reply(cmd, bufs, &list))
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.0.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Seen {
        self.seen().pop().expect("no call recorded")
    }

    /// A handle using this mock with a small, deterministic config.
    pub fn zfs(&self) -> Zfs {
        Zfs::with_config(self.clone(), test_config())
    }
}

impl ControlDevice for MockKernel {
    fn ioctl(&self, ioc: Ioc, cmd: &mut ZfsCmd, bufs: &mut IoBuffers<'_>) -> Result<(), KernelError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        self.0.seen.lock().unwrap().push(Seen {
            ioc,
            name: cmd.name(),
            value: cmd.value(),
            cookie: cmd.cookie,
            objset_type: cmd.objset_type,
            defer_destroy: cmd.defer_destroy,
            input: bufs.src.map(|b| unpack(b).expect("input decodes")),
            src: bufs.src.map(<[u8]>::to_vec),
            config: bufs.conf.map(|b| unpack(b).expect("config decodes")),
            dst_size: bufs.dst.len(),
        });
        (self.0.handler)(ioc, cmd, bufs)
    }
}

pub fn test_config() -> ZfsConfig {
    ZfsConfig {
        output_initial: 256,
        output_max: 4096,
        encoding: Encoding::Xdr,
        ..ZfsConfig::default()
    }
}

/// Write `list` to the output buffer the way the kernel does, asking for
/// more room with `ENOMEM` when it does not fit.
pub fn reply(cmd: &mut ZfsCmd, bufs: &mut IoBuffers<'_>, list: &NvList) -> Result<(), KernelError> {
    let bytes = pack(list, Encoding::Native).expect("reply packs");
    if bytes.len() > bufs.dst.len() {
        cmd.nvlist_dst_size = bytes.len() as u64;
        return Err(Errno::ENOMEM.into());
    }
    bufs.dst[..bytes.len()].copy_from_slice(&bytes);
    cmd.nvlist_dst_size = bytes.len() as u64;
    cmd.nvlist_dst_filled = 1;
    Ok(())
}

/// Decode the input list of a call.
pub fn input(bufs: &IoBuffers<'_>) -> NvList {
    bufs.src.map(|b| unpack(b).expect("input decodes")).unwrap_or_default()
}
