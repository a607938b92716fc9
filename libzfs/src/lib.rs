//! # libzfs: userspace control library for ZFS
//!
//! `libzfs` drives the ZFS kernel module through its control device,
//! `/dev/zfs`. Every command is one `ioctl(2)` carrying a fixed-layout
//! command buffer ([`ZfsCmd`]) whose variable-sized arguments and results
//! are packed name/value lists (see [`libnvlist`]).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`cmd`] | `zfs_cmd_t` layout, the only ABI definition in the crate. |
//! | [`ioc`] | [`Ioc`] request numbers with a frozen mapping. |
//! | [`device`] | [`ControlDevice`] seam and the real [`ZfsDevice`]. |
//! | [`transport`] | [`Zfs`] handle: invoke, output growth, error mapping. |
//! | [`stream`] | [`SendStream`]: a streaming command as `std::io::Read`. |
//! | [`config`] | [`ZfsConfig`] read from the environment. |
//! | [`error`] | [`ZfsError`], [`KernelError`], [`StreamEnd`]. |
//! | [`types`] | Request/response records and kernel enums. |
//!
//! Pool, dataset and send operations are methods on [`Zfs`]:
//!
//! ```no_run
//! use libzfs::{DatasetProps, ObjectType, zfs};
//!
//! let zfs = zfs()?;
//! zfs.create("tank/home", ObjectType::Zfs, Some(&DatasetProps::default()))?;
//! zfs.snapshot(&["tank/home@monday"], "tank", None)?;
//! let written = zfs.space_written("tank/home", "tank/home@monday")?;
//! # let _ = written;
//! # Ok::<(), libzfs::ZfsError>(())
//! ```

pub mod cmd;
pub mod config;
mod dataset;
pub mod device;
pub mod error;
pub mod ioc;
pub mod pool;
mod send;
pub mod stream;
pub mod transport;
pub mod types;

pub use cmd::ZfsCmd;
pub use config::ZfsConfig;
pub use device::{ControlDevice, IoBuffers, ZfsDevice};
pub use error::{KernelError, StreamEnd, ZfsError};
pub use ioc::Ioc;
pub use pool::{flatten_props, pool_props};
pub use stream::{Abandoned, FdSlot, SendStream};
pub use transport::{Request, Zfs, zfs};
pub use types::*;
