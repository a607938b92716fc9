//! Control-device configuration.
//!
//! Environment variables:
//! - `ZFS_DEVICE`: path of the control device. Defaults to `/dev/zfs`.
//! - `ZFS_IOC_OUTPUT_INITIAL`: initial output buffer size in bytes.
//!   Defaults to 128 KiB.
//! - `ZFS_IOC_OUTPUT_MAX`: largest output buffer the transport will grow to.
//!   Defaults to 256 MiB.
//! - `ZFS_NVLIST_ENCODING`: `xdr` or `native`, the encoding of request
//!   payloads. Defaults to `xdr`.
//!
//! Unparsable values are logged and replaced by the default.

use std::path::PathBuf;
use std::sync::LazyLock;

use libnvlist::Encoding;
use tracing::warn;

pub const DEFAULT_DEVICE: &str = "/dev/zfs";
pub const DEFAULT_OUTPUT_INITIAL: usize = 128 * 1024;
pub const DEFAULT_OUTPUT_MAX: usize = 256 * 1024 * 1024;

/// Settings for a [`Zfs`](crate::Zfs) handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZfsConfig {
    /// Control device path.
    pub device: PathBuf,
    /// First output buffer size tried for commands that return a list.
    pub output_initial: usize,
    /// Growth ceiling; a kernel asking for more fails with `OutputTooLarge`.
    pub output_max: usize,
    /// Encoding used for request payloads.
    pub encoding: Encoding,
}

impl Default for ZfsConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            output_initial: DEFAULT_OUTPUT_INITIAL,
            output_max: DEFAULT_OUTPUT_MAX,
            encoding: Encoding::Xdr,
        }
    }
}

impl ZfsConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut config = Self {
            device: lookup("ZFS_DEVICE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.device),
            output_initial: parse_or("ZFS_IOC_OUTPUT_INITIAL", &lookup, defaults.output_initial),
            output_max: parse_or("ZFS_IOC_OUTPUT_MAX", &lookup, defaults.output_max),
            encoding: parse_or("ZFS_NVLIST_ENCODING", &lookup, defaults.encoding),
        };
        if config.output_initial == 0 {
            warn!("ZFS_IOC_OUTPUT_INITIAL must be positive, using default");
            config.output_initial = DEFAULT_OUTPUT_INITIAL;
        }
        if config.output_max < config.output_initial {
            warn!(
                initial = config.output_initial,
                max = config.output_max,
                "ZFS_IOC_OUTPUT_MAX is below the initial size, raising it"
            );
            config.output_max = config.output_initial;
        }
        config
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(e) => {
            warn!(key, value = %raw, error = %e, ?default, "invalid setting, using default");
            default
        }
    }
}

/// Process-wide configuration, read from the environment at first access.
pub static ZFS_CONFIG: LazyLock<ZfsConfig> = LazyLock::new(ZfsConfig::from_env);
