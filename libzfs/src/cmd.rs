//! The kernel command buffer, `zfs_cmd_t`.
//!
//! This is the only place that knows the binary layout. Every field is laid
//! out with `#[repr(C)]` in kernel order; the compile-time assertions below
//! pin the offsets that matter for x86_64/aarch64 Linux, so a layout drift
//! fails the build instead of corrupting kernel memory.
//!
//! | offset | field |
//! |---:|---|
//! | 0 | `zc_name[4096]` |
//! | 4096 | nvlist src/dst descriptors, `zc_nvlist_dst_filled` |
//! | 4136 | `zc_history` |
//! | 4144 | `zc_value[8192]` |
//! | 12336 | `zc_string[256]` |
//! | 12592 | `zc_guid` .. `zc_iflags` |
//! | 12672 | `zc_share` |
//! | 12704 | `zc_objset_stats` |
//! | 12992 | `zc_begin_record` |
//! | 13296 | `zc_inject_record` |
//! | 13648 | `zc_defer_destroy` .. `zc_createtxg` |
//! | 13696 | `zc_stat` |

use std::fmt;
use std::mem::{offset_of, size_of};

use crate::error::ZfsError;
use crate::types::ObjectType;

/// `MAXPATHLEN`.
pub const MAXPATHLEN: usize = 4096;

/// `MAXNAMELEN`.
pub const MAXNAMELEN: usize = 256;

/// Total size of `zfs_cmd_t`.
pub const ZFS_CMD_SIZE: usize = 13736;

/// Longest name `zc_name` can hold.
pub const MAX_NAME_LEN: usize = MAXPATHLEN - 1;

/// Longest secondary name `zc_value` can hold.
pub const MAX_VALUE_LEN: usize = 2 * MAXPATHLEN - 1;

/// Longest string `zc_string` can hold.
pub const MAX_STRING_LEN: usize = MAXNAMELEN - 1;

/// `zfs_share_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZfsShare {
    pub exportdata: u64,
    pub sharedata: u64,
    /// 0 = share, 1 = unshare
    pub sharetype: u64,
    pub sharemax: u64,
}

/// `dmu_objset_stats_t`, filled by `OBJSET_STATS`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ObjsetStats {
    pub num_clones: u64,
    pub creation_txg: u64,
    pub guid: u64,
    /// `dmu_objset_type_t`
    pub objset_type: u32,
    pub is_snapshot: u8,
    pub inconsistent: u8,
    pub origin: [u8; MAXNAMELEN],
    pub pad: [u8; 2],
}

impl ObjsetStats {
    /// Origin snapshot of a clone; empty for everything else.
    pub fn origin(&self) -> String {
        c_string(&self.origin)
    }

    pub fn object_type(&self) -> ObjectType {
        ObjectType::from_stats(self.objset_type)
    }

    pub fn is_snapshot(&self) -> bool {
        self.is_snapshot != 0
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent != 0
    }
}

impl Default for ObjsetStats {
    fn default() -> Self {
        Self {
            num_clones: 0,
            creation_txg: 0,
            guid: 0,
            objset_type: 0,
            is_snapshot: 0,
            inconsistent: 0,
            origin: [0; MAXNAMELEN],
            pad: [0; 2],
        }
    }
}

impl fmt::Debug for ObjsetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjsetStats")
            .field("num_clones", &self.num_clones)
            .field("creation_txg", &self.creation_txg)
            .field("guid", &self.guid)
            .field("objset_type", &self.object_type())
            .field("is_snapshot", &self.is_snapshot())
            .field("inconsistent", &self.is_inconsistent())
            .field("origin", &self.origin())
            .finish()
    }
}

/// `struct drr_begin`, the first record of a send stream.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DrrBegin {
    pub magic: u64,
    pub versioninfo: u64,
    pub creation_time: u64,
    pub objset_type: u32,
    pub flags: u32,
    pub toguid: u64,
    pub fromguid: u64,
    pub toname: [u8; MAXNAMELEN],
}

impl DrrBegin {
    pub fn toname(&self) -> String {
        c_string(&self.toname)
    }
}

impl Default for DrrBegin {
    fn default() -> Self {
        Self {
            magic: 0,
            versioninfo: 0,
            creation_time: 0,
            objset_type: 0,
            flags: 0,
            toguid: 0,
            fromguid: 0,
            toname: [0; MAXNAMELEN],
        }
    }
}

impl fmt::Debug for DrrBegin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrrBegin")
            .field("magic", &format_args!("{:#x}", self.magic))
            .field("versioninfo", &self.versioninfo)
            .field("toguid", &self.toguid)
            .field("fromguid", &self.fromguid)
            .field("toname", &self.toname())
            .finish_non_exhaustive()
    }
}

/// `zfs_stat_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZfsStat {
    pub gen_: u64,
    pub mode: u64,
    pub links: u64,
    pub ctime: [u64; 2],
}

/// Size of `zinject_record_t`; only fault-injection commands use it, so it
/// is carried as opaque bytes.
pub const INJECT_RECORD_SIZE: usize = 352;

/// `zfs_cmd_t`.
///
/// Pointer fields hold user addresses as `u64`; they are filled by the
/// device right before the call and are meaningless afterwards.
#[repr(C)]
#[derive(Clone)]
pub struct ZfsCmd {
    pub name: [u8; MAXPATHLEN],
    pub nvlist_src: u64,
    pub nvlist_src_size: u64,
    pub nvlist_dst: u64,
    pub nvlist_dst_size: u64,
    /// `boolean_t`
    pub nvlist_dst_filled: u32,
    pub pad2: i32,
    pub history: u64,
    pub value: [u8; MAXPATHLEN * 2],
    pub string: [u8; MAXNAMELEN],
    pub guid: u64,
    pub nvlist_conf: u64,
    pub nvlist_conf_size: u64,
    pub cookie: u64,
    pub objset_type: u64,
    pub perm_action: u64,
    pub history_len: u64,
    pub history_offset: u64,
    pub obj: u64,
    pub iflags: u64,
    pub share: ZfsShare,
    pub objset_stats: ObjsetStats,
    pub begin_record: DrrBegin,
    pub inject_record: [u8; INJECT_RECORD_SIZE],
    pub defer_destroy: u32,
    pub flags: u32,
    pub action_handle: u64,
    pub cleanup_fd: i32,
    pub simple: u8,
    pub pad: [u8; 3],
    pub sendobj: u64,
    pub fromobj: u64,
    pub createtxg: u64,
    pub stat: ZfsStat,
}

const _: () = {
    assert!(size_of::<ZfsCmd>() == ZFS_CMD_SIZE);
    assert!(size_of::<ObjsetStats>() == 288);
    assert!(size_of::<DrrBegin>() == 304);
    assert!(size_of::<ZfsStat>() == 40);
    assert!(offset_of!(ZfsCmd, nvlist_src) == 4096);
    assert!(offset_of!(ZfsCmd, nvlist_dst_filled) == 4128);
    assert!(offset_of!(ZfsCmd, value) == 4144);
    assert!(offset_of!(ZfsCmd, string) == 12336);
    assert!(offset_of!(ZfsCmd, guid) == 12592);
    assert!(offset_of!(ZfsCmd, cookie) == 12616);
    assert!(offset_of!(ZfsCmd, objset_type) == 12624);
    assert!(offset_of!(ZfsCmd, share) == 12672);
    assert!(offset_of!(ZfsCmd, objset_stats) == 12704);
    assert!(offset_of!(ZfsCmd, begin_record) == 12992);
    assert!(offset_of!(ZfsCmd, inject_record) == 13296);
    assert!(offset_of!(ZfsCmd, defer_destroy) == 13648);
    assert!(offset_of!(ZfsCmd, cleanup_fd) == 13664);
    assert!(offset_of!(ZfsCmd, sendobj) == 13672);
    assert!(offset_of!(ZfsCmd, stat) == 13696);
};

impl ZfsCmd {
    /// An all-zero command, boxed; the struct is too large to pass around
    /// by value comfortably.
    pub fn new() -> Box<Self> {
        Box::new(Self {
            name: [0; MAXPATHLEN],
            nvlist_src: 0,
            nvlist_src_size: 0,
            nvlist_dst: 0,
            nvlist_dst_size: 0,
            nvlist_dst_filled: 0,
            pad2: 0,
            history: 0,
            value: [0; MAXPATHLEN * 2],
            string: [0; MAXNAMELEN],
            guid: 0,
            nvlist_conf: 0,
            nvlist_conf_size: 0,
            cookie: 0,
            objset_type: 0,
            perm_action: 0,
            history_len: 0,
            history_offset: 0,
            obj: 0,
            iflags: 0,
            share: ZfsShare::default(),
            objset_stats: ObjsetStats::default(),
            begin_record: DrrBegin::default(),
            inject_record: [0; INJECT_RECORD_SIZE],
            defer_destroy: 0,
            flags: 0,
            action_handle: 0,
            cleanup_fd: -1,
            simple: 0,
            pad: [0; 3],
            sendobj: 0,
            fromobj: 0,
            createtxg: 0,
            stat: ZfsStat::default(),
        })
    }

    /// Store the primary pool or dataset name.
    pub fn set_name(&mut self, name: &str) -> Result<(), ZfsError> {
        write_c_string(&mut self.name, "zc_name", name)
    }

    /// Store the secondary name (rename target, snapshot for space queries).
    pub fn set_value(&mut self, value: &str) -> Result<(), ZfsError> {
        write_c_string(&mut self.value, "zc_value", value)
    }

    pub fn set_string(&mut self, s: &str) -> Result<(), ZfsError> {
        write_c_string(&mut self.string, "zc_string", s)
    }

    pub fn name(&self) -> String {
        c_string(&self.name)
    }

    pub fn value(&self) -> String {
        c_string(&self.value)
    }

    pub fn string(&self) -> String {
        c_string(&self.string)
    }

    pub fn dst_filled(&self) -> bool {
        self.nvlist_dst_filled != 0
    }

    /// View the command as raw bytes.
    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ZfsCmd` is `repr(C)` and made only of integers and byte
        // arrays with every gap spelled out as a field, so all bytes are
        // initialized.
        unsafe { std::slice::from_raw_parts((self as *const Self).cast::<u8>(), ZFS_CMD_SIZE) }
    }
}

impl fmt::Debug for ZfsCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZfsCmd")
            .field("name", &self.name())
            .field("value", &self.value())
            .field("nvlist_src_size", &self.nvlist_src_size)
            .field("nvlist_dst_size", &self.nvlist_dst_size)
            .field("nvlist_conf_size", &self.nvlist_conf_size)
            .field("cookie", &self.cookie)
            .field("objset_type", &self.objset_type)
            .field("defer_destroy", &self.defer_destroy)
            .finish_non_exhaustive()
    }
}

/// Copy `s` into a fixed, NUL-terminated field.
fn write_c_string(dst: &mut [u8], field: &'static str, s: &str) -> Result<(), ZfsError> {
    if s.as_bytes().contains(&0) {
        return Err(ZfsError::InvalidArgument(format!(
            "{field} value {s:?} contains a NUL byte"
        )));
    }
    let max = dst.len() - 1;
    if s.len() > max {
        return Err(ZfsError::NameTooLong {
            field,
            len: s.len(),
            max,
        });
    }
    dst[..s.len()].copy_from_slice(s.as_bytes());
    dst[s.len()..].fill(0);
    Ok(())
}

/// Read a NUL-terminated field, replacing invalid UTF-8.
fn c_string(buf: &[u8]) -> String {
    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(size_of::<ZfsCmd>(), 13736);
        assert_eq!(offset_of!(ZfsCmd, history), 4136);
        assert_eq!(offset_of!(ZfsCmd, nvlist_conf), 12600);
        assert_eq!(offset_of!(ZfsCmd, iflags), 12664);
        assert_eq!(offset_of!(ZfsCmd, action_handle), 13656);
        assert_eq!(offset_of!(ZfsCmd, simple), 13668);
        assert_eq!(offset_of!(ZfsCmd, createtxg), 13688);
        assert_eq!(offset_of!(ObjsetStats, objset_type), 24);
        assert_eq!(offset_of!(ObjsetStats, origin), 30);
        assert_eq!(offset_of!(DrrBegin, toname), 48);
    }

    #[test]
    fn value_boundary() {
        let mut cmd = ZfsCmd::new();
        let ok = "v".repeat(MAX_VALUE_LEN);
        cmd.set_value(&ok).unwrap();
        assert_eq!(cmd.value().len(), 8191);
        assert_eq!(cmd.value[8191], 0);

        let err = cmd.set_value(&"v".repeat(8192)).unwrap_err();
        assert!(matches!(
            err,
            ZfsError::NameTooLong {
                field: "zc_value",
                len: 8192,
                max: 8191
            }
        ));
    }

    #[test]
    fn name_and_string_limits() {
        let mut cmd = ZfsCmd::new();
        cmd.set_name(&"n".repeat(MAX_NAME_LEN)).unwrap();
        assert!(cmd.set_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());
        cmd.set_string(&"s".repeat(MAX_STRING_LEN)).unwrap();
        assert!(matches!(
            cmd.set_string(&"s".repeat(256)).unwrap_err(),
            ZfsError::NameTooLong { field: "zc_string", max: 255, .. }
        ));
    }

    #[test]
    fn shorter_name_clears_tail() {
        let mut cmd = ZfsCmd::new();
        cmd.set_name("tank/very/long/name").unwrap();
        cmd.set_name("tank").unwrap();
        assert_eq!(cmd.name(), "tank");
        assert!(cmd.name[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn interior_nul_is_invalid() {
        let mut cmd = ZfsCmd::new();
        assert!(matches!(
            cmd.set_name("tank\0evil").unwrap_err(),
            ZfsError::InvalidArgument(_)
        ));
    }

    #[test]
    fn objset_stats_accessors() {
        let mut stats = ObjsetStats::default();
        stats.objset_type = 2;
        stats.origin[..6].copy_from_slice(b"tank@a");
        stats.is_snapshot = 1;
        assert_eq!(stats.object_type(), ObjectType::Zfs);
        assert_eq!(stats.origin(), "tank@a");
        assert!(stats.is_snapshot());
    }

    #[test]
    fn raw_bytes_cover_whole_struct() {
        let mut cmd = ZfsCmd::new();
        cmd.cookie = 0x0102_0304_0506_0708;
        let bytes = cmd.as_bytes();
        assert_eq!(bytes.len(), ZFS_CMD_SIZE);
        assert_eq!(&bytes[12616..12624], &cmd.cookie.to_ne_bytes());
    }
}
