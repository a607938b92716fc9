//! Control-device request numbers.
//!
//! On Linux the request passed to `ioctl(2)` is the raw `zfs_ioc_t` value,
//! not an `_IOWR` encoding. Numbering starts at `'Z' << 8` and follows the
//! kernel header order; the Linux-only commands live at `+0x80`.

use std::fmt;

macro_rules! define_ioc_codes {
    ( $( $(#[$meta:meta])* $variant:ident = $id:literal, $display:literal; )* ) => {
        /// Kernel command selector.
        ///
        /// Values are ABI; inserting a variant in the middle renumbers
        /// everything after it, which the frozen-mapping test catches.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum Ioc {
            $( $(#[$meta])* $variant = $id, )*
        }

        impl Ioc {
            pub fn from_u32(v: u32) -> Option<Self> {
                match v {
                    $( $id => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Request number handed to `ioctl(2)`.
            #[inline]
            pub fn request(self) -> u32 {
                self as u32
            }

            /// Kernel name without the `ZFS_IOC_` prefix.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $display, )*
                }
            }
        }

        #[cfg(test)]
        pub(crate) const ALL_IOCS: &[Ioc] = &[
            $( Ioc::$variant, )*
        ];
    };
}

/// `ZFS_IOC_FIRST`.
pub const IOC_FIRST: u32 = (b'Z' as u32) << 8;

/// First Linux-specific request, `ZFS_IOC_LINUX + 1`.
pub const IOC_LINUX_FIRST: u32 = IOC_FIRST + 0x81;

define_ioc_codes! {
    // Illumos range
    /// Create a pool from a vdev tree (`zc_nvlist_conf`) and properties
    PoolCreate         = 0x5A00, "POOL_CREATE";
    PoolDestroy        = 0x5A01, "POOL_DESTROY";
    PoolImport         = 0x5A02, "POOL_IMPORT";
    PoolExport         = 0x5A03, "POOL_EXPORT";
    PoolConfigs        = 0x5A04, "POOL_CONFIGS";
    PoolStats          = 0x5A05, "POOL_STATS";
    PoolTryimport      = 0x5A06, "POOL_TRYIMPORT";
    PoolScan           = 0x5A07, "POOL_SCAN";
    PoolFreeze         = 0x5A08, "POOL_FREEZE";
    PoolUpgrade        = 0x5A09, "POOL_UPGRADE";
    PoolGetHistory     = 0x5A0A, "POOL_GET_HISTORY";
    VdevAdd            = 0x5A0B, "VDEV_ADD";
    VdevRemove         = 0x5A0C, "VDEV_REMOVE";
    VdevSetState       = 0x5A0D, "VDEV_SET_STATE";
    VdevAttach         = 0x5A0E, "VDEV_ATTACH";
    VdevDetach         = 0x5A0F, "VDEV_DETACH";
    VdevSetpath        = 0x5A10, "VDEV_SETPATH";
    VdevSetfru         = 0x5A11, "VDEV_SETFRU";
    /// Dataset statistics and properties
    ObjsetStats        = 0x5A12, "OBJSET_STATS";
    ObjsetZplprops     = 0x5A13, "OBJSET_ZPLPROPS";
    DatasetListNext    = 0x5A14, "DATASET_LIST_NEXT";
    SnapshotListNext   = 0x5A15, "SNAPSHOT_LIST_NEXT";
    SetProp            = 0x5A16, "SET_PROP";
    /// Create a filesystem or volume
    Create             = 0x5A17, "CREATE";
    /// Destroy a dataset or snapshot
    Destroy            = 0x5A18, "DESTROY";
    Rollback           = 0x5A19, "ROLLBACK";
    /// Rename a dataset; the new name travels in `zc_value`
    Rename             = 0x5A1A, "RENAME";
    Recv               = 0x5A1B, "RECV";
    Send               = 0x5A1C, "SEND";
    InjectFault        = 0x5A1D, "INJECT_FAULT";
    ClearFault         = 0x5A1E, "CLEAR_FAULT";
    InjectListNext     = 0x5A1F, "INJECT_LIST_NEXT";
    ErrorLog           = 0x5A20, "ERROR_LOG";
    Clear              = 0x5A21, "CLEAR";
    Promote            = 0x5A22, "PROMOTE";
    /// Atomically snapshot a set of datasets
    Snapshot           = 0x5A23, "SNAPSHOT";
    DsobjToDsname      = 0x5A24, "DSOBJ_TO_DSNAME";
    ObjToPath          = 0x5A25, "OBJ_TO_PATH";
    PoolSetProps       = 0x5A26, "POOL_SET_PROPS";
    PoolGetProps       = 0x5A27, "POOL_GET_PROPS";
    SetFsacl           = 0x5A28, "SET_FSACL";
    GetFsacl           = 0x5A29, "GET_FSACL";
    Share              = 0x5A2A, "SHARE";
    InheritProp        = 0x5A2B, "INHERIT_PROP";
    SmbAcl             = 0x5A2C, "SMB_ACL";
    UserspaceOne       = 0x5A2D, "USERSPACE_ONE";
    UserspaceMany      = 0x5A2E, "USERSPACE_MANY";
    UserspaceUpgrade   = 0x5A2F, "USERSPACE_UPGRADE";
    Hold               = 0x5A30, "HOLD";
    Release            = 0x5A31, "RELEASE";
    GetHolds           = 0x5A32, "GET_HOLDS";
    ObjsetRecvdProps   = 0x5A33, "OBJSET_RECVD_PROPS";
    VdevSplit          = 0x5A34, "VDEV_SPLIT";
    NextObj            = 0x5A35, "NEXT_OBJ";
    Diff               = 0x5A36, "DIFF";
    TmpSnapshot        = 0x5A37, "TMP_SNAPSHOT";
    ObjToStats         = 0x5A38, "OBJ_TO_STATS";
    /// Bytes written since a snapshot, returned in `zc_cookie`
    SpaceWritten       = 0x5A39, "SPACE_WRITTEN";
    SpaceSnaps         = 0x5A3A, "SPACE_SNAPS";
    DestroySnaps       = 0x5A3B, "DESTROY_SNAPS";
    PoolReguid         = 0x5A3C, "POOL_REGUID";
    PoolReopen         = 0x5A3D, "POOL_REOPEN";
    SendProgress       = 0x5A3E, "SEND_PROGRESS";
    LogHistory         = 0x5A3F, "LOG_HISTORY";
    /// Write a send stream to the descriptor named in the input list
    SendNew            = 0x5A40, "SEND_NEW";
    /// Estimate the size of a send stream
    SendSpace          = 0x5A41, "SEND_SPACE";
    Clone              = 0x5A42, "CLONE";
    Bookmark           = 0x5A43, "BOOKMARK";
    GetBookmarks       = 0x5A44, "GET_BOOKMARKS";
    DestroyBookmarks   = 0x5A45, "DESTROY_BOOKMARKS";
    RecvNew            = 0x5A46, "RECV_NEW";
    PoolSync           = 0x5A47, "POOL_SYNC";

    // Linux range
    EventsNext         = 0x5A81, "EVENTS_NEXT";
    EventsClear        = 0x5A82, "EVENTS_CLEAR";
    EventsSeek         = 0x5A83, "EVENTS_SEEK";
}

impl fmt::Display for Ioc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZFS_IOC_{}", self.name())
    }
}
