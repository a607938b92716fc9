//! Request and response shapes for the high-level operations.

use std::collections::HashMap;
use std::fmt;
use std::os::fd::RawFd;

use libnvlist::schema::{FromValue, ToValue, mismatch};
use libnvlist::{DataType, DecodeError, EncodeError, NvList, Value, nvlist_record};
use serde::Serialize;

use crate::cmd::ObjsetStats;
use crate::stream::FdSlot;

/// Defines a closed kernel enum carried as one integer on the wire.
///
/// Unknown wire values are kept verbatim in `Unknown` so a newer kernel
/// never breaks decoding.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $raw:ty => $variant_ty:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, $label:literal; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
            Unknown($raw),
        }

        impl $name {
            pub fn from_raw(v: $raw) -> Self {
                match v {
                    $( $value => Self::$variant, )*
                    other => Self::Unknown(other),
                }
            }

            pub fn as_raw(self) -> $raw {
                match self {
                    $( Self::$variant => $value, )*
                    Self::Unknown(v) => v,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )*
                    Self::Unknown(_) => "unknown",
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Self::Unknown(v) => write!(f, "unknown({v})"),
                    other => f.write_str(other.name()),
                }
            }
        }

        impl ToValue for $name {
            fn to_value(&self) -> Result<Option<Value>, EncodeError> {
                Ok(Some(Value::$variant_ty(self.as_raw())))
            }

            fn is_zero(&self) -> bool {
                self.as_raw() == 0
            }
        }

        impl FromValue for $name {
            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::$variant_ty(v) => Ok(Self::from_raw(v)),
                    other => Err(mismatch(DataType::$variant_ty, &other)),
                }
            }
        }
    };
}

wire_enum! {
    /// `dmu_objset_type_t`.
    pub enum ObjectType: i32 => Int32 {
        #[default]
        None = 0, "none";
        Meta = 1, "meta";
        /// Filesystem
        Zfs = 2, "filesystem";
        Zvol = 3, "volume";
        Other = 4, "other";
        Any = 5, "any";
    }
}

impl ObjectType {
    /// Decode the `u32` stored in `dmu_objset_stats_t`.
    pub fn from_stats(raw: u32) -> Self {
        i32::try_from(raw).map_or(Self::Unknown(i32::MAX), Self::from_raw)
    }
}

wire_enum! {
    /// Pool behavior on catastrophic failure (`failmode`).
    pub enum FailMode: u64 => Uint64 {
        #[default]
        Wait = 0, "wait";
        Continue = 1, "continue";
        Panic = 2, "panic";
    }
}

wire_enum! {
    /// `vdev_state_t`, reported as pool `health`.
    pub enum VdevState: u64 => Uint64 {
        #[default]
        Unspecified = 0, "unknown";
        Closed = 1, "closed";
        Offline = 2, "offline";
        Removed = 3, "removed";
        CantOpen = 4, "cant_open";
        Faulted = 5, "faulted";
        Degraded = 6, "degraded";
        Healthy = 7, "online";
    }
}

nvlist_record! {
    /// Properties of a dataset.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct DatasetProps {
        pub name: String => "name" [omitempty],
    }
}

nvlist_record! {
    /// Properties of a pool.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct PoolProps {
        pub name: String => "name" [omitempty],
        pub version: u64 => "version" [omitempty],
        pub comment: String => "comment" [omitempty],

        pub altroot: String => "altroot" [omitempty],
        pub temporary_name: String => "tname" [omitempty],
        pub bootfs: String => "bootfs" [omitempty],
        pub cachefile: String => "cachefile" [omitempty],
        pub readonly: bool => "readonly" [omitempty],
        pub multihost: bool => "multihost" [omitempty],
        pub failmode: FailMode => "failmode" [omitempty],
        pub dedupditto: u64 => "dedupditto" [omitempty],
        pub ashift: u64 => "ashift" [omitempty],
        pub delegation: bool => "delegation" [omitempty],
        pub autoreplace: bool => "autoreplace" [omitempty],
        pub listsnapshots: bool => "listsnapshots" [omitempty],
        pub autoexpand: bool => "autoexpand" [omitempty],
        pub maxblocksize: u64 => "maxblocksize" [omitempty],
        pub maxdnodesize: u64 => "maxdnodesize" [omitempty],

        /// Properties of the root dataset, only honored at creation.
        pub root_props: Option<DatasetProps> => "root-props-nvl" [omitempty],

        pub size: u64 => "size" [ro],
        pub free: u64 => "free" [ro],
        pub freeing: u64 => "freeing" [ro],
        pub leaked: u64 => "leaked" [ro],
        pub allocated: u64 => "allocated" [ro],
        pub expandsize: u64 => "expandsize" [ro],
        pub fragmentation: u64 => "fragmentation" [ro],
        pub capacity: u64 => "capacity" [ro],
        pub guid: u64 => "guid" [ro],
        pub health: VdevState => "health" [ro],
        pub dedupratio: u64 => "dedupratio" [ro],

        ..
        /// User properties (`module:property`).
        pub user: HashMap<String, String>,
    }
}

nvlist_record! {
    /// A node of the vdev tree.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct VDev {
        pub is_log: u64 => "is_log",
        /// Object number of the dirty time log space map.
        pub dtl: u64 => "DTL" [omitempty],
        pub ashift: u64 => "ashift" [omitempty],
        pub asize: u64 => "asize" [omitempty],
        pub guid: u64 => "guid" [omitempty],
        pub id: u64 => "id" [omitempty],
        pub path: String => "path",
        /// `disk`, `file`, `mirror`, `raidz`, `root`, ...
        pub vdev_type: String => "type",
        pub children: Vec<VDev> => "children" [omitempty],
    }
}

impl VDev {
    /// A leaf vdev backed by a block device or file.
    pub fn leaf(vdev_type: &str, path: &str) -> Self {
        Self {
            path: path.to_owned(),
            vdev_type: vdev_type.to_owned(),
            ..Default::default()
        }
    }

    /// The `root` vdev over `children`.
    pub fn root(children: Vec<VDev>) -> Self {
        Self {
            vdev_type: "root".to_owned(),
            children,
            ..Default::default()
        }
    }
}

nvlist_record! {
    /// A pool configuration as stored in the label and cache file.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct PoolConfig {
        pub vdev_children: u64 => "vdev_children",
        pub vdev_tree: Option<VDev> => "vdev_tree",
        pub errata: u64 => "errata" [omitempty],
        pub hostid: u64 => "hostid" [omitempty],
        pub hostname: String => "hostname" [omitempty],
        pub name: String => "name" [omitempty],
        pub pool_guid: u64 => "pool_guid" [omitempty],
        pub state: u64 => "state" [omitempty],
        pub txg: u64 => "txg" [omitempty],
        pub version: u64 => "version" [omitempty],
    }
}

nvlist_record! {
    /// Options of a send size estimate.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct SendSpaceOptions {
        /// Incremental source snapshot.
        pub from: String => "from" [omitempty],
        pub large_blocks: bool => "largeblockok",
        pub embed: bool => "embedok",
        pub compress: bool => "compress",
    }
}

nvlist_record! {
    /// Options of a send stream.
    ///
    /// `fd` is managed by the stream; whatever the caller puts there is
    /// replaced by the pipe's write end.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct SendOptions {
        pub fd: i32 => "fd",
        pub from: String => "fromsnap" [omitempty],
        pub large_blocks: bool => "largeblockok",
        pub embed: bool => "embedok",
        pub compress: bool => "compress",
        pub resume_object: u64 => "resume_object" [omitempty],
        pub resume_offset: u64 => "resume_offset" [omitempty],
    }
}

impl FdSlot for SendOptions {
    fn set_fd(&mut self, fd: RawFd) {
        self.fd = fd;
    }
}

nvlist_record! {
    pub(crate) struct CreateRequest {
        pub object_type: ObjectType => "type",
        pub props: Option<DatasetProps> => "props",
    }
}

nvlist_record! {
    pub(crate) struct SnapshotRequest {
        pub snaps: NvList => "snaps",
        pub props: Option<DatasetProps> => "props",
    }
}

nvlist_record! {
    #[derive(Default)]
    pub(crate) struct SpaceResponse {
        pub space: u64 => "space",
    }
}

/// Result of an `OBJSET_STATS` query.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjsetInfo {
    /// Fixed statistics returned in the command buffer.
    pub stats: ObjsetStats,
    /// Property list; each entry is a nested list holding `value` and
    /// usually `source`.
    pub props: NvList,
}

impl ObjsetInfo {
    pub fn object_type(&self) -> ObjectType {
        self.stats.object_type()
    }

    /// The `value` of property `name`, when it is a plain integer.
    pub fn prop_u64(&self, name: &str) -> Option<u64> {
        self.props.get_list(name).and_then(|p| p.get_u64("value"))
    }

    /// The `value` of property `name`, when it is a string.
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props.get_list(name).and_then(|p| p.get_str("value"))
    }
}
