//! Dataset and snapshot operations.

use std::collections::BTreeMap;

use libnvlist::{NvList, Value};
use tracing::{debug, info, instrument};

use crate::cmd::ZfsCmd;
use crate::error::ZfsError;
use crate::ioc::Ioc;
use crate::transport::{Request, Zfs};
use crate::types::{CreateRequest, DatasetProps, ObjectType, ObjsetInfo, SnapshotRequest};

/// Per-name error codes some commands return next to their own result.
type ErrorMap = BTreeMap<String, i32>;

fn log_partial_failures(errors: &ErrorMap) {
    for (name, code) in errors {
        debug!(name, code, "partial failure reported by kernel");
    }
}

impl Zfs {
    /// Create a filesystem or volume.
    #[instrument(skip(self, props))]
    pub fn create(
        &self,
        name: &str,
        object_type: ObjectType,
        props: Option<&DatasetProps>,
    ) -> Result<(), ZfsError> {
        let input = CreateRequest {
            object_type,
            props: props.cloned(),
        };
        let req = Request::new(Ioc::Create, name).with_record(&input)?;
        let errors: ErrorMap = self.invoke(&req, &mut ZfsCmd::new())?;
        log_partial_failures(&errors);
        info!(dataset = name, %object_type, "dataset created");
        Ok(())
    }

    /// Destroy a dataset or snapshot. With `deferred`, a snapshot that is
    /// still held or cloned is marked for destruction instead of failing.
    #[instrument(skip(self))]
    pub fn destroy(&self, name: &str, object_type: ObjectType, deferred: bool) -> Result<(), ZfsError> {
        let mut cmd = ZfsCmd::new();
        cmd.objset_type = u64::from(object_type.as_raw().unsigned_abs());
        cmd.defer_destroy = u32::from(deferred);
        self.execute(&Request::new(Ioc::Destroy, name), &mut cmd)?;
        info!(dataset = name, "dataset destroyed");
        Ok(())
    }

    /// Rename `old` to `new`; `recursive` renames snapshots of descendants.
    #[instrument(skip(self))]
    pub fn rename(&self, old: &str, new: &str, recursive: bool) -> Result<(), ZfsError> {
        let mut cmd = ZfsCmd::new();
        cmd.set_value(new)?;
        cmd.cookie = u64::from(recursive);
        self.execute(&Request::new(Ioc::Rename, old), &mut cmd)
    }

    /// Take snapshots `names` (full `pool/fs@snap` names) of datasets in
    /// `pool`, atomically.
    #[instrument(skip(self, names, props), fields(count = names.len()))]
    pub fn snapshot(
        &self,
        names: &[&str],
        pool: &str,
        props: Option<&DatasetProps>,
    ) -> Result<(), ZfsError> {
        let mut snaps = NvList::new();
        for name in names {
            if snaps.insert(*name, Value::BooleanValue(true)).is_some() {
                return Err(ZfsError::invalid(format!("duplicate snapshot name {name}")));
            }
        }
        let input = SnapshotRequest {
            snaps,
            props: props.cloned(),
        };
        let req = Request::new(Ioc::Snapshot, pool).with_record(&input)?;
        let errors: ErrorMap = self.invoke(&req, &mut ZfsCmd::new())?;
        log_partial_failures(&errors);
        Ok(())
    }

    /// Bytes written to `dataset` since `snapshot`.
    #[instrument(skip(self))]
    pub fn space_written(&self, dataset: &str, snapshot: &str) -> Result<u64, ZfsError> {
        let mut cmd = ZfsCmd::new();
        cmd.set_value(snapshot)?;
        self.execute(&Request::new(Ioc::SpaceWritten, dataset), &mut cmd)?;
        Ok(cmd.cookie)
    }

    /// Statistics and properties of a dataset.
    pub fn objset_stats(&self, name: &str) -> Result<ObjsetInfo, ZfsError> {
        let mut cmd = ZfsCmd::new();
        let props: NvList = self.invoke(&Request::new(Ioc::ObjsetStats, name), &mut cmd)?;
        Ok(ObjsetInfo {
            stats: cmd.objset_stats,
            props,
        })
    }

    /// The ZPL (filesystem layer) properties of a dataset.
    pub fn objset_zpl_props(&self, name: &str) -> Result<NvList, ZfsError> {
        self.invoke(&Request::new(Ioc::ObjsetZplprops, name), &mut ZfsCmd::new())
    }
}
