//! Pool-level operations.

use libnvlist::{NvList, Record, Value};
use tracing::{info, instrument};

use crate::cmd::ZfsCmd;
use crate::error::ZfsError;
use crate::ioc::Ioc;
use crate::transport::{Request, Zfs};
use crate::types::{PoolProps, VDev};

impl Zfs {
    /// Create pool `name` over the vdev tree `config`.
    #[instrument(skip(self, props, config))]
    pub fn pool_create(&self, name: &str, props: &PoolProps, config: &VDev) -> Result<(), ZfsError> {
        let req = Request::new(Ioc::PoolCreate, name)
            .with_record(props)?
            .with_config(config.to_nvlist()?);
        self.execute(&req, &mut ZfsCmd::new())?;
        info!(pool = name, "pool created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn pool_destroy(&self, name: &str) -> Result<(), ZfsError> {
        self.execute(&Request::new(Ioc::PoolDestroy, name), &mut ZfsCmd::new())?;
        info!(pool = name, "pool destroyed");
        Ok(())
    }

    /// All properties of pool `name`.
    ///
    /// Each entry is a nested list with `value` and `source`; see
    /// [`pool_props`] for a typed view.
    pub fn pool_get_props(&self, name: &str) -> Result<NvList, ZfsError> {
        self.invoke(&Request::new(Ioc::PoolGetProps, name), &mut ZfsCmd::new())
    }
}

/// Replace every `{value, source}` entry by its `value`.
///
/// Property queries wrap values with their source; typed records expect
/// the bare values. Entries of any other shape are kept as they are.
pub fn flatten_props(props: NvList) -> NvList {
    props
        .into_iter()
        .map(|(key, value)| match value {
            Value::NvList(mut inner) => match inner.remove("value") {
                Some(v) => (key, v),
                None => (key, Value::NvList(inner)),
            },
            other => (key, other),
        })
        .collect()
}

/// Decode a property query result into [`PoolProps`].
///
/// Properties the record does not know are kept in `user` when they are
/// strings and dropped otherwise.
pub fn pool_props(props: NvList) -> Result<PoolProps, ZfsError> {
    let schema = PoolProps::schema();
    let known = |key: &str| schema.iter().any(|d| !d.is_extra() && d.key() == key);
    let list: NvList = flatten_props(props)
        .into_iter()
        .filter(|(key, value)| known(key.as_str()) || matches!(value, Value::String(_)))
        .collect();
    Ok(PoolProps::from_nvlist(list)?)
}
