mod common;

use common::{MockKernel, init_logger, input, reply};
use libnvlist::{NvList, Value};
use libzfs::{
    DatasetProps, FailMode, Ioc, ObjectType, PoolProps, SendSpaceOptions, VDev, ZfsError,
};
use nix::errno::Errno;

#[test]
fn pool_create_sends_props_and_vdev_tree() {
    init_logger();
    let kernel = MockKernel::ok();
    let props = PoolProps {
        ashift: 12,
        failmode: FailMode::Panic,
        ..Default::default()
    };
    let tree = VDev::root(vec![VDev::leaf("file", "/var/tmp/disk0")]);
    kernel.zfs().pool_create("tank", &props, &tree).unwrap();

    let seen = kernel.last();
    assert_eq!(seen.ioc, Ioc::PoolCreate);
    assert_eq!(seen.name, "tank");
    let src = seen.input.unwrap();
    assert_eq!(src.get_u64("ashift"), Some(12));
    assert_eq!(src.get_u64("failmode"), Some(2));
    let conf = seen.config.unwrap();
    assert_eq!(conf.get_str("type"), Some("root"));
    assert!(matches!(conf.get("children"), Some(Value::NvListArray(c)) if c.len() == 1));
    assert_eq!(seen.dst_size, 0);
}

#[test]
fn create_wraps_type_and_props() {
    let kernel = MockKernel::replying(NvList::new());
    let props = DatasetProps {
        name: "tank/home".into(),
    };
    kernel
        .zfs()
        .create("tank/home", ObjectType::Zfs, Some(&props))
        .unwrap();

    let src = kernel.last().input.unwrap();
    assert_eq!(src.keys().collect::<Vec<_>>(), vec!["type", "props"]);
    assert_eq!(src.get("type"), Some(&Value::Int32(2)));
    assert_eq!(
        src.get_list("props").and_then(|p| p.get_str("name")),
        Some("tank/home")
    );
}

#[test]
fn create_without_props_sends_empty_list() {
    let kernel = MockKernel::ok();
    kernel.zfs().create("tank/vol", ObjectType::Zvol, None).unwrap();
    let src = kernel.last().input.unwrap();
    assert_eq!(src.get("props"), Some(&Value::NvList(NvList::new())));
}

#[test]
fn create_partial_failures_are_not_errors() {
    let mut errors = NvList::new();
    errors.insert("tank/home", Value::Int32(Errno::EEXIST as i32));
    let kernel = MockKernel::replying(errors);
    kernel.zfs().create("tank/home", ObjectType::Zfs, None).unwrap();
}

#[test]
fn destroy_sets_type_and_defer() {
    let kernel = MockKernel::ok();
    kernel
        .zfs()
        .destroy("tank/home@old", ObjectType::Zfs, true)
        .unwrap();
    let seen = kernel.last();
    assert_eq!(seen.ioc, Ioc::Destroy);
    assert_eq!(seen.objset_type, 2);
    assert_eq!(seen.defer_destroy, 1);
    assert!(seen.input.is_none());
}

#[test]
fn rename_uses_value_and_cookie() {
    let kernel = MockKernel::ok();
    let zfs = kernel.zfs();
    zfs.rename("tank/a", "tank/b", true).unwrap();
    let seen = kernel.last();
    assert_eq!((seen.name.as_str(), seen.value.as_str(), seen.cookie), ("tank/a", "tank/b", 1));

    zfs.rename("tank/b", "tank/c", false).unwrap();
    assert_eq!(kernel.last().cookie, 0);
}

#[test]
fn snapshot_builds_name_set() {
    let kernel = MockKernel::replying(NvList::new());
    kernel
        .zfs()
        .snapshot(&["tank/a@now", "tank/b@now"], "tank", None)
        .unwrap();

    let seen = kernel.last();
    assert_eq!(seen.ioc, Ioc::Snapshot);
    assert_eq!(seen.name, "tank");
    let snaps = seen.input.unwrap().get_list("snaps").cloned().unwrap();
    assert_eq!(snaps.keys().collect::<Vec<_>>(), vec!["tank/a@now", "tank/b@now"]);
    assert!(snaps.iter().all(|(_, v)| *v == Value::BooleanValue(true)));
}

#[test]
fn snapshot_rejects_duplicates_before_the_call() {
    let kernel = MockKernel::ok();
    let err = kernel
        .zfs()
        .snapshot(&["tank/a@x", "tank/a@x"], "tank", None)
        .unwrap_err();
    assert!(matches!(err, ZfsError::InvalidArgument(_)));
    assert_eq!(kernel.calls(), 0);
}

#[test]
fn space_written_reads_cookie() {
    let kernel = MockKernel::new(|_, cmd, _| {
        assert_eq!(cmd.value(), "tank/a@monday");
        cmd.cookie = 123_456;
        Ok(())
    });
    let written = kernel.zfs().space_written("tank/a", "tank/a@monday").unwrap();
    assert_eq!(written, 123_456);
}

#[test]
fn send_space_passes_options() {
    let kernel = MockKernel::new(|_, cmd, bufs| {
        let opts = input(bufs);
        assert_eq!(opts.get_str("from"), Some("tank/a@one"));
        assert_eq!(opts.get("compress"), Some(&Value::BooleanValue(true)));
        let mut out = NvList::new();
        out.insert("space", Value::Uint64(4 << 20));
        reply(cmd, bufs, &out)
    });
    let options = SendSpaceOptions {
        from: "tank/a@one".into(),
        compress: true,
        ..Default::default()
    };
    assert_eq!(kernel.zfs().send_space("tank/a@two", &options).unwrap(), 4 << 20);
}

#[test]
fn objset_stats_combines_list_and_fixed_stats() {
    let kernel = MockKernel::new(|_, cmd, bufs| {
        cmd.objset_stats.objset_type = 2;
        cmd.objset_stats.creation_txg = 42;
        cmd.objset_stats.origin[..8].copy_from_slice(b"tank@src");
        let mut used = NvList::new();
        used.insert("value", Value::Uint64(8192));
        used.insert("source", Value::String("tank/a".into()));
        let mut props = NvList::new();
        props.insert("used", Value::NvList(used));
        reply(cmd, bufs, &props)
    });
    let info = kernel.zfs().objset_stats("tank/a").unwrap();
    assert_eq!(info.object_type(), ObjectType::Zfs);
    assert_eq!(info.stats.creation_txg, 42);
    assert_eq!(info.stats.origin(), "tank@src");
    assert_eq!(info.prop_u64("used"), Some(8192));
}

#[test]
fn zpl_props_are_dynamic() {
    let mut props = NvList::new();
    props.insert("version", Value::Uint64(5));
    props.insert("casesensitivity", Value::Uint64(0));
    let kernel = MockKernel::replying(props.clone());
    assert_eq!(kernel.zfs().objset_zpl_props("tank/a").unwrap(), props);
    assert_eq!(kernel.last().ioc, Ioc::ObjsetZplprops);
}

#[test]
fn missing_dataset_is_not_found() {
    let kernel = MockKernel::failing(Errno::ENOENT);
    let err = kernel.zfs().objset_stats("tank/nope").unwrap_err();
    assert!(err.kernel().is_some_and(|k| k.is_not_found()));
}
