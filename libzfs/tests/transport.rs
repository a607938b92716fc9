mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{MockKernel, init_logger, reply};
use libnvlist::{NvList, Value};
use libzfs::{Ioc, Request, ZfsCmd, ZfsError};
use nix::errno::Errno;

fn big_list(entries: usize) -> NvList {
    (0..entries)
        .map(|i| (format!("property-{i:04}"), Value::Uint64(i as u64)))
        .collect()
}

#[test]
fn value_name_at_capacity_is_accepted() {
    init_logger();
    let kernel = MockKernel::ok();
    let zfs = kernel.zfs();
    let target = "t".repeat(8191);
    zfs.rename("tank/a", &target, false).unwrap();
    assert_eq!(kernel.calls(), 1);
    assert_eq!(kernel.last().value.len(), 8191);
}

#[test]
fn value_name_over_capacity_never_reaches_kernel() {
    init_logger();
    let kernel = MockKernel::ok();
    let zfs = kernel.zfs();
    let err = zfs.rename("tank/a", &"t".repeat(8192), false).unwrap_err();
    assert!(matches!(err, ZfsError::NameTooLong { len: 8192, max: 8191, .. }));
    let err = zfs.space_written("tank/a", &"s".repeat(9000)).unwrap_err();
    assert!(matches!(err, ZfsError::NameTooLong { .. }));
    assert_eq!(kernel.calls(), 0);
}

#[test]
fn target_name_over_capacity_never_reaches_kernel() {
    let kernel = MockKernel::ok();
    let err = kernel.zfs().pool_destroy(&"p".repeat(4096)).unwrap_err();
    assert!(matches!(err, ZfsError::NameTooLong { field: "zc_name", .. }));
    assert_eq!(kernel.calls(), 0);
}

#[test]
fn output_grows_until_it_fits() {
    init_logger();
    // Needs more than four times the initial 256 bytes.
    let list = big_list(40);
    let kernel = MockKernel::replying(list.clone());
    let props = kernel.zfs().pool_get_props("tank").unwrap();
    assert_eq!(props, list);

    let sizes: Vec<usize> = kernel.seen().iter().map(|s| s.dst_size).collect();
    assert_eq!(sizes[0], 256);
    assert!(sizes.len() >= 2);
    assert!(sizes.windows(2).all(|w| w[1] > w[0]));
    assert!(kernel.seen().iter().all(|s| s.input.is_none()));
}

#[test]
fn retries_resend_identical_input() {
    init_logger();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let kernel = MockKernel::new(move |_, cmd, bufs| match counter.fetch_add(1, Ordering::SeqCst) {
        0 => {
            cmd.nvlist_dst_size = 600;
            Err(Errno::ENOMEM.into())
        }
        1 => Err(Errno::ENOMEM.into()),
        _ => reply(cmd, bufs, &NvList::new()),
    });
    kernel
        .zfs()
        .snapshot(&["tank/a@now", "tank/b@now"], "tank", None)
        .unwrap();

    let seen = kernel.seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen.iter().map(|s| s.dst_size).collect::<Vec<_>>(),
        vec![256, 600, 1200]
    );
    let first = seen[0].src.clone().expect("snapshot sends input");
    assert!(seen.iter().all(|s| s.src.as_ref() == Some(&first)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn two_enomem_rounds_double_twice() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mut out = NvList::new();
    out.insert("space", Value::Uint64(1 << 20));
    let kernel = MockKernel::new(move |_, cmd, bufs| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            // No size hint: the transport doubles.
            return Err(Errno::ENOMEM.into());
        }
        reply(cmd, bufs, &out)
    });
    let space = kernel
        .zfs()
        .send_space("tank@a", &Default::default())
        .unwrap();
    assert_eq!(space, 1 << 20);
    let sizes: Vec<usize> = kernel.seen().iter().map(|s| s.dst_size).collect();
    assert_eq!(sizes, vec![256, 512, 1024]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn output_beyond_ceiling_fails() {
    let kernel = MockKernel::replying(big_list(400));
    let err = kernel.zfs().pool_get_props("tank").unwrap_err();
    match err {
        ZfsError::OutputTooLarge { needed, max } => {
            assert_eq!(max, 4096);
            assert!(needed > max);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn kernel_error_keeps_code() {
    let kernel = MockKernel::failing(Errno::EBUSY);
    let err = kernel.zfs().pool_destroy("tank").unwrap_err();
    let k = err.kernel().copied().unwrap();
    assert!(k.is_busy());
    assert_eq!(k.code, Errno::EBUSY as i32);
    assert_eq!(kernel.calls(), 1);
}

#[test]
fn enomem_without_output_is_a_kernel_error() {
    let kernel = MockKernel::failing(Errno::ENOMEM);
    let err = kernel.zfs().pool_destroy("tank").unwrap_err();
    assert!(err.kernel().is_some_and(|k| k.is_resource_exhausted()));
    assert_eq!(kernel.calls(), 1);
}

#[test]
fn output_shape_mismatch_is_decode_error() {
    let mut out = NvList::new();
    out.insert("space", Value::Int64(5));
    let kernel = MockKernel::replying(out);
    let err = kernel.zfs().send_space("tank@a", &Default::default()).unwrap_err();
    assert!(matches!(err, ZfsError::Decode(_)));
}

#[test]
fn handle_is_shared_across_threads() {
    let kernel = MockKernel::ok();
    let zfs = kernel.zfs();
    std::thread::scope(|s| {
        for i in 0..8 {
            let zfs = zfs.clone();
            s.spawn(move || {
                let mut cmd = ZfsCmd::new();
                zfs.execute(&Request::new(Ioc::PoolSync, &format!("pool{i}")), &mut cmd)
                    .unwrap();
            });
        }
    });
    assert_eq!(kernel.calls(), 8);
}
