mod common;

use std::io::Read;
use std::os::fd::BorrowedFd;

use common::{MockKernel, init_logger, input};
use libnvlist::Value;
use libzfs::{Ioc, SendOptions, StreamEnd, ZfsError};
use nix::errno::Errno;

/// A kernel that writes `data` to the send descriptor, then returns
/// `result`.
fn sender(data: Vec<u8>, result: Option<Errno>) -> MockKernel {
    MockKernel::new(move |ioc, _, bufs| {
        assert_eq!(ioc, Ioc::SendNew);
        let fd = match input(bufs).get("fd") {
            Some(Value::Int32(fd)) => *fd,
            other => panic!("no fd in input: {other:?}"),
        };
        // SAFETY: the stream worker owns the write end until we return.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut off = 0;
        while off < data.len() {
            off += nix::unistd::write(fd, &data[off..])?;
        }
        match result {
            Some(errno) => Err(errno.into()),
            None => Ok(()),
        }
    })
}

#[test]
fn stream_delivers_bytes_in_order() {
    init_logger();
    let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let kernel = sender(data.clone(), None);
    let mut stream = kernel.zfs().send("tank/a@snap", SendOptions::default()).unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert!(stream.termination().is_some_and(StreamEnd::is_completed));
    assert_eq!(kernel.calls(), 1);
}

#[test]
fn options_reach_kernel_with_pipe_fd() {
    let kernel = sender(b"stream".to_vec(), None);
    let options = SendOptions {
        fd: 99,
        from: "tank/a@base".into(),
        large_blocks: true,
        ..Default::default()
    };
    let mut stream = kernel.zfs().send("tank/a@snap", options).unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    assert_eq!(out, "stream");

    let seen = kernel.last();
    assert_eq!(seen.name, "tank/a@snap");
    let src = seen.input.unwrap();
    assert_ne!(src.get("fd"), Some(&Value::Int32(99)));
    assert_eq!(src.get_str("fromsnap"), Some("tank/a@base"));
    assert_eq!(src.get("largeblockok"), Some(&Value::BooleanValue(true)));
}

#[test]
fn early_failure_returns_no_stream() {
    init_logger();
    let kernel = sender(Vec::new(), Some(Errno::ENOENT));
    let err = kernel
        .zfs()
        .send("tank/a@missing", SendOptions::default())
        .unwrap_err();
    assert!(matches!(err, ZfsError::Kernel(k) if k.is_not_found()));
}

#[test]
fn late_failure_surfaces_at_end() {
    let kernel = sender(vec![1u8; 10_000], Some(Errno::EIO));
    let mut stream = kernel.zfs().send("tank/a@snap", SendOptions::default()).unwrap();
    let mut out = Vec::new();
    let err = stream.read_to_end(&mut out).unwrap_err();
    assert_eq!(out.len(), 10_000);
    assert!(err.to_string().contains("send stream terminated"));
    assert!(matches!(stream.termination(), Some(StreamEnd::Failed(_))));
}

#[test]
fn closing_early_cancels_the_command() {
    init_logger();
    let kernel = sender(vec![0u8; 8 << 20], None);
    let mut stream = kernel.zfs().send("tank/a@snap", SendOptions::default()).unwrap();
    let mut buf = vec![0u8; 1024];
    stream.read_exact(&mut buf).unwrap();
    assert!(matches!(stream.close().wait(), StreamEnd::Cancelled));
}

#[test]
fn empty_stream_is_finished_immediately() {
    let kernel = sender(Vec::new(), None);
    let mut stream = kernel.zfs().send("tank/a@snap", SendOptions::default()).unwrap();
    assert!(stream.termination().is_some_and(StreamEnd::is_completed));
    let mut out = Vec::new();
    assert_eq!(stream.read_to_end(&mut out).unwrap(), 0);
}
