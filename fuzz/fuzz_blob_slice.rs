//! Fuzz target for Blob slicing.
//!
//! Run with: cargo +nightly fuzz run fuzz_blob_slice
//!
//! The first four bytes pick signed start/end offsets for two nested slices;
//! the rest is the blob content. Each slice must cover exactly the clamped
//! window of its parent and read back the same bytes.

#![no_main]

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use libfuzzer_sys::fuzz_target;
use webshim_core::Blob;

/// `[clamp(start, 0, len), clamp(end, start, len))`.
fn window(start: i64, end: i64, len: usize) -> std::ops::Range<usize> {
    let len = len as i64;
    let start = start.clamp(0, len);
    let end = end.clamp(start, len);
    start as usize..end as usize
}

/// In-memory reads complete on the first poll.
fn read_now(blob: &Blob) -> Vec<u8> {
    let mut cx = Context::from_waker(Waker::noop());
    match pin!(blob.read()).poll(&mut cx) {
        Poll::Ready(Ok(bytes)) => bytes.to_vec(),
        Poll::Ready(Err(err)) => panic!("in-memory read failed: {err}"),
        Poll::Pending => panic!("in-memory read did not complete"),
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let offset = |b: u8| i64::from(b as i8);
    let content = &data[4..];
    let blob = Blob::from_bytes(content.to_vec(), "application/octet-stream");

    let outer_range = window(offset(data[0]), offset(data[1]), content.len());
    let outer = blob.slice(Some(offset(data[0])), Some(offset(data[1])), None);
    assert_eq!(outer.size(), outer_range.len() as u64);
    assert_eq!(outer.mime_type(), blob.mime_type());
    let expected_outer = &content[outer_range];
    assert_eq!(read_now(&outer), expected_outer);

    let inner_range = window(offset(data[2]), offset(data[3]), expected_outer.len());
    let inner = outer.slice(Some(offset(data[2])), Some(offset(data[3])), Some("text/plain"));
    assert_eq!(inner.size(), inner_range.len() as u64);
    assert_eq!(inner.mime_type(), "text/plain");
    assert_eq!(read_now(&inner), &expected_outer[inner_range]);
});
