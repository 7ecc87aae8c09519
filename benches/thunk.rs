//! Benchmarks for the hot paths of a syscall: struct conversion, flag
//! translation and C string probing.

extern crate guestabi;

use criterion::{criterion_group, criterion_main, Criterion};
use guestabi::{
    abi::{linux, DataModel, Endian},
    config::MemoryConfig,
    memory::{GuestAddr, GuestMemory},
    thunk::{translate_bitmask, BitmaskDirection, Direction, StructRegistry, StructThunk},
};
use std::hint::black_box;

/// Benchmark converting a guest `struct flock` to the x86_64 layout and back.
fn bench_flock_round_trip(c: &mut Criterion) {
    let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 16);
    let ids = linux::register(&mut registry).unwrap();
    let thunk = StructThunk::new(&registry);
    let guest = [0x11u8; 36];

    c.bench_function("thunk_flock_round_trip", |b| {
        b.iter(|| {
            let host = thunk
                .convert(ids.flock, Direction::ToHost, black_box(&guest))
                .unwrap();
            black_box(thunk.convert(ids.flock, Direction::ToTarget, &host).unwrap())
        });
    });
}

/// Benchmark converting into a caller-provided buffer.
fn bench_timespec_into(c: &mut Criterion) {
    let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 16);
    let ids = linux::register(&mut registry).unwrap();
    let thunk = StructThunk::new(&registry);
    let guest = [0, 0, 0, 1, 0, 0, 0, 2];
    let mut host = [0u8; 16];

    c.bench_function("thunk_timespec_into", |b| {
        b.iter(|| {
            thunk
                .convert_into(ids.timespec, Direction::ToHost, black_box(&guest), &mut host)
                .unwrap();
            black_box(host)
        });
    });
}

/// Benchmark translating a typical `open(2)` flag word.
fn bench_open_flags(c: &mut Criterion) {
    c.bench_function("bitmask_open_flags", |b| {
        b.iter(|| {
            black_box(translate_bitmask(
                linux::OPEN_FLAGS,
                black_box(0x8_0301),
                BitmaskDirection::Forward,
            ))
        });
    });
}

/// Benchmark probing short and page-crossing strings.
fn bench_probe_length(c: &mut Criterion) {
    let mut memory = GuestMemory::new(&MemoryConfig::new(0x10_0000), Endian::Big).unwrap();
    memory
        .copy_to_guest(GuestAddr::new(0x1000), b"/usr/lib/libc.so.6\0")
        .unwrap();
    memory
        .copy_to_guest(GuestAddr::new(0x8000), &[b'a'; 0x3000])
        .unwrap();

    c.bench_function("probe_length_short", |b| {
        b.iter(|| black_box(memory.probe_length(black_box(GuestAddr::new(0x1000))).unwrap()));
    });
    c.bench_function("probe_length_12k", |b| {
        b.iter(|| black_box(memory.probe_length(black_box(GuestAddr::new(0x8000))).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_flock_round_trip,
    bench_timespec_into,
    bench_open_flags,
    bench_probe_length
);
criterion_main!(benches);
