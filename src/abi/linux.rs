//! Linux struct descriptors and flag tables for a MIPS O32 guest.
//!
//! [`register`] adds the descriptors of the structs that common system calls
//! take by pointer. The flag tables translate from the MIPS encoding (source)
//! to the x86_64 encoding (target), which is also the generic Linux encoding.
//!
//! | Struct | Layout |
//! |--------|--------|
//! | `timeval`, `timespec` | natural, two `long`s |
//! | `iovec` | natural, pointer and `unsigned long` |
//! | `winsize` | natural, four `Short`s; there is no unsigned 16-bit tag and only the width matters |
//! | `flock` | MIPS kernel layout with `l_sysid` and four words of padding |
//! | `sockaddr_in` | custom converters, port and address stay in network order |

use crate::{
    abi::read_uint,
    memory::{AccessMode, AccessValidator, GuestAddr, GuestMemory},
    thunk::{
        BitmaskEntry, Direction, Side, StructDescriptor, StructId, StructLayout, StructRegistry,
        StructThunk, TypeDescriptor,
    },
    Error, Result,
};

/// Maximum number of entries in an `iovec` array.
pub const IOV_MAX: usize = 1024;

/// `open(2)` flags, MIPS to x86_64.
pub const OPEN_FLAGS: &[BitmaskEntry] = &[
    // O_ACCMODE
    BitmaskEntry::field(0x3, 0x0, 0x3, 0x0),
    BitmaskEntry::field(0x3, 0x1, 0x3, 0x1),
    BitmaskEntry::field(0x3, 0x2, 0x3, 0x2),
    // O_CREAT, O_EXCL, O_NOCTTY, O_TRUNC
    BitmaskEntry::flag(0x100, 0x40),
    BitmaskEntry::flag(0x400, 0x80),
    BitmaskEntry::flag(0x800, 0x100),
    BitmaskEntry::flag(0x200, 0x200),
    // O_APPEND, O_NONBLOCK
    BitmaskEntry::flag(0x8, 0x400),
    BitmaskEntry::flag(0x80, 0x800),
    // O_DSYNC alone, then O_SYNC which includes it
    BitmaskEntry::field(0x4010, 0x0010, 0x10_1000, 0x1000),
    BitmaskEntry::field(0x4010, 0x4010, 0x10_1000, 0x10_1000),
    // FASYNC, O_LARGEFILE, O_DIRECT
    BitmaskEntry::flag(0x1000, 0x2000),
    BitmaskEntry::flag(0x2000, 0x8000),
    BitmaskEntry::flag(0x8000, 0x4000),
    // O_DIRECTORY, O_NOFOLLOW, O_NOATIME, O_CLOEXEC, O_PATH
    BitmaskEntry::flag(0x1_0000, 0x1_0000),
    BitmaskEntry::flag(0x2_0000, 0x2_0000),
    BitmaskEntry::flag(0x4_0000, 0x4_0000),
    BitmaskEntry::flag(0x8_0000, 0x8_0000),
    BitmaskEntry::flag(0x20_0000, 0x20_0000),
];

/// `mmap(2)` protections. Identical on both sides.
pub const MMAP_PROT: &[BitmaskEntry] = &[
    BitmaskEntry::bit(0, 0),
    BitmaskEntry::bit(1, 1),
    BitmaskEntry::bit(2, 2),
    // PROT_GROWSDOWN, PROT_GROWSUP
    BitmaskEntry::bit(24, 24),
    BitmaskEntry::bit(25, 25),
];

/// `mmap(2)` flags, MIPS to x86_64.
pub const MMAP_FLAGS: &[BitmaskEntry] = &[
    // MAP_TYPE: shared, private
    BitmaskEntry::field(0xF, 0x1, 0xF, 0x1),
    BitmaskEntry::field(0xF, 0x2, 0xF, 0x2),
    // MAP_FIXED, MAP_ANONYMOUS, MAP_NORESERVE
    BitmaskEntry::flag(0x10, 0x10),
    BitmaskEntry::flag(0x800, 0x20),
    BitmaskEntry::flag(0x400, 0x4000),
    // MAP_GROWSDOWN, MAP_DENYWRITE, MAP_EXECUTABLE, MAP_LOCKED
    BitmaskEntry::flag(0x1000, 0x100),
    BitmaskEntry::flag(0x2000, 0x800),
    BitmaskEntry::flag(0x4000, 0x1000),
    BitmaskEntry::flag(0x8000, 0x2000),
    // MAP_POPULATE, MAP_NONBLOCK, MAP_STACK, MAP_HUGETLB
    BitmaskEntry::flag(0x1_0000, 0x8000),
    BitmaskEntry::flag(0x2_0000, 0x1_0000),
    BitmaskEntry::flag(0x4_0000, 0x2_0000),
    BitmaskEntry::flag(0x8_0000, 0x4_0000),
];

/// Ids of the structs added by [`register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinuxStructs {
    /// `struct timeval`
    pub timeval: StructId,
    /// `struct timespec`
    pub timespec: StructId,
    /// `struct iovec`
    pub iovec: StructId,
    /// `struct winsize`
    pub winsize: StructId,
    /// `struct flock`
    pub flock: StructId,
    /// `struct sockaddr_in`
    pub sockaddr_in: StructId,
}

/// Registers the Linux struct descriptors.
///
/// The registry's target model is expected to be a MIPS O32 model; the host
/// model can be anything.
///
/// # Errors
///
/// Returns [`Error::CapacityExceeded`] if fewer than six slots are free and
/// [`Error::Malformed`] if one of the names is already taken.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::{linux, DataModel};
/// use guestabi::thunk::StructRegistry;
///
/// let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 16);
/// let ids = linux::register(&mut registry)?;
///
/// assert_eq!(registry.get(ids.flock)?.target().size, 36);
/// assert_eq!(registry.get(ids.flock)?.host().size, 32);
/// # Ok::<(), guestabi::Error>(())
/// ```
pub fn register(registry: &mut StructRegistry) -> Result<LinuxStructs> {
    let timeval = StructDescriptor::builder("timeval")
        .fields([TypeDescriptor::Long, TypeDescriptor::Long])
        .build(registry)?;
    let timeval = registry.register(timeval)?;

    let timespec = StructDescriptor::builder("timespec")
        .fields([TypeDescriptor::Long, TypeDescriptor::Long])
        .build(registry)?;
    let timespec = registry.register(timespec)?;

    let iovec = StructDescriptor::builder("iovec")
        .fields([TypeDescriptor::ptr(TypeDescriptor::Char), TypeDescriptor::ULong])
        .build(registry)?;
    let iovec = registry.register(iovec)?;

    let winsize = StructDescriptor::builder("winsize")
        .fields(vec![TypeDescriptor::Short; 4])
        .build(registry)?;
    let winsize = registry.register(winsize)?;

    let flock = flock_descriptor(registry)?;
    let flock = registry.register(flock)?;

    let sockaddr_in = StructDescriptor::builder("sockaddr_in")
        .fields([
            TypeDescriptor::Short,
            TypeDescriptor::Other,
            TypeDescriptor::Other,
            TypeDescriptor::array(TypeDescriptor::Char, 8),
        ])
        .target_layout(StructLayout::new(vec![0, 2, 4, 8], 16, 4))
        .host_layout(StructLayout::new(vec![0, 2, 4, 8], 16, 4))
        .target_converter(sockaddr_in_to_target)
        .host_converter(sockaddr_in_to_host)
        .build(registry)?;
    let sockaddr_in = registry.register(sockaddr_in)?;

    Ok(LinuxStructs {
        timeval,
        timespec,
        iovec,
        winsize,
        flock,
        sockaddr_in,
    })
}

/// `l_type`, `l_whence`, `l_start`, `l_len`, `l_pid`.
///
/// The MIPS kernel puts `long l_sysid` before `l_pid` and pads with four
/// `long`s; neither is part of the shared field list.
fn flock_descriptor(registry: &StructRegistry) -> Result<StructDescriptor> {
    let kernel = registry.natural_layout(
        &[
            TypeDescriptor::Short,
            TypeDescriptor::Short,
            TypeDescriptor::Long,
            TypeDescriptor::Long,
            TypeDescriptor::Long,
            TypeDescriptor::Int,
            TypeDescriptor::array(TypeDescriptor::Long, 4),
        ],
        Side::Target,
    )?;
    let offsets = [0, 1, 2, 3, 5]
        .iter()
        .map(|&index| kernel.field_offsets[index])
        .collect();

    StructDescriptor::builder("flock")
        .fields([
            TypeDescriptor::Short,
            TypeDescriptor::Short,
            TypeDescriptor::Long,
            TypeDescriptor::Long,
            TypeDescriptor::Int,
        ])
        .target_layout(StructLayout::new(offsets, kernel.size, kernel.align))
        .build(registry)
}

fn sockaddr_in_to_host(thunk: &StructThunk<'_>, dst: &mut [u8], src: &[u8]) -> Result<()> {
    convert_sockaddr_in(thunk, Direction::ToHost, dst, src)
}

fn sockaddr_in_to_target(thunk: &StructThunk<'_>, dst: &mut [u8], src: &[u8]) -> Result<()> {
    convert_sockaddr_in(thunk, Direction::ToTarget, dst, src)
}

fn convert_sockaddr_in(
    thunk: &StructThunk<'_>,
    direction: Direction,
    dst: &mut [u8],
    src: &[u8],
) -> Result<()> {
    // sin_family is host order; sin_port, sin_addr and sin_zero are raw bytes.
    thunk.convert_value(&TypeDescriptor::Short, direction, src, 0, dst, 0)?;
    let (Some(to), Some(from)) = (dst.get_mut(2..16), src.get(2..16)) else {
        return Err(Error::OutOfBounds);
    };
    to.copy_from_slice(from);
    Ok(())
}

/// One entry of a guest `iovec` array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuestIoVec {
    /// Start of the buffer in guest memory
    pub base: GuestAddr,
    /// Length of the buffer in bytes
    pub len: u64,
}

/// Reads and validates `count` guest `iovec` entries at `addr`.
///
/// Every buffer is checked for `mode`. A bad first buffer faults; a later bad
/// buffer truncates the vector, so it and all following entries get length
/// zero and the call transfers a short count.
///
/// # Errors
///
/// Returns [`Error::InvalidLength`] if `count` exceeds [`IOV_MAX`] and
/// [`Error::Fault`] if the array or the first buffer is inaccessible.
pub fn read_iovec(
    memory: &GuestMemory,
    registry: &StructRegistry,
    iovec: StructId,
    addr: GuestAddr,
    count: usize,
    mode: AccessMode,
) -> Result<Vec<GuestIoVec>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if count > IOV_MAX {
        return Err(Error::InvalidLength {
            address: addr.value(),
            length: count as u64,
        });
    }

    let layout = registry.get(iovec)?.target();
    let model = registry.target();
    let &[base_offset, len_offset] = layout.field_offsets.as_slice() else {
        return Err(malformed_error!("iovec descriptor must have two fields"));
    };

    let entries = memory.with_read(addr, layout.size * count, |bytes| {
        (0..count)
            .map(|index| -> Result<GuestIoVec> {
                let entry = index * layout.size;
                Ok(GuestIoVec {
                    base: GuestAddr::new(read_uint(
                        bytes,
                        entry + base_offset,
                        model.pointer_size,
                        model.endian,
                    )?),
                    len: read_uint(bytes, entry + len_offset, model.long_size, model.endian)?,
                })
            })
            .collect::<Result<Vec<_>>>()
    })??;

    let mut truncated = false;
    let mut result = Vec::with_capacity(entries.len());
    for (index, mut entry) in entries.into_iter().enumerate() {
        let accessible =
            entry.len == 0 || (!entry.base.is_null() && memory.validate(entry.base, entry.len, mode));
        if !accessible && index == 0 {
            return Err(Error::Fault {
                address: entry.base.value(),
                length: entry.len,
            });
        }
        truncated |= !accessible;
        if truncated {
            entry.len = 0;
        }
        result.push(entry);
    }
    Ok(result)
}
