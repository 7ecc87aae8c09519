use thiserror::Error;

use crate::thunk::{StructId, TypeTag};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Host error numbers used when surfacing failures to a guest.
///
/// These are the Linux `asm-generic` values. Translating them into the
/// guest's own numbering is the job of the syscall marshaling layer.
pub mod errno {
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// Bad address.
    pub const EFAULT: i32 = 14;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Function not implemented.
    pub const ENOSYS: i32 = 38;
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Memory faults caused by guest arguments are ordinary values of this type and
/// never abort the process. The marshaling layer is expected to turn them into the
/// guest's error convention, typically through [`Error::errno`].
///
/// # Error Categories
///
/// ## Guest memory
/// - [`Error::InvalidAddress`] - Address outside the configured window
/// - [`Error::InvalidLength`] - Length overflows the address width or the window
/// - [`Error::Fault`] - Access denied, or a probe ran off the window
///
/// ## Struct thunking
/// - [`Error::CapacityExceeded`] - Registry full at registration time
/// - [`Error::UnknownStruct`] - Conversion requested for an unregistered id
/// - [`Error::UnsupportedType`] - A field tag has no conversion handler
/// - [`Error::Malformed`] - A descriptor or table failed validation
///
/// ## Host side
/// - [`Error::OutOfBounds`] - A byte buffer was too short for a read or write
/// - [`Error::Io`] - The host mapping primitive failed
///
/// # Examples
///
/// ```rust
/// use guestabi::{Error, memory::{AddressWindow, GuestAddr}};
///
/// let window = AddressWindow::new(0x1000_0000, 0x10000)?;
/// match window.translate(GuestAddr::new(0x20000)) {
///     Err(Error::InvalidAddress { address }) => assert_eq!(address, 0x20000),
///     other => panic!("unexpected {other:?}"),
/// }
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A guest address lies outside the address window.
    ///
    /// Raised by translation when the address is null, at or beyond the window
    /// size, or at or above the reserved ceiling.
    #[error("Guest address {address:#x} is outside the address window")]
    InvalidAddress {
        /// The rejected guest address
        address: u64,
    },

    /// A length overflows the address width or reaches past the window.
    #[error("Invalid length {length:#x} at guest address {address:#x}")]
    InvalidLength {
        /// Start of the rejected range
        address: u64,
        /// Length of the rejected range
        length: u64,
    },

    /// Guest memory access was denied or ran past the valid window.
    ///
    /// This is the error a guest sees as `EFAULT`.
    #[error("Guest memory fault at {address:#x} ({length} bytes)")]
    Fault {
        /// Start of the faulting range
        address: u64,
        /// Length of the faulting range
        length: u64,
    },

    /// The struct registry is full.
    ///
    /// Registration happens before guest code runs, so callers treat this as
    /// fatal at startup.
    #[error("Struct registry is full ({capacity} entries)")]
    CapacityExceeded {
        /// The configured registry capacity
        capacity: usize,
    },

    /// A conversion named a struct id that was never registered.
    #[error("Unknown struct - {0}")]
    UnknownStruct(StructId),

    /// A field tag has neither a generic nor a custom handler.
    #[error("No conversion handler for {0:?} fields")]
    UnsupportedType(TypeTag),

    /// A descriptor, layout or table is inconsistent.
    ///
    /// The error includes the source location where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted on a host byte buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The host mapping primitive failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the host error number this error surfaces as.
    ///
    /// | Error | errno |
    /// |-------|-------|
    /// | `InvalidAddress`, `Fault`, `OutOfBounds` | `EFAULT` |
    /// | `InvalidLength`, `Malformed` | `EINVAL` |
    /// | `UnknownStruct`, `UnsupportedType` | `ENOSYS` |
    /// | `CapacityExceeded`, `Io` | `ENOMEM` |
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidAddress { .. } | Error::Fault { .. } | Error::OutOfBounds => {
                errno::EFAULT
            }
            Error::InvalidLength { .. } | Error::Malformed { .. } => errno::EINVAL,
            Error::UnknownStruct(_) | Error::UnsupportedType(_) => errno::ENOSYS,
            Error::CapacityExceeded { .. } | Error::Io(_) => errno::ENOMEM,
        }
    }

    /// Returns `true` for errors caused by a bad guest address or range.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress { .. } | Error::InvalidLength { .. } | Error::Fault { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(
            Error::Fault {
                address: 0x1000,
                length: 4
            }
            .errno(),
            errno::EFAULT
        );
        assert_eq!(Error::InvalidAddress { address: 0 }.errno(), errno::EFAULT);
        assert_eq!(malformed_error!("bad").errno(), errno::EINVAL);
        assert_eq!(Error::UnknownStruct(StructId(7)).errno(), errno::ENOSYS);
        assert_eq!(
            Error::CapacityExceeded { capacity: 2 }.errno(),
            errno::ENOMEM
        );
    }

    #[test]
    fn malformed_carries_location() {
        let err = malformed_error!("field {} overflows", 3);
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "field 3 overflows");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fault_classification() {
        assert!(Error::InvalidLength {
            address: 0,
            length: 1
        }
        .is_fault());
        assert!(!Error::OutOfBounds.is_fault());
        assert!(!Error::UnsupportedType(TypeTag::Other).is_fault());
    }
}
