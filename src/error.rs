use thiserror::Error;

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

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into three groups, matching the three pipeline stages:
///
/// ## Byte stream errors
/// - [`Error::OutOfBounds`] - Attempted to read or seek beyond the buffer
/// - [`Error::Malformed`] - Structurally invalid input detected by a decoder
/// - [`Error::Empty`] - Empty input provided
///
/// ## Decoding errors
/// - [`Error::Truncated`] - The buffer ended in the middle of an instruction
/// - [`Error::UnknownOpcode`] - No opcode handler recognized the byte sequence
///
/// Both decoding errors are local: the linear scanner replaces them with a one byte
/// `unknown` instruction so that scanning always makes progress.
///
/// ## Control flow discovery errors
/// - [`Error::UnresolvedJump`] - A jump without a statically known target
/// - [`Error::MisalignedTarget`] - A jump into the middle of an already decoded instruction
/// - [`Error::AddressOutOfRange`] - The requested start address is not inside the buffer
/// - [`Error::BlockLimit`] - The configured block limit was exceeded
///
/// These are the only errors that abort [`crate::analysis::build_function`].
///
/// # Examples
///
/// ```rust
/// use x86scope::{analysis::build_function, Error};
///
/// // jmp eax
/// match build_function(&[0xFF, 0xE0], 0x1000) {
///     Err(Error::UnresolvedJump { address, .. }) => assert_eq!(address, 0x1000),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An out of bound access was attempted while reading the buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input is damaged and could not be decoded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The buffer ended before the instruction at `address` was complete.
    #[error("Instruction at 0x{address:08x} is truncated")]
    Truncated {
        /// Address of the first byte of the incomplete instruction
        address: u32,
    },

    /// No opcode handler matched the bytes at `address`.
    #[error("Unknown opcode 0x{opcode:02x} at 0x{address:08x}")]
    UnknownOpcode {
        /// Address of the first byte of the instruction (including prefixes)
        address: u32,
        /// The opcode byte that was not recognized
        opcode: u8,
    },

    /// A control transfer whose target is computed at runtime.
    ///
    /// Block discovery cannot follow such an edge, so by default the whole build fails
    /// instead of silently treating the jump as having no successor.
    #[error("Jump target of '{mnemonic}' at 0x{address:08x} can not be resolved statically")]
    UnresolvedJump {
        /// Address of the jump instruction
        address: u32,
        /// Textual form of the offending instruction
        mnemonic: String,
    },

    /// A jump lands inside an instruction of an already discovered block.
    #[error("Jump target 0x{address:08x} is not on an instruction boundary")]
    MisalignedTarget {
        /// The offending target address
        address: u32,
    },

    /// An address does not map into the analysed buffer.
    #[error("Address 0x{address:08x} is outside of the analysed buffer")]
    AddressOutOfRange {
        /// The offending address
        address: u32,
    },

    /// Block discovery exceeded the configured number of blocks.
    #[error("Reached the maximum number of blocks allowed - {0}")]
    BlockLimit(usize),
}
