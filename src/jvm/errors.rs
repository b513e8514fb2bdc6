use super::code::Label;
use std::fmt;

/// Errors from reading, analysing, or writing class files and method bodies
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The input does not follow the class file format
    MalformedClassFile(String),

    /// Ill-formed field or method descriptor
    MalformedDescriptor {
        descriptor: String,
        message: String,
    },

    /// Constant pool index is out of range or points at the wrong kind of constant
    BadConstantIndex {
        index: u16,
        expected: &'static str,
    },

    /// Byte in the code array that is not an instruction
    UnknownOpcode {
        opcode: u8,
        offset: usize,
    },

    /// Adding a constant would push the pool past 65535 entries
    ConstantPoolOverflow {
        offset: usize,
    },

    /// Encoded method body is longer than 65535 bytes
    MethodCodeOverflow(usize),

    /// A conditional jump can't reach its target and the types after it are unknown (unreachable
    /// code without a frame)
    BranchOffsetOverflow {
        offset: usize,
        distance: isize,
    },

    /// Some instruction pops more than the operand stack holds
    StackUnderflow {
        instruction: String,
    },

    /// Two paths reach the same instruction with different stack heights
    InconsistentStackHeight {
        instruction: String,
        first: u16,
        second: u16,
    },

    /// A subroutine (directly or indirectly) calls itself
    RecursiveSubroutine(Label),

    /// A label is referenced but never placed in the method body
    MissingLabel(Label),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::MalformedClassFile(msg) => write!(f, "malformed class file: {}", msg),
            Error::MalformedDescriptor {
                descriptor,
                message,
            } => write!(f, "malformed descriptor '{}': {}", descriptor, message),
            Error::BadConstantIndex { index, expected } => {
                write!(f, "constant #{} is not a valid {}", index, expected)
            }
            Error::UnknownOpcode { opcode, offset } => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", opcode, offset)
            }
            Error::ConstantPoolOverflow { offset } => {
                write!(f, "constant pool overflows at entry {}", offset)
            }
            Error::MethodCodeOverflow(len) => write!(f, "method code is {} bytes long", len),
            Error::BranchOffsetOverflow { offset, distance } => write!(
                f,
                "branch at offset {} cannot jump {} bytes",
                offset, distance
            ),
            Error::StackUnderflow { instruction } => {
                write!(f, "operand stack underflow at {}", instruction)
            }
            Error::InconsistentStackHeight {
                instruction,
                first,
                second,
            } => write!(
                f,
                "stack height at {} is both {} and {}",
                instruction, first, second
            ),
            Error::RecursiveSubroutine(label) => {
                write!(f, "subroutine at {:?} is recursive", label)
            }
            Error::MissingLabel(label) => write!(f, "label {:?} is never placed", label),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
