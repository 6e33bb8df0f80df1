//! Instruction set and decode boundary
//!
//! A decoder hands the VM an ordered list of [`Instruction`]s. Each carries its
//! opcode, typed operands and encoded byte length; the byte lengths are what
//! [`crate::InstructionStream`] uses to resolve byte-relative branch offsets.
//! Instructions derive serde so decoded streams can be stored or exchanged as JSON.

use crate::error::VmError;
use crate::value::{AvmString, Value};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $byte:literal,)*) => {
        /// Instruction tag
        ///
        /// The discriminant is the tag byte used by the binary container format.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$meta])* $name = $byte,)*
        }

        impl Opcode {
            /// Map a tag byte to its opcode
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Movie control (stage)
    // ═══════════════════════════════════════════════════════════════════════════════
    End = 0x00,
    NextFrame = 0x04,
    PrevFrame = 0x05,
    Play = 0x06,
    Stop = 0x07,
    ToggleQuality = 0x08,
    StopSounds = 0x09,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Version 1 operators
    // ═══════════════════════════════════════════════════════════════════════════════
    Add = 0x0A,
    Subtract = 0x0B,
    Multiply = 0x0C,
    Divide = 0x0D,
    Equals = 0x0E,
    LessThan = 0x0F,
    LogicalAnd = 0x10,
    LogicalOr = 0x11,
    LogicalNot = 0x12,
    StringEquals = 0x13,
    StringLength = 0x14,
    SubString = 0x15,
    Pop = 0x17,
    ToInteger = 0x18,
    GetVariable = 0x1C,
    SetVariable = 0x1D,
    SetTarget2 = 0x20,
    StringConcat = 0x21,
    GetProperty = 0x22,
    SetProperty = 0x23,
    CloneSprite = 0x24,
    RemoveSprite = 0x25,
    Trace = 0x26,
    StartDragMovie = 0x27,
    StopDragMovie = 0x28,
    StringCompare = 0x29,
    Throw = 0x2A,
    CastOp = 0x2B,
    ImplementsOp = 0x2C,
    Random = 0x30,
    MbLength = 0x31,
    Ord = 0x32,
    Chr = 0x33,
    GetTime = 0x34,
    MbSubString = 0x35,
    MbOrd = 0x36,
    MbChr = 0x37,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Version 2 operators
    // ═══════════════════════════════════════════════════════════════════════════════
    Delete = 0x3A,
    Delete2 = 0x3B,
    DefineLocal = 0x3C,
    CallFunction = 0x3D,
    Return = 0x3E,
    Modulo = 0x3F,
    NewObject = 0x40,
    Var = 0x41,
    InitArray = 0x42,
    InitObject = 0x43,
    TypeOf = 0x44,
    TargetPath = 0x45,
    Enumerate = 0x46,
    Add2 = 0x47,
    LessThan2 = 0x48,
    Equals2 = 0x49,
    ToNumber = 0x4A,
    ToString = 0x4B,
    PushDuplicate = 0x4C,
    StackSwap = 0x4D,
    GetMember = 0x4E,
    SetMember = 0x4F,
    Increment = 0x50,
    Decrement = 0x51,
    CallMethod = 0x52,
    NewMethod = 0x53,
    InstanceOf = 0x54,
    Enumerate2 = 0x55,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Compact pushes and calls
    // ═══════════════════════════════════════════════════════════════════════════════
    EaPushThis = 0x56,
    EaPushGlobal = 0x58,
    EaPushZero = 0x59,
    EaPushOne = 0x5A,
    EaCallFuncPop = 0x5B,
    EaCallFunc = 0x5C,
    EaCallMethodPop = 0x5D,
    EaCallMethod = 0x5E,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Bitwise and comparison
    // ═══════════════════════════════════════════════════════════════════════════════
    BitwiseAnd = 0x60,
    BitwiseOr = 0x61,
    BitwiseXOr = 0x62,
    ShiftLeft = 0x63,
    ShiftRight = 0x64,
    ShiftRight2 = 0x65,
    StrictEquals = 0x66,
    Greater = 0x67,
    StringGreater = 0x68,
    Extends = 0x69,

    EaPushThisVar = 0x70,
    EaPushGlobalVar = 0x71,
    EaZeroVar = 0x72,
    EaPushTrue = 0x73,
    EaPushFalse = 0x74,
    EaPushNull = 0x75,
    EaPushUndefined = 0x76,
    TraceStart = 0x77,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Opcodes with operands
    // ═══════════════════════════════════════════════════════════════════════════════
    GotoFrame = 0x81,
    GetUrl = 0x83,
    SetRegister = 0x87,
    ConstantPool = 0x88,
    WaitForFrame = 0x8A,
    SetTarget = 0x8B,
    GotoLabel = 0x8C,
    WaitForFrameExpr = 0x8D,
    DefineFunction2 = 0x8E,
    Try = 0x8F,
    With = 0x94,
    PushData = 0x96,
    BranchAlways = 0x99,
    GetUrl2 = 0x9A,
    DefineFunction = 0x9B,
    BranchIfTrue = 0x9D,
    CallFrame = 0x9E,
    GotoFrame2 = 0x9F,

    EaPushString = 0xA1,
    EaPushConstantByte = 0xA2,
    EaPushConstantWord = 0xA3,
    EaGetStringVar = 0xA4,
    EaGetStringMember = 0xA5,
    EaSetStringVar = 0xA6,
    EaSetStringMember = 0xA7,
    EaPushValueOfVar = 0xAE,
    EaGetNamedMember = 0xAF,
    EaCallNamedFuncPop = 0xB0,
    EaCallNamedFunc = 0xB1,
    EaCallNamedMethodPop = 0xB2,
    EaCallNamedMethod = 0xB3,
    EaPushFloat = 0xB4,
    EaPushByte = 0xB5,
    EaPushShort = 0xB6,
    EaPushLong = 0xB7,
    EaBranchIfFalse = 0xB8,
    EaPushRegister = 0xB9,

    Padding = 0xFF,
}

impl Opcode {
    /// Tag byte in the binary container format
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::BranchAlways | Opcode::BranchIfTrue | Opcode::EaBranchIfFalse
        )
    }
}

/// A decoded operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Integer(i32),
    Float(f64),
    Boolean(bool),
    String(String),
    /// Register index in the executing frame
    Register(u8),
    /// Index into the active constant pool
    Constant(u16),
    Undefined,
    Null,
}

impl Operand {
    /// Literal value of the operand; register and constant references
    /// must be resolved against a frame instead.
    pub fn literal(&self) -> Option<Value> {
        match self {
            Operand::Integer(i) => Some(Value::Integer(*i)),
            Operand::Float(f) => Some(Value::Float(*f)),
            Operand::Boolean(b) => Some(Value::Boolean(*b)),
            Operand::String(s) => Some(Value::String(AvmString::from(s.as_str()))),
            Operand::Undefined => Some(Value::Undefined),
            Operand::Null => Some(Value::Null),
            Operand::Register(_) | Operand::Constant(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Operand::Integer(i) => Some(i64::from(*i)),
            Operand::Register(r) => Some(i64::from(*r)),
            Operand::Constant(c) => Some(i64::from(*c)),
            Operand::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default)]
    pub operands: Vec<Operand>,
    /// Encoded length in bytes
    pub size: usize,
    /// Pause the VM before executing this instruction
    #[serde(default)]
    pub breakpoint: bool,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>, size: usize) -> Self {
        Self {
            opcode,
            operands,
            size,
            breakpoint: false,
        }
    }

    /// An operand-less instruction encoded in a single byte
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new(), 1)
    }

    pub fn with_breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    pub fn operand(&self, index: usize) -> Result<&Operand, VmError> {
        self.operands.get(index).ok_or_else(|| {
            VmError::invalid_operand(self.opcode, format!("missing operand {index}"))
        })
    }

    pub fn integer_operand(&self, index: usize) -> Result<i64, VmError> {
        self.operand(index)?.as_integer().ok_or_else(|| {
            VmError::invalid_operand(self.opcode, format!("operand {index} is not an integer"))
        })
    }

    pub fn string_operand(&self, index: usize) -> Result<&str, VmError> {
        match self.operand(index)? {
            Operand::String(s) => Ok(s.as_str()),
            _ => Err(VmError::invalid_operand(
                self.opcode,
                format!("operand {index} is not a string"),
            )),
        }
    }

    /// Byte offset of a branch instruction
    pub fn branch_offset(&self) -> Result<i64, VmError> {
        self.integer_operand(0)
    }
}

bitflags! {
    /// Register preload configuration of a `DefineFunction2` activation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PreloadFlags: u32 {
        const PRELOAD_GLOBAL = 0x00_0001;
        const PRELOAD_THIS = 0x00_0100;
        const SUPPRESS_THIS = 0x00_0200;
        const PRELOAD_ARGUMENTS = 0x00_0400;
        const SUPPRESS_ARGUMENTS = 0x00_0800;
        const PRELOAD_SUPER = 0x00_1000;
        const SUPPRESS_SUPER = 0x00_2000;
        const PRELOAD_ROOT = 0x00_4000;
        const PRELOAD_PARENT = 0x00_8000;
        const PRELOAD_EXTERN = 0x01_0000;
    }
}

impl PreloadFlags {
    /// Registers filled by preloading
    pub fn preload_count(self) -> u32 {
        let preloads = PreloadFlags::PRELOAD_THIS
            | PreloadFlags::PRELOAD_ARGUMENTS
            | PreloadFlags::PRELOAD_SUPER
            | PreloadFlags::PRELOAD_ROOT
            | PreloadFlags::PRELOAD_PARENT
            | PreloadFlags::PRELOAD_GLOBAL
            | PreloadFlags::PRELOAD_EXTERN;
        self.intersection(preloads).bits().count_ones()
    }
}
