//! Method body representation: raw instruction streams and their resolved form.
//!
//! The loader delivers a [`RawBody`] per method: byte offsets, normalized opcodes and
//! unresolved operands (signatures, member tokens, literal constants). The method body
//! resolver turns that into the resolved [`Instruction`] sequence with every operand pointing
//! into the unit graph, ready for control-flow reconstruction and IR lowering without touching
//! the raw metadata again.

use bitflags::bitflags;

use crate::metadata::{
    signatures::TypeSig,
    token::Token,
    typesystem::{FieldRef, MethodRef, TypeRef},
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; the catch type names what this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause, executed on every path out of the try region.
        const FINALLY = 0x0002;

        /// A fault clause, executed only when an exception is thrown.
        const FAULT = 0x0004;
    }
}

/// Well-known opcode values used by the resolver and its tests.
///
/// Values above `0xFF` are the raw two-byte encodings (`0xFE` prefix); the body resolver
/// renumbers those into the compact `0x100+` space.
#[allow(missing_docs)]
pub mod opcodes {
    pub const NOP: u16 = 0x00;
    pub const LDARG_0: u16 = 0x02;
    pub const LDC_I4_S: u16 = 0x1F;
    pub const LDC_I4: u16 = 0x20;
    pub const CALL: u16 = 0x28;
    pub const RET: u16 = 0x2A;
    pub const BR_S: u16 = 0x2B;
    pub const BR: u16 = 0x38;
    pub const SWITCH: u16 = 0x45;
    pub const CALLVIRT: u16 = 0x6F;
    pub const LDSTR: u16 = 0x72;
    pub const NEWOBJ: u16 = 0x73;
    pub const LDFLD: u16 = 0x7B;
    pub const STFLD: u16 = 0x7D;
    pub const NEWARR: u16 = 0x8D;
    pub const LDTOKEN: u16 = 0xD0;
    pub const CEQ: u16 = 0xFE01;
    pub const LDARG: u16 = 0xFE09;
    pub const LDLOC: u16 = 0xFE0C;
    pub const STLOC: u16 = 0xFE0E;
    pub const LEAVE: u16 = 0xDD;
}

/// Source mapping for one instruction: document plus line/column span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Url or path of the source document
    pub document: String,
    /// First line of the span (1-based)
    pub start_line: u32,
    /// First column of the span (1-based)
    pub start_column: u32,
    /// Last line of the span
    pub end_line: u32,
    /// Last column of the span
    pub end_column: u32,
}

/// A raw local variable slot.
#[derive(Debug, Clone)]
pub struct RawLocal {
    /// Slot name from debug information, `None` when stripped
    pub name: Option<String>,
    /// The slot's type signature
    pub signature: TypeSig,
    /// True when the slot pins its referent for the body's duration
    pub pinned: bool,
}

/// A raw exception handling clause with absolute byte offsets.
#[derive(Debug, Clone)]
pub struct RawExceptionHandler {
    /// The clause kind
    pub flags: ExceptionHandlerFlags,
    /// First byte of the protected region
    pub try_start: u32,
    /// Byte just past the protected region
    pub try_end: u32,
    /// First byte of the handler
    pub handler_start: u32,
    /// Byte just past the handler
    pub handler_end: u32,
    /// For typed clauses, the caught exception type
    pub catch_type: Option<TypeSig>,
    /// For filter clauses, the first byte of the filter expression
    pub filter_start: Option<u32>,
}

/// One raw instruction: offset, opcode and unresolved operand.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    /// Byte offset of the instruction within the body
    pub offset: u32,
    /// The opcode, two-byte encodings still in their `0xFE xx` form
    pub opcode: u16,
    /// The unresolved operand
    pub operand: RawOperand,
    /// Optional source mapping
    pub span: Option<SourceSpan>,
}

/// An unresolved instruction operand, dispatched on by the body resolver.
#[derive(Debug, Clone)]
pub enum RawOperand {
    /// No operand
    None,
    /// A type reference by signature
    Type(TypeSig),
    /// A field reference: declaring type signature plus definition token
    Field {
        /// Signature of the declaring type
        parent: TypeSig,
        /// Stable definition token of the field
        token: Token,
    },
    /// A method reference: declaring type signature, definition token and name
    Method {
        /// Signature of the declaring type
        parent: TypeSig,
        /// Stable definition token of the method
        token: Token,
        /// Method name, used for array pseudo-method redirection
        name: String,
    },
    /// A generic method instantiation
    MethodSpec {
        /// Signature of the declaring type
        parent: TypeSig,
        /// Stable definition token of the open method
        token: Token,
        /// Method name
        name: String,
        /// The instantiation arguments
        args: Vec<TypeSig>,
    },
    /// A local variable slot index
    Local(u32),
    /// A parameter index
    Parameter(u32),
    /// A branch target as an absolute byte offset
    Target(i32),
    /// Switch targets as absolute byte offsets
    Switch(Vec<i32>),
    /// A string literal
    String(String),
    /// 32-bit integer constant
    I32(i32),
    /// 64-bit integer constant
    I64(i64),
    /// 32-bit float constant
    R32(f32),
    /// 64-bit float constant
    R64(f64),
}

/// A complete raw method body.
#[derive(Debug, Clone, Default)]
pub struct RawBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Local variable slots, in signature order
    pub locals: Vec<RawLocal>,
    /// Exception handling clauses, in metadata order
    pub exception_handlers: Vec<RawExceptionHandler>,
    /// The instruction stream, in offset order
    pub instructions: Vec<RawInstruction>,
}

impl Default for RawOperand {
    fn default() -> Self {
        RawOperand::None
    }
}

/// A resolved local variable.
#[derive(Debug, Clone)]
pub struct LocalVariable {
    /// Slot name, synthesized as `V_{index}` when the metadata carries none
    pub name: String,
    /// The slot's resolved type
    pub ty: TypeRef,
    /// True when the slot pins its referent
    pub pinned: bool,
}

/// A resolved exception handling clause.
#[derive(Debug, Clone)]
pub struct ExceptionBlock {
    /// The clause kind
    pub flags: ExceptionHandlerFlags,
    /// First byte of the protected region
    pub try_start: u32,
    /// Byte just past the protected region
    pub try_end: u32,
    /// First byte of the handler
    pub handler_start: u32,
    /// Byte just past the handler
    pub handler_end: u32,
    /// For typed clauses, the caught exception type
    pub catch_type: Option<TypeRef>,
    /// For filter clauses, the first byte of the filter expression
    pub filter_start: Option<u32>,
}

/// A fully resolved instruction. Immutable once created.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Byte offset of the instruction within the body
    pub offset: u32,
    /// The opcode, renumbered into the single `0x000..0x1FF` encoding space
    pub opcode: u16,
    /// The resolved operand
    pub operand: Operand,
    /// Byte offset of the previous instruction, `None` for the first
    pub previous: Option<u32>,
    /// Byte offset of the next instruction, `None` for the last
    pub next: Option<u32>,
    /// Optional source mapping
    pub span: Option<SourceSpan>,
}

/// A resolved instruction operand.
#[derive(Debug, Clone)]
pub enum Operand {
    /// No operand
    None,
    /// A resolved type
    Type(TypeRef),
    /// A resolved field
    Field(FieldRef),
    /// A resolved method
    Method(MethodRef),
    /// A local variable slot index
    Local(u32),
    /// A parameter index
    Parameter(u32),
    /// A branch target as an absolute byte offset
    Target(i32),
    /// Switch targets as absolute byte offsets
    Switch(Vec<i32>),
    /// An interned string id
    String(u32),
    /// 32-bit integer constant
    I32(i32),
    /// 64-bit integer constant
    I64(i64),
    /// 32-bit float constant
    R32(f32),
    /// 64-bit float constant
    R64(f64),
}
