//! Raw unit descriptors produced by the external metadata loader.
//!
//! The loader parses the binary metadata container and hands this crate one descriptor per
//! discovered unit. A descriptor is the unit's `UnderlyingDescriptor`: set once at creation,
//! never mutated, and consulted by the resolvers to derive every resolution-time field.
//! Constructed types (arrays, generic instantiations) and other synthesized units carry no
//! descriptor at all.

use bitflags::bitflags;

use crate::metadata::{
    method::RawBody,
    signatures::{RawMethodSignature, TypeSig},
    token::Token,
};

bitflags! {
    /// Type-level attribute flags carried over from the raw metadata.
    ///
    /// Only the bits the resolution engine and its consumers care about are modelled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeAttributes: u32 {
        /// The type is an interface definition.
        const INTERFACE = 0x0000_0020;

        /// The type is abstract.
        const ABSTRACT = 0x0000_0080;

        /// The type cannot be derived from.
        const SEALED = 0x0000_0100;

        /// The type name carries special meaning to the runtime.
        const SPECIAL_NAME = 0x0000_0400;

        /// Fields of the type are laid out sequentially.
        const SEQUENTIAL_LAYOUT = 0x0000_0008;

        /// Field layout is specified explicitly.
        const EXPLICIT_LAYOUT = 0x0000_0010;
    }
}

impl Default for TypeAttributes {
    fn default() -> Self {
        TypeAttributes::empty()
    }
}

/// Raw description of a type definition.
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptor {
    /// Signature of the base type ('extends'), `None` for root types and interfaces
    pub base: Option<TypeSig>,
    /// Signature of the enclosing type, for nested types
    pub declaring: Option<TypeSig>,
    /// For enums, the signature of the underlying primitive
    pub enum_underlying: Option<TypeSig>,
    /// Signatures of the directly implemented interfaces
    pub interfaces: Vec<TypeSig>,
    /// Raw attribute flags
    pub attributes: TypeAttributes,
    /// Custom attributes attached to the type
    pub custom_attributes: Vec<RawCustomAttribute>,
}

/// Raw description of a field definition.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// The field's type signature
    pub signature: TypeSig,
    /// Custom attributes attached to the field
    pub custom_attributes: Vec<RawCustomAttribute>,
}

/// Raw description of a method definition, with its optional body.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// The method's signature (return type + parameters)
    pub signature: RawMethodSignature,
    /// Methods this definition overrides or explicitly implements
    pub overrides: Vec<RawMemberTarget>,
    /// The raw instruction stream, absent for abstract/extern methods
    pub body: Option<RawBody>,
    /// Custom attributes attached to the method
    pub custom_attributes: Vec<RawCustomAttribute>,
}

/// Raw description of a property definition.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// The property's type signature
    pub signature: TypeSig,
    /// Custom attributes attached to the property
    pub custom_attributes: Vec<RawCustomAttribute>,
}

/// Raw description of a module definition.
#[derive(Debug, Clone, Default)]
pub struct ModuleDescriptor {
    /// Token of the entry-point method, if the module has one
    pub entry_point: Option<Token>,
    /// Custom attributes attached to the module
    pub custom_attributes: Vec<RawCustomAttribute>,
}

/// A raw reference to a member (field or method) on some type.
///
/// Member references arrive either directly (definition token in the current module) or
/// through one level of indirection (an external member reference); the loader collapses both
/// into the declaring type's signature plus the definition's stable token.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMemberTarget {
    /// Signature of the declaring type
    pub parent: TypeSig,
    /// Stable definition token of the member
    pub token: Token,
}

/// A raw custom attribute: attribute type, constructor token, and arguments.
#[derive(Debug, Clone)]
pub struct RawCustomAttribute {
    /// Signature of the attribute type
    pub attribute_type: TypeSig,
    /// Token of the attribute constructor on that type
    pub ctor: Token,
    /// Positional constructor arguments
    pub arguments: Vec<RawAttributeArgument>,
    /// Named field/property arguments
    pub named_arguments: Vec<RawNamedArgument>,
}

/// One raw attribute argument: declared type plus value.
#[derive(Debug, Clone)]
pub struct RawAttributeArgument {
    /// Signature of the argument's declared type
    pub value_type: TypeSig,
    /// The argument value
    pub value: RawAttributeValue,
}

/// Possible raw custom-attribute argument values.
#[derive(Debug, Clone)]
pub enum RawAttributeValue {
    /// A string literal
    String(String),
    /// A type reference, resolved against the graph during resolution
    Type(TypeSig),
    /// Any integral value, widened
    Int(i64),
    /// Any floating-point value, widened
    Float(f64),
    /// A boolean value
    Bool(bool),
    /// A nested argument array
    Array(Vec<RawAttributeArgument>),
}

/// A raw named attribute argument (field or property assignment).
#[derive(Debug, Clone)]
pub struct RawNamedArgument {
    /// Name of the target field or property
    pub name: String,
    /// True when the target is a field, false for a property
    pub is_field: bool,
    /// The assigned value
    pub argument: RawAttributeArgument,
}
