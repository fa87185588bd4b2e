//! Raw type and method signatures as handed over by the loader.
//!
//! A [`TypeSig`] is the structural description of a type *before* it has been materialized in
//! the unit graph: primitives, token references into the loaded tables, generic parameter
//! placeholders and constructed shapes (arrays, pointers, by-refs, generic instantiations).
//! Signatures are plain values; the graph turns them into canonical type units on demand.

use crate::metadata::token::Token;

/// Structural description of a type, prior to resolution.
///
/// Signatures nest arbitrarily deep: `Foo<int[], Bar*>[]` is an `SzArray` wrapping a
/// `GenericInst` wrapping an `SzArray` and a `Ptr`. Generic parameter placeholders
/// ([`TypeSig::Var`], [`TypeSig::MVar`]) survive substitution unchanged when no binding is in
/// scope - a legitimately open type is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSig {
    /// void
    #[default]
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.Object
    Object,
    /// System.String
    String,
    /// Reference type by definition token
    Class(Token),
    /// Value type by definition token
    ValueType(Token),
    /// Generic type parameter, index into the declaring type's parameter list
    Var(u32),
    /// Generic method parameter, index into the method's parameter list
    MVar(u32),
    /// Single-dimension, zero-based array
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: Box<TypeSig>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer to a type
    Ptr(Box<TypeSig>),
    /// Type passed by reference
    ByRef(Box<TypeSig>),
    /// A pinned local variable slot
    Pinned(Box<TypeSig>),
    /// Generic type instantiation: open definition plus its arguments
    GenericInst(Box<TypeSig>, Vec<TypeSig>),
}

impl TypeSig {
    /// True when the signature still reaches an unbound generic parameter.
    ///
    /// This is the derived `HasOpenGenericParams` of the data model: a closed instantiation of
    /// an open definition is closed only when every argument is itself closed.
    #[must_use]
    pub fn has_open_generic_params(&self) -> bool {
        match self {
            TypeSig::Var(_) | TypeSig::MVar(_) => true,
            TypeSig::SzArray(inner)
            | TypeSig::Ptr(inner)
            | TypeSig::ByRef(inner)
            | TypeSig::Pinned(inner)
            | TypeSig::Array { element: inner, .. } => inner.has_open_generic_params(),
            TypeSig::GenericInst(element, args) => {
                element.has_open_generic_params()
                    || args.iter().any(TypeSig::has_open_generic_params)
            }
            _ => false,
        }
    }

    /// The well-known `System.*` name for primitive signatures, `None` otherwise.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        match self {
            TypeSig::Void => Some("Void"),
            TypeSig::Boolean => Some("Boolean"),
            TypeSig::Char => Some("Char"),
            TypeSig::I1 => Some("SByte"),
            TypeSig::U1 => Some("Byte"),
            TypeSig::I2 => Some("Int16"),
            TypeSig::U2 => Some("UInt16"),
            TypeSig::I4 => Some("Int32"),
            TypeSig::U4 => Some("UInt32"),
            TypeSig::I8 => Some("Int64"),
            TypeSig::U8 => Some("UInt64"),
            TypeSig::R4 => Some("Single"),
            TypeSig::R8 => Some("Double"),
            TypeSig::I => Some("IntPtr"),
            TypeSig::U => Some("UIntPtr"),
            TypeSig::Object => Some("Object"),
            TypeSig::String => Some("String"),
            _ => None,
        }
    }
}

/// A raw method parameter: name plus type signature.
#[derive(Debug, Clone, PartialEq)]
pub struct RawParam {
    /// Parameter name from the metadata (may be synthesized by the loader)
    pub name: String,
    /// The parameter's type signature
    pub signature: TypeSig,
}

/// A raw method signature: return type plus ordered parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMethodSignature {
    /// The return type signature
    pub return_type: TypeSig,
    /// The ordered parameters
    pub params: Vec<RawParam>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_generic_detection() {
        assert!(TypeSig::Var(0).has_open_generic_params());
        assert!(TypeSig::MVar(2).has_open_generic_params());
        assert!(!TypeSig::I4.has_open_generic_params());
        assert!(!TypeSig::Class(Token::new(0x02000001)).has_open_generic_params());

        let nested = TypeSig::SzArray(Box::new(TypeSig::GenericInst(
            Box::new(TypeSig::Class(Token::new(0x02000001))),
            vec![TypeSig::I4, TypeSig::Ptr(Box::new(TypeSig::Var(1)))],
        )));
        assert!(nested.has_open_generic_params());

        let closed = TypeSig::GenericInst(
            Box::new(TypeSig::Class(Token::new(0x02000001))),
            vec![TypeSig::String],
        );
        assert!(!closed.has_open_generic_params());
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(TypeSig::I4.primitive_name(), Some("Int32"));
        assert_eq!(TypeSig::Object.primitive_name(), Some("Object"));
        assert_eq!(
            TypeSig::SzArray(Box::new(TypeSig::I4)).primitive_name(),
            None
        );
    }
}
