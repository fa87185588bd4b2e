//! # cilgraph Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! cilgraph library. Import it to get quick access to the essentials for driving metadata
//! resolution and inspecting the resulting graph.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilgraph operations
pub use crate::Error;

/// The result type used throughout cilgraph
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The canonical store of all resolved entities and arbiter of mutation
pub use crate::metadata::typesystem::UnitGraph;

/// The work-queue scheduler driving resolution to a fixed point
pub use crate::metadata::resolver::{MetadataResolver, ResolutionStats, MAX_RESOLVE_ATTEMPTS};

// ================================================================================================
// Identity
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::{Token, TokenTable};

// ================================================================================================
// Type System
// ================================================================================================

/// Entity units, handles and mutation scopes
pub use crate::metadata::typesystem::{
    ArrayInfo, CustomAttribute, FieldMutator, FieldRc, FieldRef, FieldUnit,
    GenericArgumentResolver, MemberMap, MethodMutator, MethodRc, MethodRef, MethodSignature,
    MethodUnit, ModuleMutator, ModuleRc, ModuleUnit, Parameter, PropertyMutator, PropertyRc,
    PropertyUnit, TypeMutator, TypeRc, TypeRef, TypeUnit, Unit,
};

// ================================================================================================
// Signatures and Descriptors
// ================================================================================================

/// Raw signature trees
pub use crate::metadata::signatures::{RawMethodSignature, RawParam, TypeSig};

/// Raw unit descriptors produced by the loader
pub use crate::metadata::descriptors::{
    FieldDescriptor, MethodDescriptor, ModuleDescriptor, PropertyDescriptor, RawCustomAttribute,
    RawMemberTarget, TypeAttributes, TypeDescriptor,
};

// ================================================================================================
// Method Bodies
// ================================================================================================

/// Raw body input model and resolved instruction model
pub use crate::metadata::method::{
    opcodes, ExceptionBlock, ExceptionHandlerFlags, Instruction, LocalVariable, Operand,
    RawBody, RawExceptionHandler, RawInstruction, RawLocal, RawOperand, SourceSpan,
};
