//! The shared, cross-referenced type-system graph and its mutation control.
//!
//! Everything the resolution drivers produce lives here: the five unit kinds
//! ([`TypeUnit`], [`FieldUnit`], [`MethodUnit`], [`PropertyUnit`], [`ModuleUnit`]), the weak
//! handles that cross-link them without creating reference cycles, and the [`UnitGraph`] that
//! exclusively owns every unit and arbitrates concurrent mutation through scoped mutators.
//!
//! # Ownership model
//!
//! The graph's token-keyed stores and each type's member lists hold the only strong
//! references; every back-reference (`base_type`, `declaring_type`, operand targets, entry
//! points) is a [`TypeRef`]/[`FieldRef`]/[`MethodRef`] weak handle. Units are created once -
//! when discovered by the loader or synthesized during materialization - and never destroyed
//! during a compilation run.
//!
//! # Reading rules
//!
//! A unit's resolution-derived state is only trustworthy to concurrent readers once its
//! `is_resolved` flag has been observed true, or after the mutator scope that wrote it has
//! exited. The flag flips false to true exactly once.

mod collection;
mod generics;
mod graph;
mod units;

pub use collection::MemberMap;
pub use generics::GenericArgumentResolver;
pub use graph::{
    FieldMutator, MethodMutator, ModuleMutator, PropertyMutator, TypeMutator, UnitGraph,
};
pub use units::{
    ArrayInfo, AttributeArgument, AttributeValue, CustomAttribute, CustomAttributeList,
    FieldData, FieldRc, FieldRef, FieldUnit, MethodData, MethodRc, MethodRef, MethodSignature,
    MethodUnit, ModuleData, ModuleRc, ModuleUnit, NamedAttributeArgument, Parameter,
    PropertyData, PropertyRc, PropertyUnit, TypeData, TypeRc, TypeRef, TypeUnit, Unit,
};
