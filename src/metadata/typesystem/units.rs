use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
};

use crate::metadata::{
    descriptors::{
        FieldDescriptor, MethodDescriptor, ModuleDescriptor, PropertyDescriptor, TypeAttributes,
        TypeDescriptor,
    },
    method::{ExceptionBlock, Instruction, LocalVariable},
    signatures::TypeSig,
    token::Token,
    typesystem::MemberMap,
};

/// Reference-counted handle to a [`TypeUnit`]
pub type TypeRc = Arc<TypeUnit>;
/// Reference-counted handle to a [`FieldUnit`]
pub type FieldRc = Arc<FieldUnit>;
/// Reference-counted handle to a [`MethodUnit`]
pub type MethodRc = Arc<MethodUnit>;
/// Reference-counted handle to a [`PropertyUnit`]
pub type PropertyRc = Arc<PropertyUnit>;
/// Reference-counted handle to a [`ModuleUnit`]
pub type ModuleRc = Arc<ModuleUnit>;

/// Append-only list of resolved custom attributes
pub type CustomAttributeList = Arc<boxcar::Vec<CustomAttribute>>;

/// Array classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayInfo {
    /// Not an array type
    #[default]
    None,
    /// Single-dimension, zero-based array
    Vector,
    /// Multi-dimensional array
    MultiDim {
        /// Number of dimensions
        rank: u32,
    },
}

/// A weak reference to a [`TypeUnit`] that prevents circular strong references
/// through the cross-linked graph while providing a clean API.
#[derive(Debug, Clone, Default)]
pub struct TypeRef {
    weak: Weak<TypeUnit>,
}

impl TypeRef {
    /// Creates a new `TypeRef` from a strong reference
    #[must_use]
    pub fn new(strong: &TypeRc) -> Self {
        TypeRef {
            weak: Arc::downgrade(strong),
        }
    }

    /// Gets a strong reference to the type, `None` if the graph dropped it
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeRc> {
        self.weak.upgrade()
    }

    /// Gets a strong reference to the type, panicking if it has been dropped.
    /// Use this when the graph is known to still own the type.
    ///
    /// # Panics
    /// Panics if the type has been dropped and the weak reference cannot be upgraded.
    #[must_use]
    pub fn expect_alive(&self, msg: &str) -> TypeRc {
        self.weak.upgrade().expect(msg)
    }

    /// Checks whether the referenced type is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak.strong_count() > 0
    }

    /// Token of the referenced type (if still alive)
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|t| t.token)
    }

    /// Full name of the referenced type (if still alive)
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        self.upgrade().map(|t| t.full_name())
    }
}

impl From<TypeRc> for TypeRef {
    fn from(strong: TypeRc) -> Self {
        TypeRef::new(&strong)
    }
}

/// A weak reference to a [`FieldUnit`]
#[derive(Debug, Clone, Default)]
pub struct FieldRef {
    weak: Weak<FieldUnit>,
}

impl FieldRef {
    /// Creates a new `FieldRef` from a strong reference
    #[must_use]
    pub fn new(strong: &FieldRc) -> Self {
        FieldRef {
            weak: Arc::downgrade(strong),
        }
    }

    /// Gets a strong reference to the field, `None` if the graph dropped it
    #[must_use]
    pub fn upgrade(&self) -> Option<FieldRc> {
        self.weak.upgrade()
    }

    /// Token of the referenced field (if still alive)
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|f| f.token)
    }
}

impl From<FieldRc> for FieldRef {
    fn from(strong: FieldRc) -> Self {
        FieldRef::new(&strong)
    }
}

/// A weak reference to a [`MethodUnit`]
#[derive(Debug, Clone, Default)]
pub struct MethodRef {
    weak: Weak<MethodUnit>,
}

impl MethodRef {
    /// Creates a new `MethodRef` from a strong reference
    #[must_use]
    pub fn new(strong: &MethodRc) -> Self {
        MethodRef {
            weak: Arc::downgrade(strong),
        }
    }

    /// Gets a strong reference to the method, `None` if the graph dropped it
    #[must_use]
    pub fn upgrade(&self) -> Option<MethodRc> {
        self.weak.upgrade()
    }

    /// Token of the referenced method (if still alive)
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|m| m.token)
    }

    /// Name of the referenced method (if still alive)
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.upgrade().map(|m| m.name.clone())
    }
}

impl From<MethodRc> for MethodRef {
    fn from(strong: MethodRc) -> Self {
        MethodRef::new(&strong)
    }
}

/// A resolved custom attribute attached to a unit.
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// The attribute constructor
    pub constructor: MethodRef,
    /// Positional constructor arguments
    pub arguments: Vec<AttributeArgument>,
    /// Named field/property arguments
    pub named_arguments: Vec<NamedAttributeArgument>,
}

/// One resolved attribute argument.
#[derive(Debug, Clone)]
pub struct AttributeArgument {
    /// The argument's declared type
    pub value_type: TypeRef,
    /// The argument value
    pub value: AttributeValue,
}

/// A resolved custom-attribute argument value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// A string literal
    String(String),
    /// A resolved type reference
    Type(TypeRef),
    /// Any integral value, widened
    Int(i64),
    /// Any floating-point value, widened
    Float(f64),
    /// A boolean value
    Bool(bool),
    /// A nested argument array
    Array(Vec<AttributeArgument>),
}

/// A resolved named attribute argument.
#[derive(Debug, Clone)]
pub struct NamedAttributeArgument {
    /// Name of the target field or property
    pub name: String,
    /// True when the target is a field, false for a property
    pub is_field: bool,
    /// The assigned value
    pub argument: AttributeArgument,
}

/// Resolution-derived state of a type, guarded by the unit's lock.
#[derive(Debug, Default)]
pub struct TypeData {
    /// The base ('extends') type, `None` for root types and interfaces
    pub base_type: Option<TypeRef>,
    /// The enclosing type, for nested types
    pub declaring_type: Option<TypeRef>,
    /// Underlying type for enums, element type for arrays, open definition
    /// for generic instantiations
    pub element_type: Option<TypeRef>,
    /// Implemented interfaces, keyed by full name
    pub interfaces: HashMap<String, TypeRef>,
    /// Fields owned by this type, keyed by name
    pub fields: MemberMap<FieldRc>,
    /// Methods owned by this type, keyed by qualified name
    pub methods: MemberMap<MethodRc>,
    /// Properties owned by this type, keyed by name
    pub properties: MemberMap<PropertyRc>,
    /// True while the type's signature still reaches an unbound generic parameter
    pub has_open_generic_params: bool,
}

/// A type in the unit graph: nominal definition, primitive, or constructed shape.
///
/// Identity (token, names, signature, generic arguments) is immutable; everything derived
/// during resolution lives behind the data lock and must only be trusted by concurrent
/// readers once [`TypeUnit::is_resolved`] reports true.
#[derive(Debug)]
pub struct TypeUnit {
    /// Stable identity token
    pub token: Token,
    /// Namespace, empty for constructed and placeholder types
    pub namespace: String,
    /// Type name, including decoration for constructed types (`Int32[]`, `List<Int32>`)
    pub name: String,
    /// The canonical signature this type was materialized from
    pub signature: TypeSig,
    /// Raw attribute flags
    pub attributes: TypeAttributes,
    /// Array classification
    pub array: ArrayInfo,
    /// Generic arguments of a closed instantiation, empty otherwise
    pub generic_arguments: Vec<TypeRc>,
    /// Custom attributes, appended during resolution
    pub custom_attributes: CustomAttributeList,
    descriptor: Option<TypeDescriptor>,
    data: RwLock<TypeData>,
    resolved: AtomicBool,
}

impl TypeUnit {
    /// Creates a new, unresolved type unit.
    #[must_use]
    pub fn new(
        token: Token,
        namespace: impl Into<String>,
        name: impl Into<String>,
        signature: TypeSig,
        attributes: TypeAttributes,
        array: ArrayInfo,
        generic_arguments: Vec<TypeRc>,
        descriptor: Option<TypeDescriptor>,
    ) -> Self {
        TypeUnit {
            token,
            namespace: namespace.into(),
            name: name.into(),
            signature,
            attributes,
            array,
            generic_arguments,
            custom_attributes: Arc::new(boxcar::Vec::new()),
            descriptor,
            data: RwLock::new(TypeData::default()),
            resolved: AtomicBool::new(false),
        }
    }

    /// The raw descriptor this type was loaded from, `None` for synthesized types
    #[must_use]
    pub fn descriptor(&self) -> Option<&TypeDescriptor> {
        self.descriptor.as_ref()
    }

    /// Namespace-qualified name, e.g. `System.Int32` or `System.Int32[]`
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// True once resolution has committed all derived fields
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Read access to the resolution-derived state
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, TypeData> {
        read_lock!(self.data)
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, TypeData> {
        write_lock!(self.data)
    }

    /// The base type, if set
    #[must_use]
    pub fn base_type(&self) -> Option<TypeRef> {
        self.data().base_type.clone()
    }

    /// The element type (enum underlying / array element / open generic definition), if set
    #[must_use]
    pub fn element_type(&self) -> Option<TypeRef> {
        self.data().element_type.clone()
    }

    /// True while the type still reaches an unbound generic parameter
    #[must_use]
    pub fn has_open_generic_params(&self) -> bool {
        self.data().has_open_generic_params
    }

    /// True when the raw attributes mark this type as an interface
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.attributes.contains(TypeAttributes::INTERFACE)
    }
}

/// Resolution-derived state of a field, guarded by the unit's lock.
#[derive(Debug, Default)]
pub struct FieldData {
    /// The type that owns this field
    pub declaring_type: Option<TypeRef>,
    /// The field's resolved type
    pub field_type: Option<TypeRef>,
    /// True while the field's type still reaches an unbound generic parameter
    pub has_open_generic_params: bool,
}

/// A field in the unit graph.
#[derive(Debug)]
pub struct FieldUnit {
    /// Stable identity token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Custom attributes, appended during resolution
    pub custom_attributes: CustomAttributeList,
    descriptor: Option<FieldDescriptor>,
    data: RwLock<FieldData>,
    resolved: AtomicBool,
}

impl FieldUnit {
    /// Creates a new, unresolved field unit.
    #[must_use]
    pub fn new(token: Token, name: impl Into<String>, descriptor: Option<FieldDescriptor>) -> Self {
        FieldUnit {
            token,
            name: name.into(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            descriptor,
            data: RwLock::new(FieldData::default()),
            resolved: AtomicBool::new(false),
        }
    }

    /// The raw descriptor this field was loaded from
    #[must_use]
    pub fn descriptor(&self) -> Option<&FieldDescriptor> {
        self.descriptor.as_ref()
    }

    /// True once resolution has committed all derived fields
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Read access to the resolution-derived state
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, FieldData> {
        read_lock!(self.data)
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, FieldData> {
        write_lock!(self.data)
    }
}

/// A resolved method parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// The parameter's resolved type
    pub param_type: TypeRef,
}

/// A resolved method signature: return type plus ordered parameters.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    /// The resolved return type
    pub return_type: TypeRef,
    /// The ordered parameters
    pub params: Vec<Parameter>,
}

/// Resolution-derived state of a method, guarded by the unit's lock.
#[derive(Debug, Default)]
pub struct MethodData {
    /// The type that owns this method
    pub declaring_type: Option<TypeRef>,
    /// The resolved signature, `None` until resolution commits
    pub signature: Option<MethodSignature>,
    /// Resolved local variable slots, in signature order
    pub local_variables: Vec<LocalVariable>,
    /// Resolved exception handling clauses
    pub exception_blocks: Vec<ExceptionBlock>,
    /// The resolved instruction sequence
    pub code: Vec<Instruction>,
    /// Methods this method overrides or explicitly implements
    pub overrides: Vec<MethodRef>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// True while the method still reaches an unbound generic parameter
    pub has_open_generic_params: bool,
}

/// A method in the unit graph.
#[derive(Debug)]
pub struct MethodUnit {
    /// Stable identity token; generic instantiations share their definition's token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Generic arguments of a closed instantiation, empty otherwise
    pub generic_arguments: Vec<TypeRc>,
    /// Custom attributes, appended during resolution
    pub custom_attributes: CustomAttributeList,
    descriptor: Option<MethodDescriptor>,
    data: RwLock<MethodData>,
    resolved: AtomicBool,
}

impl MethodUnit {
    /// Creates a new, unresolved method unit.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        generic_arguments: Vec<TypeRc>,
        descriptor: Option<MethodDescriptor>,
    ) -> Self {
        MethodUnit {
            token,
            name: name.into(),
            generic_arguments,
            custom_attributes: Arc::new(boxcar::Vec::new()),
            descriptor,
            data: RwLock::new(MethodData::default()),
            resolved: AtomicBool::new(false),
        }
    }

    /// The raw descriptor this method was loaded from
    #[must_use]
    pub fn descriptor(&self) -> Option<&MethodDescriptor> {
        self.descriptor.as_ref()
    }

    /// True once resolution has committed signature, body and overrides
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Read access to the resolution-derived state
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, MethodData> {
        read_lock!(self.data)
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, MethodData> {
        write_lock!(self.data)
    }

    /// The type that owns this method, if linked
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRef> {
        self.data().declaring_type.clone()
    }
}

/// Resolution-derived state of a property, guarded by the unit's lock.
#[derive(Debug, Default)]
pub struct PropertyData {
    /// The type that owns this property
    pub declaring_type: Option<TypeRef>,
    /// The property's resolved type
    pub property_type: Option<TypeRef>,
    /// True while the property's type still reaches an unbound generic parameter
    pub has_open_generic_params: bool,
}

/// A property in the unit graph.
#[derive(Debug)]
pub struct PropertyUnit {
    /// Stable identity token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Custom attributes, appended during resolution
    pub custom_attributes: CustomAttributeList,
    descriptor: Option<PropertyDescriptor>,
    data: RwLock<PropertyData>,
    resolved: AtomicBool,
}

impl PropertyUnit {
    /// Creates a new, unresolved property unit.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        descriptor: Option<PropertyDescriptor>,
    ) -> Self {
        PropertyUnit {
            token,
            name: name.into(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            descriptor,
            data: RwLock::new(PropertyData::default()),
            resolved: AtomicBool::new(false),
        }
    }

    /// The raw descriptor this property was loaded from, `None` for clones
    #[must_use]
    pub fn descriptor(&self) -> Option<&PropertyDescriptor> {
        self.descriptor.as_ref()
    }

    /// True once resolution has committed all derived fields
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Read access to the resolution-derived state
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, PropertyData> {
        read_lock!(self.data)
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, PropertyData> {
        write_lock!(self.data)
    }
}

/// Resolution-derived state of a module, guarded by the unit's lock.
#[derive(Debug, Default)]
pub struct ModuleData {
    /// The module's entry-point method, patched after the main fixed point
    pub entry_point: Option<MethodRef>,
}

/// A module in the unit graph.
#[derive(Debug)]
pub struct ModuleUnit {
    /// Stable identity token
    pub token: Token,
    /// Module name
    pub name: String,
    /// Custom attributes, appended during resolution
    pub custom_attributes: CustomAttributeList,
    descriptor: Option<ModuleDescriptor>,
    data: RwLock<ModuleData>,
    resolved: AtomicBool,
}

impl ModuleUnit {
    /// Creates a new, unresolved module unit.
    #[must_use]
    pub fn new(
        token: Token,
        name: impl Into<String>,
        descriptor: Option<ModuleDescriptor>,
    ) -> Self {
        ModuleUnit {
            token,
            name: name.into(),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            descriptor,
            data: RwLock::new(ModuleData::default()),
            resolved: AtomicBool::new(false),
        }
    }

    /// The raw descriptor this module was loaded from
    #[must_use]
    pub fn descriptor(&self) -> Option<&ModuleDescriptor> {
        self.descriptor.as_ref()
    }

    /// True once module-level attributes have been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Read access to the resolution-derived state
    #[must_use]
    pub fn data(&self) -> RwLockReadGuard<'_, ModuleData> {
        read_lock!(self.data)
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, ModuleData> {
        write_lock!(self.data)
    }

    /// The module's entry-point method, if patched
    #[must_use]
    pub fn entry_point(&self) -> Option<MethodRef> {
        self.data().entry_point.clone()
    }
}

/// A resolvable unit: the closed set of entity kinds the driver dispatches over.
#[derive(Clone, strum::Display)]
pub enum Unit {
    /// A type unit
    Type(TypeRc),
    /// A field unit
    Field(FieldRc),
    /// A method unit
    Method(MethodRc),
    /// A property unit
    Property(PropertyRc),
    /// A module unit
    Module(ModuleRc),
}

impl Unit {
    /// The unit's stable identity token
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            Unit::Type(t) => t.token,
            Unit::Field(f) => f.token,
            Unit::Method(m) => m.token,
            Unit::Property(p) => p.token,
            Unit::Module(m) => m.token,
        }
    }

    /// True once the unit has been resolved
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        match self {
            Unit::Type(t) => t.is_resolved(),
            Unit::Field(f) => f.is_resolved(),
            Unit::Method(m) => m.is_resolved(),
            Unit::Property(p) => p.is_resolved(),
            Unit::Module(m) => m.is_resolved(),
        }
    }
}
