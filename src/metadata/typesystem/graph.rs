use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, RwLockWriteGuard,
    },
};

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    metadata::{
        descriptors::TypeAttributes,
        signatures::TypeSig,
        token::{Token, TokenTable},
        typesystem::{
            ArrayInfo, FieldData, FieldRc, FieldUnit, MethodData, MethodRc, MethodUnit, ModuleData,
            ModuleRc, PropertyData, PropertyRc, PropertyUnit, TypeData, TypeRc, TypeRef, TypeUnit,
            Unit,
        },
    },
    Error, Result,
};

/// First row id handed out for synthesized units, far above anything a loader produces.
const SYNTHETIC_ROW_BASE: u32 = 0x00E0_0000;

/// Scoped mutation handle for a [`TypeUnit`].
///
/// Holding the mutator grants exclusive write access to the type's resolution-derived state;
/// the per-entity lock is released on every exit path when the mutator drops. Mutating two
/// different entities never serializes; a second mutator for the *same* entity blocks until
/// the first scope exits.
pub struct TypeMutator<'a> {
    unit: &'a TypeRc,
    guard: RwLockWriteGuard<'a, TypeData>,
}

impl Deref for TypeMutator<'_> {
    type Target = TypeData;
    fn deref(&self) -> &TypeData {
        &self.guard
    }
}

impl DerefMut for TypeMutator<'_> {
    fn deref_mut(&mut self) -> &mut TypeData {
        &mut self.guard
    }
}

impl TypeMutator<'_> {
    /// The type this mutator is scoped to
    #[must_use]
    pub fn unit(&self) -> &TypeRc {
        self.unit
    }
}

/// Scoped mutation handle for a [`FieldUnit`]. See [`TypeMutator`].
pub struct FieldMutator<'a> {
    guard: RwLockWriteGuard<'a, FieldData>,
}

impl Deref for FieldMutator<'_> {
    type Target = FieldData;
    fn deref(&self) -> &FieldData {
        &self.guard
    }
}

impl DerefMut for FieldMutator<'_> {
    fn deref_mut(&mut self) -> &mut FieldData {
        &mut self.guard
    }
}

/// Scoped mutation handle for a [`MethodUnit`]. See [`TypeMutator`].
pub struct MethodMutator<'a> {
    guard: RwLockWriteGuard<'a, MethodData>,
}

impl Deref for MethodMutator<'_> {
    type Target = MethodData;
    fn deref(&self) -> &MethodData {
        &self.guard
    }
}

impl DerefMut for MethodMutator<'_> {
    fn deref_mut(&mut self) -> &mut MethodData {
        &mut self.guard
    }
}

/// Scoped mutation handle for a [`PropertyUnit`]. See [`TypeMutator`].
pub struct PropertyMutator<'a> {
    guard: RwLockWriteGuard<'a, PropertyData>,
}

impl Deref for PropertyMutator<'_> {
    type Target = PropertyData;
    fn deref(&self) -> &PropertyData {
        &self.guard
    }
}

impl DerefMut for PropertyMutator<'_> {
    fn deref_mut(&mut self) -> &mut PropertyData {
        &mut self.guard
    }
}

/// Scoped mutation handle for a [`ModuleUnit`]. See [`TypeMutator`].
pub struct ModuleMutator<'a> {
    guard: RwLockWriteGuard<'a, ModuleData>,
}

impl Deref for ModuleMutator<'_> {
    type Target = ModuleData;
    fn deref(&self) -> &ModuleData {
        &self.guard
    }
}

impl DerefMut for ModuleMutator<'_> {
    fn deref_mut(&mut self) -> &mut ModuleData {
        &mut self.guard
    }
}

/// The canonical, shared store of all resolved entities and the arbiter of mutation.
///
/// The graph exclusively owns every type, field, method, property and module for the lifetime
/// of a compilation; every other component holds weak handles into it. Primary storage is
/// token-keyed lock-free maps, with a name index for find-or-create of constructed types.
/// Every mutation goes through a scoped mutator and is visible to subsequent readers the
/// moment the mutator scope exits.
pub struct UnitGraph {
    types: SkipMap<Token, TypeRc>,
    fields: SkipMap<Token, FieldRc>,
    methods: SkipMap<Token, MethodRc>,
    properties: SkipMap<Token, PropertyRc>,
    modules: boxcar::Vec<ModuleRc>,
    types_by_name: DashMap<String, TypeRc>,
    string_ids: DashMap<String, u32>,
    strings: boxcar::Vec<String>,
    next_row: AtomicU32,
    array_backlog: Mutex<VecDeque<TypeRc>>,
    deferred_units: Mutex<VecDeque<Unit>>,
}

impl UnitGraph {
    /// Creates an empty graph with the well-known `System.*` types pre-registered.
    #[must_use]
    pub fn new() -> Self {
        let graph = UnitGraph {
            types: SkipMap::new(),
            fields: SkipMap::new(),
            methods: SkipMap::new(),
            properties: SkipMap::new(),
            modules: boxcar::Vec::new(),
            types_by_name: DashMap::new(),
            string_ids: DashMap::new(),
            strings: boxcar::Vec::new(),
            next_row: AtomicU32::new(SYNTHETIC_ROW_BASE),
            array_backlog: Mutex::new(VecDeque::new()),
            deferred_units: Mutex::new(VecDeque::new()),
        };
        graph.seed_corlib();
        graph
    }

    fn seed_corlib(&self) {
        let primitives = [
            TypeSig::Void,
            TypeSig::Boolean,
            TypeSig::Char,
            TypeSig::I1,
            TypeSig::U1,
            TypeSig::I2,
            TypeSig::U2,
            TypeSig::I4,
            TypeSig::U4,
            TypeSig::I8,
            TypeSig::U8,
            TypeSig::R4,
            TypeSig::R8,
            TypeSig::I,
            TypeSig::U,
            TypeSig::Object,
            TypeSig::String,
        ];
        for sig in primitives {
            if let Some(name) = sig.primitive_name() {
                self.install_seed(name, sig);
            }
        }
        for name in ["Array", "ValueType", "Enum"] {
            let token = self.alloc_token(TokenTable::TypeDef);
            self.install_seed_with_token(name, TypeSig::Class(token), token);
        }
    }

    fn install_seed(&self, name: &str, signature: TypeSig) {
        let token = self.alloc_token(TokenTable::TypeDef);
        self.install_seed_with_token(name, signature, token);
    }

    fn install_seed_with_token(&self, name: &str, signature: TypeSig, token: Token) {
        let ty = Arc::new(TypeUnit::new(
            token,
            "System",
            name,
            signature,
            TypeAttributes::default(),
            ArrayInfo::None,
            Vec::new(),
            None,
        ));
        ty.mark_resolved();
        self.types.insert(token, ty.clone());
        self.types_by_name.insert(ty.full_name(), ty);
    }

    fn alloc_token(&self, table: TokenTable) -> Token {
        Token::from_parts(table, self.next_row.fetch_add(1, Ordering::Relaxed))
    }

    // ---- registration (loader entry points) -------------------------------------------------

    /// Registers a loaded type by token and full name.
    pub fn register_type(&self, ty: &TypeRc) {
        self.types.insert(ty.token, ty.clone());
        self.types_by_name.insert(ty.full_name(), ty.clone());
    }

    /// Registers a loaded field by token.
    pub fn register_field(&self, field: &FieldRc) {
        self.fields.insert(field.token, field.clone());
    }

    /// Registers a loaded method by token.
    pub fn register_method(&self, method: &MethodRc) {
        self.methods.insert(method.token, method.clone());
    }

    /// Registers a loaded property by token.
    pub fn register_property(&self, property: &PropertyRc) {
        self.properties.insert(property.token, property.clone());
    }

    /// Registers a loaded module.
    pub fn register_module(&self, module: &ModuleRc) {
        self.modules.push(module.clone());
    }

    // ---- lookups ----------------------------------------------------------------------------

    /// Looks a type up by token.
    #[must_use]
    pub fn type_by_token(&self, token: Token) -> Option<TypeRc> {
        self.types.get(&token).map(|e| e.value().clone())
    }

    /// Looks a field up by token.
    #[must_use]
    pub fn field_by_token(&self, token: Token) -> Option<FieldRc> {
        self.fields.get(&token).map(|e| e.value().clone())
    }

    /// Looks a method up by token.
    #[must_use]
    pub fn method_by_token(&self, token: Token) -> Option<MethodRc> {
        self.methods.get(&token).map(|e| e.value().clone())
    }

    /// Looks a property up by token.
    #[must_use]
    pub fn property_by_token(&self, token: Token) -> Option<PropertyRc> {
        self.properties.get(&token).map(|e| e.value().clone())
    }

    /// Looks a type up by its full name.
    #[must_use]
    pub fn type_by_fullname(&self, full_name: &str) -> Option<TypeRc> {
        self.types_by_name.get(full_name).map(|e| e.value().clone())
    }

    /// Looks a type up by namespace and name.
    #[must_use]
    pub fn get_type_by_name(&self, namespace: &str, name: &str) -> Option<TypeRc> {
        if namespace.is_empty() {
            self.type_by_fullname(name)
        } else {
            self.type_by_fullname(&format!("{namespace}.{name}"))
        }
    }

    /// Snapshot of every type currently in the graph, in token order.
    #[must_use]
    pub fn all_types(&self) -> Vec<TypeRc> {
        self.types.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of every registered module.
    #[must_use]
    pub fn all_modules(&self) -> Vec<ModuleRc> {
        self.modules.iter().map(|(_, m)| m.clone()).collect()
    }

    // ---- mutation control -------------------------------------------------------------------

    /// Acquires exclusive mutation rights on one type for the returned scope's lifetime.
    #[must_use]
    pub fn mutate_type<'a>(&self, ty: &'a TypeRc) -> TypeMutator<'a> {
        TypeMutator {
            unit: ty,
            guard: ty.data_mut(),
        }
    }

    /// Acquires exclusive mutation rights on one field for the returned scope's lifetime.
    #[must_use]
    pub fn mutate_field<'a>(&self, field: &'a FieldRc) -> FieldMutator<'a> {
        FieldMutator {
            guard: field.data_mut(),
        }
    }

    /// Acquires exclusive mutation rights on one method for the returned scope's lifetime.
    #[must_use]
    pub fn mutate_method<'a>(&self, method: &'a MethodRc) -> MethodMutator<'a> {
        MethodMutator {
            guard: method.data_mut(),
        }
    }

    /// Acquires exclusive mutation rights on one property for the returned scope's lifetime.
    #[must_use]
    pub fn mutate_property<'a>(&self, property: &'a PropertyRc) -> PropertyMutator<'a> {
        PropertyMutator {
            guard: property.data_mut(),
        }
    }

    /// Acquires exclusive mutation rights on one module for the returned scope's lifetime.
    #[must_use]
    pub fn mutate_module<'a>(&self, module: &'a ModuleRc) -> ModuleMutator<'a> {
        ModuleMutator {
            guard: module.data_mut(),
        }
    }

    /// True once the type has already been fully resolved.
    ///
    /// Used to make resolution idempotent: a unit re-enqueued after a transient fault must not
    /// redo completed work.
    #[must_use]
    pub fn has_type(&self, ty: &TypeRc) -> bool {
        ty.is_resolved()
    }

    /// (Re-)registers a type under its computed full name for later name-based lookup.
    ///
    /// Calling this more than once for the same type is a harmless overwrite.
    pub fn add_type(&self, ty: &TypeRc) {
        self.types_by_name.insert(ty.full_name(), ty.clone());
    }

    /// Clones a property shape for attaching to a different declaring type.
    ///
    /// The clone carries the template's type and resolution state under a fresh token; the
    /// declaring-type linkage is left unset for the caller to establish.
    #[must_use]
    pub fn create_property(&self, template: &PropertyRc) -> PropertyRc {
        let token = self.alloc_token(TokenTable::Property);
        let property = Arc::new(PropertyUnit::new(
            token,
            template.name.clone(),
            template.descriptor().cloned(),
        ));
        {
            let template_data = template.data();
            let mut data = property.data_mut();
            data.property_type = template_data.property_type.clone();
            data.has_open_generic_params = template_data.has_open_generic_params;
        }
        if template.is_resolved() {
            property.mark_resolved();
        }
        self.properties.insert(token, property.clone());
        property
    }

    // ---- string interning -------------------------------------------------------------------

    /// Interns a string literal, returning its stable id.
    pub fn intern_string(&self, value: &str) -> u32 {
        if let Some(id) = self.string_ids.get(value) {
            return *id;
        }
        *self
            .string_ids
            .entry(value.to_string())
            .or_insert_with(|| {
                u32::try_from(self.strings.push(value.to_string())).unwrap_or(u32::MAX)
            })
    }

    /// Looks an interned string up by id.
    #[must_use]
    pub fn lookup_string(&self, id: u32) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    // ---- backlogs ---------------------------------------------------------------------------

    pub(crate) fn defer_array(&self, ty: TypeRc) {
        lock!(self.array_backlog).push_back(ty);
    }

    /// Removes and returns the oldest array type awaiting specialization.
    #[must_use]
    pub fn pop_pending_array(&self) -> Option<TypeRc> {
        lock!(self.array_backlog).pop_front()
    }

    /// Number of array types still awaiting specialization.
    #[must_use]
    pub fn pending_array_count(&self) -> usize {
        lock!(self.array_backlog).len()
    }

    pub(crate) fn defer_unit(&self, unit: Unit) {
        lock!(self.deferred_units).push_back(unit);
    }

    pub(crate) fn drain_deferred_units(&self) -> Vec<Unit> {
        lock!(self.deferred_units).drain(..).collect()
    }

    // ---- type materialization ---------------------------------------------------------------

    /// Canonical find-or-create for a type signature.
    ///
    /// Primitives resolve against the seeded `System.*` set; token references resolve against
    /// the registered tables; constructed shapes (arrays, pointers, by-refs, generic
    /// instantiations, parameter placeholders) are materialized on first reference and reused
    /// afterwards. A token that is not registered yet yields the transient
    /// [`Error::NotYetResolvable`], which the driver recovers from by re-enqueueing.
    ///
    /// # Errors
    /// Returns [`Error::MissingWellKnownType`] when a primitive's `System.*` backing type is
    /// absent, and [`Error::NotYetResolvable`] for unregistered tokens.
    pub fn get_type(&self, signature: &TypeSig) -> Result<TypeRc> {
        if let Some(name) = signature.primitive_name() {
            return self
                .get_type_by_name("System", name)
                .ok_or_else(|| Error::MissingWellKnownType(format!("System.{name}")));
        }

        match signature {
            TypeSig::Class(token) | TypeSig::ValueType(token) => self
                .type_by_token(*token)
                .ok_or(Error::NotYetResolvable(*token)),
            TypeSig::Var(index) => self.materialize_placeholder(format!("!{index}"), signature),
            TypeSig::MVar(index) => self.materialize_placeholder(format!("!!{index}"), signature),
            TypeSig::Pinned(inner) => self.get_type(inner),
            TypeSig::SzArray(inner) => self.materialize_vector_array(inner, signature),
            TypeSig::Array { element, rank } => {
                let element = self.get_type(element)?;
                let name = format!("{}[{}]", element.name, ",".repeat(rank.saturating_sub(1) as usize));
                let array_base = self.get_type_by_name("System", "Array");
                let type_name = name.clone();
                self.find_or_create(&element.namespace, name, || {
                    let ty = Arc::new(TypeUnit::new(
                        self.alloc_token(TokenTable::TypeDef),
                        element.namespace.clone(),
                        type_name,
                        signature.clone(),
                        TypeAttributes::SEALED,
                        ArrayInfo::MultiDim { rank: *rank },
                        Vec::new(),
                        None,
                    ));
                    {
                        let mut data = ty.data_mut();
                        data.element_type = Some(TypeRef::new(&element));
                        data.base_type = array_base.as_ref().map(TypeRef::new);
                        data.has_open_generic_params = signature.has_open_generic_params();
                    }
                    ty.mark_resolved();
                    ty
                })
            }
            TypeSig::Ptr(inner) => self.materialize_decorated(inner, "*", signature),
            TypeSig::ByRef(inner) => self.materialize_decorated(inner, "&", signature),
            TypeSig::GenericInst(element, args) => self.materialize_instantiation(
                element,
                args,
                signature,
            ),
            _ => Err(structural_error!(
                "signature {:?} cannot be materialized",
                signature
            )),
        }
    }

    fn materialize_placeholder(&self, name: String, signature: &TypeSig) -> Result<TypeRc> {
        let type_name = name.clone();
        self.find_or_create("", name, || {
            let ty = Arc::new(TypeUnit::new(
                self.alloc_token(TokenTable::TypeDef),
                "",
                type_name,
                signature.clone(),
                TypeAttributes::default(),
                ArrayInfo::None,
                Vec::new(),
                None,
            ));
            ty.data_mut().has_open_generic_params = true;
            ty.mark_resolved();
            ty
        })
    }

    fn materialize_vector_array(&self, element: &TypeSig, signature: &TypeSig) -> Result<TypeRc> {
        let element = self.get_type(element)?;
        let name = format!("{}[]", element.name);
        let array_base = self.get_type_by_name("System", "Array");
        let type_name = name.clone();
        self.find_or_create(&element.namespace, name, || {
            let ty = Arc::new(TypeUnit::new(
                self.alloc_token(TokenTable::TypeDef),
                element.namespace.clone(),
                type_name,
                signature.clone(),
                TypeAttributes::SEALED,
                ArrayInfo::Vector,
                Vec::new(),
                None,
            ));
            {
                let mut data = ty.data_mut();
                data.element_type = Some(TypeRef::new(&element));
                data.base_type = array_base.as_ref().map(TypeRef::new);
                data.has_open_generic_params = signature.has_open_generic_params();
            }
            ty.mark_resolved();
            self.defer_array(ty.clone());
            ty
        })
    }

    fn materialize_decorated(
        &self,
        inner: &TypeSig,
        decoration: &str,
        signature: &TypeSig,
    ) -> Result<TypeRc> {
        let inner = self.get_type(inner)?;
        let name = format!("{}{decoration}", inner.name);
        let type_name = name.clone();
        self.find_or_create(&inner.namespace, name, || {
            let ty = Arc::new(TypeUnit::new(
                self.alloc_token(TokenTable::TypeDef),
                inner.namespace.clone(),
                type_name,
                signature.clone(),
                TypeAttributes::default(),
                ArrayInfo::None,
                Vec::new(),
                None,
            ));
            {
                let mut data = ty.data_mut();
                data.element_type = Some(TypeRef::new(&inner));
                data.has_open_generic_params = signature.has_open_generic_params();
            }
            ty.mark_resolved();
            ty
        })
    }

    fn materialize_instantiation(
        &self,
        element: &TypeSig,
        args: &[TypeSig],
        signature: &TypeSig,
    ) -> Result<TypeRc> {
        let open = self.get_type(element)?;
        let arg_types = args
            .iter()
            .map(|arg| self.get_type(arg))
            .collect::<Result<Vec<_>>>()?;
        let arg_names = arg_types
            .iter()
            .map(|arg| arg.full_name())
            .collect::<Vec<_>>()
            .join(",");
        let name = format!("{}<{arg_names}>", open.name);
        let type_name = name.clone();

        self.find_or_create(&open.namespace, name, || {
            let ty = Arc::new(TypeUnit::new(
                self.alloc_token(TokenTable::TypeDef),
                open.namespace.clone(),
                type_name,
                signature.clone(),
                open.attributes,
                ArrayInfo::None,
                arg_types.clone(),
                None,
            ));
            {
                let open_data = open.data();
                let mut data = ty.data_mut();
                data.element_type = Some(TypeRef::new(&open));
                data.has_open_generic_params = signature.has_open_generic_params();

                // Member skeletons share the definition's tokens so token scans on the
                // instantiation find them; their substituted shapes are resolved later.
                for (key, field) in open_data.fields.iter() {
                    let clone = Arc::new(FieldUnit::new(
                        field.token,
                        field.name.clone(),
                        field.descriptor().cloned(),
                    ));
                    clone.data_mut().declaring_type = Some(TypeRef::new(&ty));
                    data.fields.try_add(key, clone.clone());
                    self.defer_unit(Unit::Field(clone));
                }
                for (key, method) in open_data.methods.iter() {
                    let clone = Arc::new(MethodUnit::new(
                        method.token,
                        method.name.clone(),
                        Vec::new(),
                        method.descriptor().cloned(),
                    ));
                    clone.data_mut().declaring_type = Some(TypeRef::new(&ty));
                    data.methods.try_add(key, clone.clone());
                    self.defer_unit(Unit::Method(clone));
                }
                for (key, property) in open_data.properties.iter() {
                    let clone = Arc::new(PropertyUnit::new(
                        property.token,
                        property.name.clone(),
                        property.descriptor().cloned(),
                    ));
                    clone.data_mut().declaring_type = Some(TypeRef::new(&ty));
                    data.properties.try_add(key, clone.clone());
                    self.defer_unit(Unit::Property(clone));
                }
            }
            self.defer_unit(Unit::Type(ty.clone()));
            ty
        })
    }

    /// Finds a type by its qualified name or creates and registers it exactly once.
    ///
    /// The create callback must not touch the name index; everything it needs has to be
    /// resolved up front, otherwise concurrent materialization of the same name could race
    /// or self-deadlock on the index shard.
    fn find_or_create(
        &self,
        namespace: &str,
        name: String,
        create: impl FnOnce() -> TypeRc,
    ) -> Result<TypeRc> {
        let key = if namespace.is_empty() {
            name
        } else {
            format!("{namespace}.{name}")
        };
        if let Some(existing) = self.types_by_name.get(&key) {
            return Ok(existing.clone());
        }
        match self.types_by_name.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let ty = create();
                self.types.insert(ty.token, ty.clone());
                entry.insert(ty.clone());
                Ok(ty)
            }
        }
    }

    /// Finds or creates the closed instantiation of a generic method on its declaring type.
    ///
    /// The instance shares the definition's token, carries the resolved argument list and is
    /// deferred for regular resolution.
    ///
    /// # Errors
    /// Propagates [`Error::NotYetResolvable`] when an argument type is not materialized yet.
    pub fn get_method_instance(
        &self,
        parent: &TypeRc,
        definition: &MethodRc,
        args: Vec<TypeSig>,
    ) -> Result<MethodRc> {
        let arg_types = args
            .iter()
            .map(|arg| self.get_type(arg))
            .collect::<Result<Vec<_>>>()?;
        let arg_names = arg_types
            .iter()
            .map(|arg| arg.full_name())
            .collect::<Vec<_>>()
            .join(",");
        let key = format!("{}<{arg_names}>", definition.name);

        if let Some(existing) = parent.data().methods.get(&key) {
            return Ok(existing.clone());
        }

        let instance = Arc::new(MethodUnit::new(
            definition.token,
            definition.name.clone(),
            arg_types,
            definition.descriptor().cloned(),
        ));
        instance.data_mut().declaring_type = Some(TypeRef::new(parent));

        let mut parent_data = self.mutate_type(parent);
        if !parent_data.methods.try_add(key.clone(), instance.clone()) {
            // Lost the race against a concurrent instantiation of the same method
            let existing = parent_data.methods.get(&key).cloned();
            if let Some(existing) = existing {
                return Ok(existing);
            }
        }
        drop(parent_data);

        self.defer_unit(Unit::Method(instance.clone()));
        Ok(instance)
    }
}

impl Default for UnitGraph {
    fn default() -> Self {
        UnitGraph::new()
    }
}
