use crate::metadata::signatures::TypeSig;

/// Substitutes bound values for generic type and method parameters inside a signature.
///
/// A resolver is transient, per-resolution-call state: each resolution procedure builds its
/// own instance, pushes at most one type-level and one method-level binding context, and
/// throws the resolver away afterwards. Instances are never shared across workers, which is
/// what makes substitution trivially safe to run from many resolver threads at once.
///
/// Substitution is purely structural. A parameter with no binding in scope is preserved
/// unchanged - a type may legitimately remain open.
#[derive(Debug, Default)]
pub struct GenericArgumentResolver {
    type_arguments: Option<Vec<TypeSig>>,
    method_arguments: Option<Vec<TypeSig>>,
}

impl GenericArgumentResolver {
    /// Creates a resolver with no bindings in scope.
    #[must_use]
    pub fn new() -> Self {
        GenericArgumentResolver::default()
    }

    /// Installs the type-level binding context.
    ///
    /// Must be called before any [`resolve`](Self::resolve) that depends on type parameters.
    /// At most one type-level context per resolver instance; this is not a stack.
    pub fn push_type_generic_arguments(&mut self, args: Vec<TypeSig>) {
        debug_assert!(
            self.type_arguments.is_none(),
            "type-level bindings already pushed"
        );
        self.type_arguments = Some(args);
    }

    /// Installs the method-level binding context.
    ///
    /// At most one method-level context per resolver instance; this is not a stack.
    pub fn push_method_generic_arguments(&mut self, args: Vec<TypeSig>) {
        debug_assert!(
            self.method_arguments.is_none(),
            "method-level bindings already pushed"
        );
        self.method_arguments = Some(args);
    }

    /// Returns an equivalent signature with every bound generic parameter replaced by its
    /// binding, recursing structurally through constructed shapes.
    #[must_use]
    pub fn resolve(&self, signature: &TypeSig) -> TypeSig {
        match signature {
            TypeSig::Var(index) => self
                .type_arguments
                .as_ref()
                .and_then(|args| args.get(*index as usize))
                .cloned()
                .unwrap_or_else(|| signature.clone()),
            TypeSig::MVar(index) => self
                .method_arguments
                .as_ref()
                .and_then(|args| args.get(*index as usize))
                .cloned()
                .unwrap_or_else(|| signature.clone()),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(self.resolve(inner))),
            TypeSig::Array { element, rank } => TypeSig::Array {
                element: Box::new(self.resolve(element)),
                rank: *rank,
            },
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(self.resolve(inner))),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(self.resolve(inner))),
            TypeSig::Pinned(inner) => TypeSig::Pinned(Box::new(self.resolve(inner))),
            TypeSig::GenericInst(element, args) => TypeSig::GenericInst(
                Box::new(self.resolve(element)),
                args.iter().map(|arg| self.resolve(arg)).collect(),
            ),
            _ => signature.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::metadata::token::Token;

    use super::*;

    #[test]
    fn test_bound_type_parameter_is_substituted() {
        let mut resolver = GenericArgumentResolver::new();
        resolver.push_type_generic_arguments(vec![TypeSig::I4, TypeSig::String]);

        assert_eq!(resolver.resolve(&TypeSig::Var(0)), TypeSig::I4);
        assert_eq!(resolver.resolve(&TypeSig::Var(1)), TypeSig::String);
    }

    #[test]
    fn test_unbound_parameter_is_preserved() {
        let resolver = GenericArgumentResolver::new();
        assert_eq!(resolver.resolve(&TypeSig::Var(0)), TypeSig::Var(0));
        assert_eq!(resolver.resolve(&TypeSig::MVar(3)), TypeSig::MVar(3));

        // A binding list that is too short leaves the out-of-range parameter open
        let mut resolver = GenericArgumentResolver::new();
        resolver.push_type_generic_arguments(vec![TypeSig::I4]);
        assert_eq!(resolver.resolve(&TypeSig::Var(1)), TypeSig::Var(1));
    }

    #[test]
    fn test_method_and_type_bindings_are_independent() {
        let mut resolver = GenericArgumentResolver::new();
        resolver.push_type_generic_arguments(vec![TypeSig::I4]);
        resolver.push_method_generic_arguments(vec![TypeSig::String]);

        assert_eq!(resolver.resolve(&TypeSig::Var(0)), TypeSig::I4);
        assert_eq!(resolver.resolve(&TypeSig::MVar(0)), TypeSig::String);
    }

    #[test]
    fn test_substitution_recurses_into_constructed_types() {
        let mut resolver = GenericArgumentResolver::new();
        resolver.push_type_generic_arguments(vec![TypeSig::I4]);

        let open = TypeSig::SzArray(Box::new(TypeSig::GenericInst(
            Box::new(TypeSig::Class(Token::new(0x02000001))),
            vec![TypeSig::Var(0), TypeSig::Ptr(Box::new(TypeSig::Var(0)))],
        )));
        let closed = resolver.resolve(&open);

        let expected = TypeSig::SzArray(Box::new(TypeSig::GenericInst(
            Box::new(TypeSig::Class(Token::new(0x02000001))),
            vec![TypeSig::I4, TypeSig::Ptr(Box::new(TypeSig::I4))],
        )));
        assert_eq!(closed, expected);
        assert!(!closed.has_open_generic_params());
    }

    #[test]
    fn test_byref_and_pinned_are_traversed() {
        let mut resolver = GenericArgumentResolver::new();
        resolver.push_method_generic_arguments(vec![TypeSig::R8]);

        assert_eq!(
            resolver.resolve(&TypeSig::ByRef(Box::new(TypeSig::MVar(0)))),
            TypeSig::ByRef(Box::new(TypeSig::R8))
        );
        assert_eq!(
            resolver.resolve(&TypeSig::Pinned(Box::new(TypeSig::MVar(0)))),
            TypeSig::Pinned(Box::new(TypeSig::R8))
        );
    }
}
