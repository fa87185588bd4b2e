use std::collections::HashSet;

use crate::{
    metadata::typesystem::{ArrayInfo, MethodRc, PropertyRc, TypeRc, TypeRef, UnitGraph},
    Error, Result,
};

/// Upper bound on base-type chain walks; a longer chain indicates a cycle in the metadata.
const MAX_INHERITANCE_DEPTH: usize = 100;

/// Well-known name of the generic helper type that array member sets specialize.
const SZ_HELPER_NAME: &str = "SZArrayHelper";
/// Alternate nested spelling of the helper used by some core libraries.
const SZ_HELPER_NESTED_NAME: &str = "Array+SZArrayHelper";

/// Propagates interface implementations through inheritance chains.
///
/// Runs once, single-threaded, over the settled graph. The first sweep tops up every
/// descriptor-bearing type's direct links (base, declaring, enum element type, directly
/// declared interfaces); interface propagation then iterates to a true fixed point - sweeps
/// repeat until no type gains an interface anywhere. Diamond repeats are no-ops by
/// construction since the interface set is keyed by full name.
///
/// # Errors
/// Fails on unresolvable link signatures and on inheritance chains longer than
/// [`MAX_INHERITANCE_DEPTH`] (a base-type cycle).
pub(crate) fn patch_connections(graph: &UnitGraph) -> Result<()> {
    for ty in graph.all_types() {
        let Some(desc) = ty.descriptor() else {
            continue;
        };

        let base = match &desc.base {
            Some(sig) => Some(graph.get_type(sig)?),
            None => None,
        };
        let declaring = match &desc.declaring {
            Some(sig) => Some(graph.get_type(sig)?),
            None => None,
        };
        let element = match &desc.enum_underlying {
            Some(sig) => Some(graph.get_type(sig)?),
            None => None,
        };
        let mut direct = Vec::with_capacity(desc.interfaces.len());
        for sig in &desc.interfaces {
            direct.push(graph.get_type(sig)?);
        }

        let mut mutator = graph.mutate_type(&ty);
        if let Some(base) = base {
            mutator.base_type = Some(TypeRef::new(&base));
        }
        if let Some(declaring) = declaring {
            mutator.declaring_type = Some(TypeRef::new(&declaring));
        }
        if let Some(element) = element {
            mutator.element_type = Some(TypeRef::new(&element));
        }
        for iface in direct {
            mutator
                .interfaces
                .entry(iface.full_name())
                .or_insert_with(|| TypeRef::new(&iface));
        }
    }

    loop {
        let mut changed = false;
        for ty in graph.all_types() {
            let missing = collect_ancestor_interfaces(&ty)?;
            if missing.is_empty() {
                continue;
            }
            let mut mutator = graph.mutate_type(&ty);
            for (name, iface) in missing {
                if mutator.interfaces.insert(name, iface).is_none() {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    Ok(())
}

/// Walks the ancestor chain nearest-first and returns every interface not yet present on the
/// type itself.
fn collect_ancestor_interfaces(ty: &TypeRc) -> Result<Vec<(String, TypeRef)>> {
    let mut present: HashSet<String> = ty.data().interfaces.keys().cloned().collect();
    let mut missing = Vec::new();

    let mut ancestor = ty.base_type().and_then(|base| base.upgrade());
    let mut depth = 0;
    while let Some(base) = ancestor {
        if depth >= MAX_INHERITANCE_DEPTH {
            return Err(structural_error!(
                "inheritance chain of {} exceeds {} levels",
                ty.full_name(),
                MAX_INHERITANCE_DEPTH
            ));
        }
        let next = {
            let base_data = base.data();
            for (name, iface) in &base_data.interfaces {
                if present.insert(name.clone()) {
                    missing.push((name.clone(), iface.clone()));
                }
            }
            base_data.base_type.clone()
        };
        ancestor = next.and_then(|base| base.upgrade());
        depth += 1;
    }

    Ok(missing)
}

/// Materializes the member set of a single-dimension array type by specializing the shared
/// generic array helper.
///
/// Every helper method whose first generic argument is the array's element type is
/// re-parented onto the array and installed in its method map, replacing any same-identity
/// member; helper properties are cloned onto the array through the graph's property cloning.
/// The array's interface set is deliberately left as previously assigned.
///
/// # Errors
/// Returns [`Error::NotVectorArray`] for non-vector arguments and
/// [`Error::MissingWellKnownType`] when neither helper spelling exists in the loaded core
/// library.
pub(crate) fn resolve_sz_array(graph: &UnitGraph, array: &TypeRc) -> Result<()> {
    if array.array != ArrayInfo::Vector {
        return Err(Error::NotVectorArray(array.token));
    }

    let helper = graph
        .get_type_by_name("System", SZ_HELPER_NAME)
        .or_else(|| graph.get_type_by_name("System", SZ_HELPER_NESTED_NAME))
        .ok_or_else(|| Error::MissingWellKnownType(format!("System.{SZ_HELPER_NAME}")))?;

    let element = array
        .element_type()
        .and_then(|element| element.upgrade())
        .ok_or_else(|| structural_error!("array {} has no element type", array.full_name()))?;

    let selected: Vec<MethodRc> = helper
        .data()
        .methods
        .values()
        .filter(|method| {
            method
                .generic_arguments
                .first()
                .is_some_and(|arg| arg.token == element.token)
        })
        .cloned()
        .collect();

    for method in selected {
        {
            let mut mutator = graph.mutate_method(&method);
            mutator.declaring_type = Some(TypeRef::new(array));
        }
        let mut mutator = graph.mutate_type(array);
        mutator.methods.add_or_update(method.name.clone(), method.clone());
    }

    let templates: Vec<PropertyRc> = helper.data().properties.values().cloned().collect();
    for template in templates {
        let clone = graph.create_property(&template);
        {
            let mut mutator = graph.mutate_property(&clone);
            mutator.declaring_type = Some(TypeRef::new(array));
        }
        let mut mutator = graph.mutate_type(array);
        mutator.properties.try_add(clone.name.clone(), clone.clone());
    }

    Ok(())
}
