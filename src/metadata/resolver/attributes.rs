use crate::{
    metadata::{
        descriptors::{RawAttributeArgument, RawAttributeValue, RawCustomAttribute},
        typesystem::{
            AttributeArgument, AttributeValue, CustomAttribute, MethodRef,
            NamedAttributeArgument, TypeRef, UnitGraph,
        },
    },
    Error, Result,
};

/// Resolves a unit's raw custom attributes into graph-linked values.
///
/// The attribute constructor is located by token scan over the attribute type's methods; a
/// miss is a transient fault, since the attribute type's member list may not be populated
/// yet when units resolve out of order.
pub(crate) fn resolve_custom_attributes(
    graph: &UnitGraph,
    raw: &[RawCustomAttribute],
) -> Result<Vec<CustomAttribute>> {
    let mut resolved = Vec::with_capacity(raw.len());
    for attribute in raw {
        let attribute_type = graph.get_type(&attribute.attribute_type)?;
        let constructor = attribute_type
            .data()
            .methods
            .values()
            .find(|m| m.token == attribute.ctor)
            .cloned()
            .ok_or(Error::NotYetResolvable(attribute.ctor))?;

        let mut arguments = Vec::with_capacity(attribute.arguments.len());
        for argument in &attribute.arguments {
            arguments.push(resolve_argument(graph, argument)?);
        }

        let mut named_arguments = Vec::with_capacity(attribute.named_arguments.len());
        for named in &attribute.named_arguments {
            named_arguments.push(NamedAttributeArgument {
                name: named.name.clone(),
                is_field: named.is_field,
                argument: resolve_argument(graph, &named.argument)?,
            });
        }

        resolved.push(CustomAttribute {
            constructor: MethodRef::new(&constructor),
            arguments,
            named_arguments,
        });
    }
    Ok(resolved)
}

fn resolve_argument(graph: &UnitGraph, raw: &RawAttributeArgument) -> Result<AttributeArgument> {
    let value_type = graph.get_type(&raw.value_type)?;
    let value = match &raw.value {
        RawAttributeValue::String(value) => AttributeValue::String(value.clone()),
        RawAttributeValue::Type(sig) => AttributeValue::Type(TypeRef::new(&graph.get_type(sig)?)),
        RawAttributeValue::Int(value) => AttributeValue::Int(*value),
        RawAttributeValue::Float(value) => AttributeValue::Float(*value),
        RawAttributeValue::Bool(value) => AttributeValue::Bool(*value),
        RawAttributeValue::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_argument(graph, item)?);
            }
            AttributeValue::Array(resolved)
        }
    };
    Ok(AttributeArgument {
        value_type: TypeRef::new(&value_type),
        value,
    })
}
