use std::sync::Arc;

use crate::{
    metadata::{
        method::{
            opcodes, ExceptionBlock, Instruction, LocalVariable, Operand, RawBody, RawOperand,
        },
        signatures::TypeSig,
        token::Token,
        typesystem::{
            ArrayInfo, FieldRc, FieldRef, GenericArgumentResolver, MethodRc, MethodRef,
            MethodSignature, Parameter, TypeRc, TypeRef, UnitGraph,
        },
    },
    Error, Result,
};

use super::attributes::resolve_custom_attributes;

/// Everything a body resolution produces, staged for a single atomic commit.
struct ResolvedBody {
    locals: Vec<LocalVariable>,
    handlers: Vec<ExceptionBlock>,
    code: Vec<Instruction>,
    max_stack: u16,
}

/// Resolves method signatures and instruction streams against the unit graph.
///
/// The resolver walks a method's raw body and turns every operand into a resolved graph
/// handle. All results are computed up front and committed under one mutator scope, so a
/// failure anywhere leaves the method untouched for outside readers - the body update either
/// commits completely or not at all.
pub(crate) struct MethodResolver {
    graph: Arc<UnitGraph>,
}

impl MethodResolver {
    pub(crate) fn new(graph: Arc<UnitGraph>) -> Self {
        MethodResolver { graph }
    }

    /// Resolves one method: signature, overrides, custom attributes and body.
    ///
    /// Re-resolving an already resolved method is a no-op, which makes duplicate enqueues
    /// harmless. Methods without a descriptor are skipped entirely.
    pub(crate) fn resolve_method(&self, method: &MethodRc) -> Result<()> {
        let Some(desc) = method.descriptor() else {
            return Ok(());
        };
        if method.is_resolved() {
            return Ok(());
        }

        let declaring = method
            .data()
            .declaring_type
            .as_ref()
            .and_then(TypeRef::upgrade)
            .ok_or_else(|| {
                structural_error!("method {} has no declaring type", method.token)
            })?;

        let mut resolver = GenericArgumentResolver::new();
        let mut has_open = declaring.has_open_generic_params();

        if !declaring.generic_arguments.is_empty() {
            let args: Vec<TypeSig> = declaring
                .generic_arguments
                .iter()
                .map(|arg| arg.signature.clone())
                .collect();
            has_open |= args.iter().any(TypeSig::has_open_generic_params);
            resolver.push_type_generic_arguments(args);
        }

        if !method.generic_arguments.is_empty() {
            let args: Vec<TypeSig> = method
                .generic_arguments
                .iter()
                .map(|arg| arg.signature.clone())
                .collect();
            has_open |= args.iter().any(TypeSig::has_open_generic_params);
            resolver.push_method_generic_arguments(args);
        }

        let return_type = self.graph.get_type(&resolver.resolve(&desc.signature.return_type))?;
        has_open |= return_type.has_open_generic_params();

        let mut params = Vec::with_capacity(desc.signature.params.len());
        for param in &desc.signature.params {
            let param_type = self.graph.get_type(&resolver.resolve(&param.signature))?;
            has_open |= param_type.has_open_generic_params();
            params.push(Parameter {
                name: param.name.clone(),
                param_type: TypeRef::new(&param_type),
            });
        }

        let mut overrides = Vec::with_capacity(desc.overrides.len());
        for target in &desc.overrides {
            let parent = self.graph.get_type(&resolver.resolve(&target.parent))?;
            let overridden = self.find_method_by_token(&parent, target.token)?;
            overrides.push(MethodRef::new(&overridden));
        }

        let attributes = resolve_custom_attributes(&self.graph, &desc.custom_attributes)?;

        let body = match &desc.body {
            Some(raw) => Some(self.resolve_body(raw, &resolver)?),
            None => None,
        };

        {
            let mut mutator = self.graph.mutate_method(method);
            mutator.signature = Some(MethodSignature {
                return_type: TypeRef::new(&return_type),
                params,
            });
            mutator.overrides = overrides;
            mutator.has_open_generic_params = has_open;
            if let Some(body) = body {
                mutator.local_variables = body.locals;
                mutator.exception_blocks = body.handlers;
                mutator.code = body.code;
                mutator.max_stack = body.max_stack;
            }
        }
        for attribute in attributes {
            method.custom_attributes.push(attribute);
        }
        method.mark_resolved();
        Ok(())
    }

    fn resolve_body(
        &self,
        raw: &RawBody,
        resolver: &GenericArgumentResolver,
    ) -> Result<ResolvedBody> {
        let mut locals = Vec::with_capacity(raw.locals.len());
        for (index, local) in raw.locals.iter().enumerate() {
            let ty = self.graph.get_type(&resolver.resolve(&local.signature))?;
            locals.push(LocalVariable {
                name: local
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("V_{index}")),
                ty: TypeRef::new(&ty),
                pinned: local.pinned,
            });
        }

        let mut handlers = Vec::with_capacity(raw.exception_handlers.len());
        for handler in &raw.exception_handlers {
            let catch_type = match &handler.catch_type {
                Some(sig) => Some(TypeRef::new(
                    &self.graph.get_type(&resolver.resolve(sig))?,
                )),
                None => None,
            };
            handlers.push(ExceptionBlock {
                flags: handler.flags,
                try_start: handler.try_start,
                try_end: handler.try_end,
                handler_start: handler.handler_start,
                handler_end: handler.handler_end,
                catch_type,
                filter_start: handler.filter_start,
            });
        }

        let mut code = Vec::with_capacity(raw.instructions.len());
        for index in 0..raw.instructions.len() {
            code.push(self.resolve_instruction(raw, index, resolver)?);
        }

        Ok(ResolvedBody {
            locals,
            handlers,
            code,
            max_stack: raw.max_stack,
        })
    }

    fn resolve_instruction(
        &self,
        raw: &RawBody,
        index: usize,
        resolver: &GenericArgumentResolver,
    ) -> Result<Instruction> {
        let instruction = &raw.instructions[index];
        let previous = (index > 0).then(|| raw.instructions[index - 1].offset);
        let next = (index + 1 < raw.instructions.len())
            .then(|| raw.instructions[index + 1].offset);

        // newarr always targets the single-dimension vector variant, however the raw
        // operand was expressed
        let operand = if instruction.opcode == opcodes::NEWARR {
            let RawOperand::Type(sig) = &instruction.operand else {
                return Err(structural_error!(
                    "newarr at offset {} carries a non-type operand",
                    instruction.offset
                ));
            };
            let element = resolver.resolve(sig);
            let array = self
                .graph
                .get_type(&TypeSig::SzArray(Box::new(element)))?;
            Operand::Type(TypeRef::new(&array))
        } else {
            match &instruction.operand {
                RawOperand::None => Operand::None,
                RawOperand::Type(sig) => {
                    let ty = self.graph.get_type(&resolver.resolve(sig))?;
                    Operand::Type(TypeRef::new(&ty))
                }
                RawOperand::Field { parent, token } => {
                    let field = self.resolve_field_target(parent, *token, resolver)?;
                    Operand::Field(FieldRef::new(&field))
                }
                RawOperand::Method {
                    parent,
                    token,
                    name,
                } => {
                    let method = self.resolve_method_target(parent, *token, name, resolver)?;
                    Operand::Method(MethodRef::new(&method))
                }
                RawOperand::MethodSpec {
                    parent,
                    token,
                    name,
                    args,
                } => {
                    let parent_type = self.graph.get_type(&resolver.resolve(parent))?;
                    let definition =
                        self.resolve_method_target(parent, *token, name, resolver)?;
                    let closed_args: Vec<TypeSig> =
                        args.iter().map(|arg| resolver.resolve(arg)).collect();
                    let instance =
                        self.graph
                            .get_method_instance(&parent_type, &definition, closed_args)?;
                    Operand::Method(MethodRef::new(&instance))
                }
                RawOperand::Local(slot) => Operand::Local(*slot),
                RawOperand::Parameter(slot) => Operand::Parameter(*slot),
                RawOperand::Target(offset) => Operand::Target(*offset),
                RawOperand::Switch(offsets) => Operand::Switch(offsets.clone()),
                RawOperand::String(value) => Operand::String(self.graph.intern_string(value)),
                RawOperand::I32(value) => Operand::I32(*value),
                RawOperand::I64(value) => Operand::I64(*value),
                RawOperand::R32(value) => Operand::R32(*value),
                RawOperand::R64(value) => Operand::R64(*value),
            }
        };

        Ok(Instruction {
            offset: instruction.offset,
            opcode: renumber_opcode(instruction.opcode),
            operand,
            previous,
            next,
            span: instruction.span.clone(),
        })
    }

    fn resolve_field_target(
        &self,
        parent: &TypeSig,
        token: Token,
        resolver: &GenericArgumentResolver,
    ) -> Result<FieldRc> {
        let ty = self.graph.get_type(&resolver.resolve(parent))?;
        let found = ty.data().fields.values().find(|f| f.token == token).cloned();
        found.ok_or_else(|| missing_member(&ty, token))
    }

    fn resolve_method_target(
        &self,
        parent: &TypeSig,
        token: Token,
        name: &str,
        resolver: &GenericArgumentResolver,
    ) -> Result<MethodRc> {
        let ty = self.graph.get_type(&resolver.resolve(parent))?;

        // Array pseudo-methods (Get, Set, AddressOf, .ctor) redirect to the members
        // synthesized onto the specialized array type
        if ty.array != ArrayInfo::None {
            let found = ty.data().methods.values().find(|m| m.name == name).cloned();
            return found.ok_or(Error::ArrayMemberPending(token));
        }

        self.find_method_by_token(&ty, token)
    }

    fn find_method_by_token(&self, ty: &TypeRc, token: Token) -> Result<MethodRc> {
        let found = ty.data().methods.values().find(|m| m.token == token).cloned();
        found.ok_or_else(|| missing_member(ty, token))
    }
}

/// Opcode values above a single byte are renumbered into the compact `0x100+` range so
/// downstream consumers see one uniform encoding space.
pub(crate) fn renumber_opcode(code: u16) -> u16 {
    if code > 0xFF {
        0x100 + (code & 0xFF)
    } else {
        code
    }
}

fn missing_member(ty: &TypeRc, token: Token) -> Error {
    if ty.is_resolved() {
        Error::MemberNotFound {
            token,
            type_name: ty.full_name(),
        }
    } else {
        Error::NotYetResolvable(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumber_opcode() {
        assert_eq!(renumber_opcode(opcodes::RET), opcodes::RET);
        assert_eq!(renumber_opcode(opcodes::NEWARR), 0x8D);
        assert_eq!(renumber_opcode(opcodes::CEQ), 0x101);
        assert_eq!(renumber_opcode(opcodes::LDARG), 0x109);
        assert_eq!(renumber_opcode(opcodes::STLOC), 0x10E);
    }
}
