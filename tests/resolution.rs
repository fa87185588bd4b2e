//! End-to-end resolution scenarios driven through the public API, with the test body playing
//! the role of the external metadata loader.

use std::sync::Arc;

use cilgraph::prelude::*;
use cilgraph::Error;

fn class(graph: &UnitGraph, token: u32, namespace: &str, name: &str, desc: TypeDescriptor) -> TypeRc {
    let token = Token::new(token);
    let ty = Arc::new(TypeUnit::new(
        token,
        namespace,
        name,
        TypeSig::Class(token),
        TypeAttributes::default(),
        ArrayInfo::None,
        Vec::new(),
        Some(desc),
    ));
    graph.register_type(&ty);
    ty
}

fn interface(graph: &UnitGraph, token: u32, namespace: &str, name: &str) -> TypeRc {
    let token = Token::new(token);
    let ty = Arc::new(TypeUnit::new(
        token,
        namespace,
        name,
        TypeSig::Class(token),
        TypeAttributes::INTERFACE,
        ArrayInfo::None,
        Vec::new(),
        Some(TypeDescriptor::default()),
    ));
    graph.register_type(&ty);
    ty
}

fn add_method(
    graph: &UnitGraph,
    owner: &TypeRc,
    token: u32,
    name: &str,
    generic_arguments: Vec<TypeRc>,
    descriptor: MethodDescriptor,
) -> MethodRc {
    let method = Arc::new(MethodUnit::new(
        Token::new(token),
        name,
        generic_arguments,
        Some(descriptor),
    ));
    // Closed instantiations are keyed by their full, argument-qualified name so several
    // specializations of one definition can coexist on the declaring type
    let key = if method.generic_arguments.is_empty() {
        name.to_string()
    } else {
        let args: Vec<String> = method
            .generic_arguments
            .iter()
            .map(|arg| arg.full_name())
            .collect();
        format!("{name}<{}>", args.join(","))
    };
    graph.mutate_method(&method).declaring_type = Some(TypeRef::new(owner));
    graph.mutate_type(owner).methods.try_add(key, method.clone());
    graph.register_method(&method);
    method
}

fn add_field(
    graph: &UnitGraph,
    owner: &TypeRc,
    token: u32,
    name: &str,
    signature: TypeSig,
) -> FieldRc {
    let field = Arc::new(FieldUnit::new(
        Token::new(token),
        name,
        Some(FieldDescriptor {
            signature,
            custom_attributes: Vec::new(),
        }),
    ));
    graph.mutate_field(&field).declaring_type = Some(TypeRef::new(owner));
    graph.mutate_type(owner).fields.try_add(name, field.clone());
    graph.register_field(&field);
    field
}

fn void_method_descriptor(body: Option<RawBody>) -> MethodDescriptor {
    MethodDescriptor {
        signature: RawMethodSignature {
            return_type: TypeSig::Void,
            params: Vec::new(),
        },
        overrides: Vec::new(),
        body,
        custom_attributes: Vec::new(),
    }
}

fn instruction(offset: u32, opcode: u16, operand: RawOperand) -> RawInstruction {
    RawInstruction {
        offset,
        opcode,
        operand,
        span: None,
    }
}

#[test]
fn minimal_module_resolves_end_to_end() {
    let graph = Arc::new(UnitGraph::new());
    let program = class(
        &graph,
        0x02000001,
        "Demo",
        "Program",
        TypeDescriptor {
            base: Some(TypeSig::Object),
            ..TypeDescriptor::default()
        },
    );
    let body = RawBody {
        max_stack: 1,
        locals: Vec::new(),
        exception_handlers: Vec::new(),
        instructions: vec![
            instruction(0, opcodes::LDC_I4, RawOperand::I32(42)),
            instruction(5, opcodes::RET, RawOperand::None),
        ],
    };
    let main = add_method(
        &graph,
        &program,
        0x06000001,
        "Main",
        Vec::new(),
        void_method_descriptor(Some(body)),
    );
    let module = Arc::new(ModuleUnit::new(
        Token::new(0x00000001),
        "Demo.exe",
        Some(ModuleDescriptor {
            entry_point: Some(main.token),
            custom_attributes: Vec::new(),
        }),
    ));
    graph.register_module(&module);

    let resolver = MetadataResolver::new(graph.clone());
    resolver.enqueue_for_resolve(Unit::Type(program.clone()));
    resolver.enqueue_for_resolve(Unit::Method(main.clone()));
    resolver.enqueue_for_resolve(Unit::Module(module.clone()));
    let stats = resolver.resolve().unwrap();

    assert!(program.is_resolved());
    assert!(main.is_resolved());
    assert_eq!(stats.resolved, 3);

    let data = main.data();
    assert_eq!(data.max_stack, 1);
    assert_eq!(data.code.len(), 2);
    assert_eq!(data.code[0].opcode, opcodes::LDC_I4);
    assert!(matches!(data.code[0].operand, Operand::I32(42)));
    assert_eq!(data.code[0].previous, None);
    assert_eq!(data.code[0].next, Some(5));
    assert_eq!(data.code[1].previous, Some(0));
    assert_eq!(data.code[1].next, None);
    assert_eq!(
        data.signature.as_ref().unwrap().return_type.full_name().as_deref(),
        Some("System.Void")
    );
    drop(data);

    assert_eq!(
        module.entry_point().and_then(|m| m.token()),
        Some(main.token)
    );
    assert_eq!(graph.pending_array_count(), 0);
}

#[test]
fn interfaces_propagate_transitively_and_idempotently() {
    let graph = Arc::new(UnitGraph::new());
    let i = interface(&graph, 0x02000001, "Demo", "IThing");
    let a = class(
        &graph,
        0x02000002,
        "Demo",
        "A",
        TypeDescriptor {
            base: Some(TypeSig::Object),
            interfaces: vec![TypeSig::Class(i.token)],
            ..TypeDescriptor::default()
        },
    );
    let b = class(
        &graph,
        0x02000003,
        "Demo",
        "B",
        TypeDescriptor {
            base: Some(TypeSig::Class(a.token)),
            // Diamond repeat: B declares IThing directly as well
            interfaces: vec![TypeSig::Class(i.token)],
            ..TypeDescriptor::default()
        },
    );
    let c = class(
        &graph,
        0x02000004,
        "Demo",
        "C",
        TypeDescriptor {
            base: Some(TypeSig::Class(b.token)),
            ..TypeDescriptor::default()
        },
    );

    let resolver = MetadataResolver::new(graph);
    // Descendants first; propagation must still converge
    for ty in [&c, &b, &a, &i] {
        resolver.enqueue_for_resolve(Unit::Type((*ty).clone()));
    }
    resolver.resolve().unwrap();

    for ty in [&a, &b, &c] {
        let data = ty.data();
        assert_eq!(
            data.interfaces.len(),
            1,
            "{} should carry exactly IThing",
            ty.full_name()
        );
        assert!(data.interfaces.contains_key("Demo.IThing"));
    }
}

#[test]
fn array_specialization_is_deterministic() {
    let graph = Arc::new(UnitGraph::new());
    let foo = class(&graph, 0x02000001, "Demo", "Foo", TypeDescriptor::default());
    let bar = class(&graph, 0x02000002, "Demo", "Bar", TypeDescriptor::default());
    let helper = class(
        &graph,
        0x02000003,
        "System",
        "SZArrayHelper",
        TypeDescriptor::default(),
    );

    let mut row = 0x06000010;
    for name in ["Get", "Set", "AddressOf", ".ctor"] {
        add_method(
            &graph,
            &helper,
            row,
            name,
            vec![foo.clone()],
            void_method_descriptor(None),
        );
        row += 1;
    }
    // A specialization for a different element type must not be selected
    add_method(
        &graph,
        &helper,
        row,
        "Get",
        vec![bar.clone()],
        void_method_descriptor(None),
    );

    let length = Arc::new(PropertyUnit::new(
        Token::new(0x17000001),
        "Length",
        Some(PropertyDescriptor {
            signature: TypeSig::I4,
            custom_attributes: Vec::new(),
        }),
    ));
    graph.mutate_property(&length).declaring_type = Some(TypeRef::new(&helper));
    graph.mutate_type(&helper).properties.try_add("Length", length.clone());
    graph.register_property(&length);

    let array = graph
        .get_type(&TypeSig::SzArray(Box::new(TypeSig::Class(foo.token))))
        .unwrap();

    let resolver = MetadataResolver::new(graph.clone());
    resolver.enqueue_for_resolve(Unit::Type(helper.clone()));
    resolver.resolve().unwrap();

    {
        let data = array.data();
        assert_eq!(data.methods.len(), 4);
        for name in ["Get", "Set", "AddressOf", ".ctor"] {
            let method = data
                .methods
                .get(name)
                .unwrap_or_else(|| panic!("array should carry {name}"));
            assert_eq!(
                method.declaring_type().and_then(|t| t.token()),
                Some(array.token),
                "{name} must be re-parented onto the array"
            );
            assert_eq!(
                method.generic_arguments.first().map(|a| a.token),
                Some(foo.token)
            );
        }
        let length_clone = data.properties.get("Length").unwrap();
        assert_ne!(length_clone.token, length.token);
        assert_eq!(
            length_clone.data().declaring_type.as_ref().and_then(TypeRef::token),
            Some(array.token)
        );
    }

    // Re-running specialization replaces same-identity members instead of duplicating
    resolver.enqueue_for_array_resolve(&array).unwrap();
    resolver.resolve().unwrap();
    let data = array.data();
    assert_eq!(data.methods.len(), 4);
    assert_eq!(data.properties.len(), 1);
}

#[test]
fn missing_array_helper_is_fatal() {
    let graph = Arc::new(UnitGraph::new());
    graph
        .get_type(&TypeSig::SzArray(Box::new(TypeSig::I4)))
        .unwrap();

    let resolver = MetadataResolver::new(graph);
    match resolver.resolve() {
        Err(Error::MissingWellKnownType(name)) => {
            assert_eq!(name, "System.SZArrayHelper");
        }
        other => panic!("expected missing helper to abort, got {other:?}"),
    }
}

#[test]
fn generic_instantiation_closes_field_types() {
    let graph = Arc::new(UnitGraph::new());
    let list = class(
        &graph,
        0x02000001,
        "Demo",
        "List`1",
        TypeDescriptor {
            base: Some(TypeSig::Object),
            ..TypeDescriptor::default()
        },
    );
    let item = add_field(&graph, &list, 0x04000001, "item", TypeSig::Var(0));

    let closed = graph
        .get_type(&TypeSig::GenericInst(
            Box::new(TypeSig::Class(list.token)),
            vec![TypeSig::I4],
        ))
        .unwrap();

    let resolver = MetadataResolver::new(graph.clone());
    resolver.enqueue_for_resolve(Unit::Type(list.clone()));
    resolver.enqueue_for_resolve(Unit::Field(item.clone()));
    resolver.resolve().unwrap();

    // The skeleton clone on the instantiation closed Var(0) to Int32
    let closed_field = closed.data().fields.get("item").cloned().unwrap();
    assert!(closed_field.is_resolved());
    assert_eq!(
        closed_field
            .data()
            .field_type
            .as_ref()
            .and_then(TypeRef::full_name)
            .as_deref(),
        Some("System.Int32")
    );
    assert!(!closed_field.data().has_open_generic_params);
    assert!(!closed.has_open_generic_params());

    // The open definition's field legitimately stays open
    assert_eq!(
        item.data()
            .field_type
            .as_ref()
            .and_then(TypeRef::full_name)
            .as_deref(),
        Some("!0")
    );
    assert!(item.data().has_open_generic_params);
}

#[test]
fn method_operands_resolve_against_the_graph() {
    let graph = Arc::new(UnitGraph::new());
    let exception = class(
        &graph,
        0x02000001,
        "System",
        "Exception",
        TypeDescriptor::default(),
    );
    let foo = class(&graph, 0x02000002, "Demo", "Foo", TypeDescriptor::default());
    let counter = add_field(&graph, &foo, 0x04000001, "counter", TypeSig::I4);
    let helper = class(
        &graph,
        0x02000003,
        "System",
        "SZArrayHelper",
        TypeDescriptor::default(),
    );
    let _ = helper;

    let body = RawBody {
        max_stack: 3,
        locals: vec![
            RawLocal {
                name: None,
                signature: TypeSig::I4,
                pinned: false,
            },
            RawLocal {
                name: Some("buffer".to_string()),
                signature: TypeSig::Pinned(Box::new(TypeSig::SzArray(Box::new(TypeSig::U1)))),
                pinned: true,
            },
        ],
        exception_handlers: vec![RawExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: 0,
            try_end: 20,
            handler_start: 20,
            handler_end: 30,
            catch_type: Some(TypeSig::Class(exception.token)),
            filter_start: None,
        }],
        instructions: vec![
            instruction(0, opcodes::LDSTR, RawOperand::String("hello".to_string())),
            instruction(
                5,
                opcodes::LDFLD,
                RawOperand::Field {
                    parent: TypeSig::Class(foo.token),
                    token: counter.token,
                },
            ),
            instruction(
                10,
                opcodes::NEWARR,
                RawOperand::Type(TypeSig::Class(foo.token)),
            ),
            instruction(15, opcodes::BR, RawOperand::Target(25)),
            instruction(20, opcodes::CEQ, RawOperand::None),
            instruction(25, opcodes::RET, RawOperand::None),
        ],
    };
    let work = add_method(
        &graph,
        &foo,
        0x06000001,
        "Work",
        Vec::new(),
        void_method_descriptor(Some(body)),
    );

    let resolver = MetadataResolver::new(graph.clone());
    resolver.enqueue_for_resolve(Unit::Type(foo.clone()));
    resolver.enqueue_for_resolve(Unit::Field(counter.clone()));
    resolver.enqueue_for_resolve(Unit::Method(work.clone()));
    resolver.resolve().unwrap();

    let data = work.data();

    assert_eq!(data.local_variables.len(), 2);
    assert_eq!(data.local_variables[0].name, "V_0");
    assert_eq!(data.local_variables[1].name, "buffer");
    assert!(data.local_variables[1].pinned);
    assert_eq!(
        data.local_variables[1].ty.full_name().as_deref(),
        Some("System.Byte[]")
    );

    assert_eq!(data.exception_blocks.len(), 1);
    assert_eq!(
        data.exception_blocks[0]
            .catch_type
            .as_ref()
            .and_then(TypeRef::token),
        Some(exception.token)
    );

    // ldstr interned
    let Operand::String(id) = data.code[0].operand else {
        panic!("ldstr should intern its operand");
    };
    assert_eq!(graph.lookup_string(id), Some("hello"));

    // ldfld resolved by token scan on the declaring type
    let Operand::Field(ref field) = data.code[1].operand else {
        panic!("ldfld should resolve to a field handle");
    };
    assert_eq!(field.token(), Some(counter.token));

    // newarr rewritten to the vector array type
    let Operand::Type(ref array) = data.code[2].operand else {
        panic!("newarr should carry a type operand");
    };
    assert_eq!(array.full_name().as_deref(), Some("Demo.Foo[]"));

    assert!(matches!(data.code[3].operand, Operand::Target(25)));

    // Two-byte opcodes are renumbered into the compact space
    assert_eq!(data.code[4].opcode, 0x101);
}

#[test]
fn generic_method_instantiation_resolves_via_method_spec() {
    let graph = Arc::new(UnitGraph::new());
    let factory = class(
        &graph,
        0x02000001,
        "Demo",
        "Factory",
        TypeDescriptor::default(),
    );
    let make = add_method(
        &graph,
        &factory,
        0x06000001,
        "Make",
        Vec::new(),
        MethodDescriptor {
            signature: RawMethodSignature {
                return_type: TypeSig::MVar(0),
                params: Vec::new(),
            },
            overrides: Vec::new(),
            body: None,
            custom_attributes: Vec::new(),
        },
    );

    let body = RawBody {
        max_stack: 1,
        locals: Vec::new(),
        exception_handlers: Vec::new(),
        instructions: vec![
            instruction(
                0,
                opcodes::CALL,
                RawOperand::MethodSpec {
                    parent: TypeSig::Class(factory.token),
                    token: make.token,
                    name: "Make".to_string(),
                    args: vec![TypeSig::I4],
                },
            ),
            instruction(5, opcodes::RET, RawOperand::None),
        ],
    };
    let caller = add_method(
        &graph,
        &factory,
        0x06000002,
        "Caller",
        Vec::new(),
        void_method_descriptor(Some(body)),
    );

    let resolver = MetadataResolver::new(graph.clone());
    resolver.enqueue_for_resolve(Unit::Type(factory.clone()));
    resolver.enqueue_for_resolve(Unit::Method(make.clone()));
    resolver.enqueue_for_resolve(Unit::Method(caller.clone()));
    resolver.resolve().unwrap();

    let data = caller.data();
    let Operand::Method(ref target) = data.code[0].operand else {
        panic!("call should resolve to a method handle");
    };
    let instance = target.upgrade().unwrap();
    assert_eq!(instance.generic_arguments.len(), 1);
    assert_eq!(
        instance.generic_arguments[0].full_name(),
        "System.Int32"
    );
    assert!(instance.is_resolved());
    assert_eq!(
        instance
            .data()
            .signature
            .as_ref()
            .unwrap()
            .return_type
            .full_name()
            .as_deref(),
        Some("System.Int32")
    );

    // The instantiation is installed on the declaring type under its closed name
    assert!(factory
        .data()
        .methods
        .contains_key("Make<System.Int32>"));
}

#[test]
fn malformed_member_reference_aborts_instead_of_looping() {
    let graph = Arc::new(UnitGraph::new());
    let foo = class(&graph, 0x02000001, "Demo", "Foo", TypeDescriptor::default());

    let body = RawBody {
        max_stack: 1,
        locals: Vec::new(),
        exception_handlers: Vec::new(),
        instructions: vec![instruction(
            0,
            opcodes::LDFLD,
            RawOperand::Field {
                parent: TypeSig::Class(foo.token),
                token: Token::new(0x040000FF),
            },
        )],
    };
    let broken = add_method(
        &graph,
        &foo,
        0x06000001,
        "Broken",
        Vec::new(),
        void_method_descriptor(Some(body)),
    );

    let resolver = MetadataResolver::new(graph);
    resolver.enqueue_for_resolve(Unit::Type(foo.clone()));
    resolver.enqueue_for_resolve(Unit::Method(broken.clone()));

    match resolver.resolve() {
        Err(Error::MemberNotFound { token, type_name }) => {
            assert_eq!(token, Token::new(0x040000FF));
            assert_eq!(type_name, "Demo.Foo");
        }
        other => panic!("expected structural fault, got {other:?}"),
    }
    assert!(!broken.is_resolved());
    assert!(broken.data().code.is_empty(), "no partial body commit");
}

#[test]
fn custom_attributes_resolve_by_constructor_token() {
    let graph = Arc::new(UnitGraph::new());
    let attribute = class(
        &graph,
        0x02000001,
        "Demo",
        "MarkerAttribute",
        TypeDescriptor::default(),
    );
    let ctor = add_method(
        &graph,
        &attribute,
        0x06000001,
        ".ctor",
        Vec::new(),
        void_method_descriptor(None),
    );

    let marked = class(
        &graph,
        0x02000002,
        "Demo",
        "Marked",
        TypeDescriptor {
            custom_attributes: vec![RawCustomAttribute {
                attribute_type: TypeSig::Class(attribute.token),
                ctor: ctor.token,
                arguments: vec![cilgraph::metadata::descriptors::RawAttributeArgument {
                    value_type: TypeSig::String,
                    value: cilgraph::metadata::descriptors::RawAttributeValue::String(
                        "reason".to_string(),
                    ),
                }],
                named_arguments: Vec::new(),
            }],
            ..TypeDescriptor::default()
        },
    );

    let resolver = MetadataResolver::new(graph);
    resolver.enqueue_for_resolve(Unit::Type(attribute.clone()));
    resolver.enqueue_for_resolve(Unit::Type(marked.clone()));
    resolver.enqueue_for_resolve(Unit::Method(ctor.clone()));
    resolver.resolve().unwrap();

    assert_eq!(marked.custom_attributes.count(), 1);
    let (_, resolved) = marked.custom_attributes.iter().next().unwrap();
    assert_eq!(resolved.constructor.token(), Some(ctor.token));
    assert_eq!(resolved.arguments.len(), 1);
    match &resolved.arguments[0].value {
        cilgraph::metadata::typesystem::AttributeValue::String(value) => {
            assert_eq!(value, "reason");
        }
        other => panic!("expected string argument, got {other:?}"),
    }
}
