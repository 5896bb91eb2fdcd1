mod common;

use classfile_backport::backport::{BackportConfig, Backporter, ClassBuilder, RunSummary};
use classfile_backport::class_pool::ClassPool;
use classfile_backport::code_attribute::Instruction;
use classfile_backport::constant_info::reference_kind;
use classfile_backport::field_info::FieldAccessFlags;
use classfile_backport::method_info::MethodAccessFlags;
use classfile_backport::report::{CollectingReporter, WarningCategory};
use classfile_backport::types::version;
use classfile_backport::{ClassAccessFlags, ClassFile};

use common::{
    add_abstract_method, add_default_constructor, add_method, alt_metafactory_call_site, interface_method_ref,
    invokedynamic_count, lambda_call_site, metafactory_call_site, method_ref, public_class, public_interface, reparse,
    sibling_call_site, Interpreter, Value,
};

fn int_op() -> ClassFile {
    let mut class = public_interface("p/IntOp", version::JAVA_8);
    add_abstract_method(&mut class, "applyAsInt", "(I)I");
    class
}

/// `add(a, b)` applies a lambda capturing `a` to `b`, `twice(x)` applies a
/// non-capturing lambda to `x`.
fn main_class() -> ClassFile {
    let mut class = public_class("p/Main", version::JAVA_8);
    let hidden = MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
    add_method(
        &mut class,
        hidden,
        "lambda$add$0",
        "(II)I",
        2,
        2,
        &[Instruction::Iload0, Instruction::Iload1, Instruction::Iadd, Instruction::Ireturn],
    );
    add_method(
        &mut class,
        hidden,
        "lambda$twice$1",
        "(I)I",
        2,
        1,
        &[Instruction::Iload0, Instruction::Iconst2, Instruction::Imul, Instruction::Ireturn],
    );

    let apply = class
        .get_or_add_interface_method_ref("p/IntOp", "applyAsInt", "(I)I")
        .unwrap();
    let adder = lambda_call_site(
        &mut class,
        "applyAsInt",
        "(I)Lp/IntOp;",
        "(I)I",
        &method_ref("p/Main", "lambda$add$0", "(II)I"),
    );
    let doubler = lambda_call_site(
        &mut class,
        "applyAsInt",
        "()Lp/IntOp;",
        "(I)I",
        &method_ref("p/Main", "lambda$twice$1", "(I)I"),
    );
    let public_static = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    add_method(
        &mut class,
        public_static,
        "add",
        "(II)I",
        2,
        2,
        &[
            Instruction::Iload0,
            Instruction::Invokedynamic { index: adder, filler: 0 },
            Instruction::Iload1,
            Instruction::Invokeinterface {
                index: apply,
                count: 2,
                filler: 0,
            },
            Instruction::Ireturn,
        ],
    );
    add_method(
        &mut class,
        public_static,
        "twice",
        "(I)I",
        2,
        1,
        &[
            Instruction::Invokedynamic { index: doubler, filler: 0 },
            Instruction::Iload0,
            Instruction::Invokeinterface {
                index: apply,
                count: 2,
                filler: 0,
            },
            Instruction::Ireturn,
        ],
    );
    class
}

fn program() -> ClassPool {
    ClassPool::from_classes([int_op(), main_class()]).unwrap()
}

fn backport(program: &mut ClassPool, target: u16, reporter: &CollectingReporter) -> RunSummary {
    Backporter::new(BackportConfig::new(target), reporter)
        .unwrap()
        .run(program, &ClassPool::new())
}

fn call(pool: &ClassPool, name: &str, descriptor: &str, args: Vec<Value>) -> Value {
    Interpreter::new(pool).call_static("p/Main", name, descriptor, args)
}

#[test]
fn lambdas_become_generated_classes() {
    let mut program = program();
    assert_eq!(call(&program, "add", "(II)I", vec![Value::Int(3), Value::Int(4)]), Value::Int(7));
    assert_eq!(call(&program, "twice", "(I)I", vec![Value::Int(21)]), Value::Int(42));

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.warnings());
    assert_eq!(summary.created, vec!["p/Main$$Lambda$0", "p/Main$$Lambda$1"]);
    assert_eq!(summary.modified, vec!["p/IntOp", "p/Main"]);

    let main = program.lookup("p/Main").unwrap();
    assert_eq!(invokedynamic_count(main), 0);
    for name in &summary.created {
        let generated = program.lookup(name).unwrap();
        assert_eq!(generated.major_version, version::JAVA_7);
        assert_eq!(generated.interface_names(), vec!["p/IntOp"]);
    }

    // Reparse everything so the interpreter runs what a consumer would load.
    let reparsed = ClassPool::from_classes(program.iter().map(|(_, c)| reparse(c))).unwrap();
    assert_eq!(call(&reparsed, "add", "(II)I", vec![Value::Int(3), Value::Int(4)]), Value::Int(7));
    assert_eq!(call(&reparsed, "twice", "(I)I", vec![Value::Int(21)]), Value::Int(42));
}

#[test]
fn capturing_and_non_capturing_sites_differ() {
    let mut program = program();
    backport(&mut program, version::JAVA_7, &CollectingReporter::new());

    let capturing = program.lookup("p/Main$$Lambda$0").unwrap();
    assert!(capturing.find_field("arg$1", "I").is_some());
    assert!(capturing.find_method("lambdaFactory$", "(I)Lp/IntOp;").is_some());

    let singleton = program.lookup("p/Main$$Lambda$1").unwrap();
    assert!(singleton.find_field("INSTANCE", "Lp/Main$$Lambda$1;").is_some());
    assert!(singleton.find_method("<clinit>", "()V").is_some());

    let main = program.lookup("p/Main").unwrap();
    let add = common::instructions(main, "add", "(II)I");
    assert!(matches!(add[1], Instruction::Invokestatic(_)));
    let twice = common::instructions(main, "twice", "(I)I");
    assert!(matches!(twice[0], Instruction::Getstatic(_)));
}

#[test]
fn private_implementation_methods_are_widened() {
    let mut program = program();
    backport(&mut program, version::JAVA_7, &CollectingReporter::new());
    let main = program.lookup("p/Main").unwrap();
    for name in ["lambda$add$0", "lambda$twice$1"] {
        let method = main
            .methods
            .iter()
            .find(|m| main.method_name(m) == Some(name))
            .unwrap();
        assert!(!method.access_flags.contains(MethodAccessFlags::PRIVATE), "{} is still private", name);
    }
}

#[test]
fn threshold_boundary() {
    let mut program = program();
    let summary = backport(&mut program, version::JAVA_8, &CollectingReporter::new());
    assert!(summary.created.is_empty());
    assert_eq!(invokedynamic_count(program.lookup("p/Main").unwrap()), 2);

    let summary = backport(&mut program, version::JAVA_8 - 1, &CollectingReporter::new());
    assert_eq!(summary.created.len(), 2);
    assert_eq!(invokedynamic_count(program.lookup("p/Main").unwrap()), 0);
}

#[test]
fn second_run_creates_nothing() {
    let mut program = program();
    backport(&mut program, version::JAVA_7, &CollectingReporter::new());
    let names = program.class_names();

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(summary.modified.is_empty());
    assert!(summary.created.is_empty());
    assert_eq!(program.class_names(), names);
    assert!(reporter.is_empty());
}

#[test]
fn unresolved_target_keeps_the_call_site() {
    let mut class = public_class("p/Broken", version::JAVA_8);
    let site = lambda_call_site(
        &mut class,
        "applyAsInt",
        "()Lp/IntOp;",
        "(I)I",
        &method_ref("p/Gone", "lambda$0", "(I)I"),
    );
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "make",
        "()Lp/IntOp;",
        1,
        0,
        &[Instruction::Invokedynamic { index: site, filler: 0 }, Instruction::Areturn],
    );
    let mut program = ClassPool::from_classes([int_op(), class]).unwrap();
    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);

    assert_eq!(reporter.count(WarningCategory::UnresolvedTarget), 1);
    assert!(summary.created.is_empty());
    assert_eq!(invokedynamic_count(program.lookup("p/Broken").unwrap()), 1);
}

fn reparsed(program: &ClassPool) -> ClassPool {
    ClassPool::from_classes(program.iter().map(|(_, c)| reparse(c))).unwrap()
}

fn functional(name: &str, method: &str, descriptor: &str) -> ClassFile {
    let mut class = public_interface(name, version::JAVA_8);
    add_abstract_method(&mut class, method, descriptor);
    class
}

/// `p/Box` holds an int: `get()` returns it, `plus(n)` adds `n` and
/// `size()`, its `p/Sized` method, doubles it.
fn box_class() -> ClassFile {
    let mut builder = ClassBuilder::new(
        "p/Box",
        "java/lang/Object",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        version::JAVA_8,
    )
    .unwrap();
    builder.add_interface("p/Sized").unwrap();
    builder.add_field(FieldAccessFlags::PRIVATE, "value", "I").unwrap();
    let mut class = builder.build();

    let object_init = class.get_or_add_method_ref("java/lang/Object", "<init>", "()V").unwrap();
    let value = class.get_or_add_field_ref("p/Box", "value", "I").unwrap();
    let public = MethodAccessFlags::PUBLIC;
    add_method(
        &mut class,
        public,
        "<init>",
        "(I)V",
        2,
        2,
        &[
            Instruction::Aload0,
            Instruction::Invokespecial(object_init),
            Instruction::Aload0,
            Instruction::Iload1,
            Instruction::Putfield(value),
            Instruction::Return,
        ],
    );
    add_method(
        &mut class,
        public,
        "get",
        "()I",
        1,
        1,
        &[Instruction::Aload0, Instruction::Getfield(value), Instruction::Ireturn],
    );
    add_method(
        &mut class,
        public,
        "plus",
        "(I)I",
        2,
        2,
        &[
            Instruction::Aload0,
            Instruction::Getfield(value),
            Instruction::Iload1,
            Instruction::Iadd,
            Instruction::Ireturn,
        ],
    );
    add_method(
        &mut class,
        public,
        "size",
        "()I",
        2,
        1,
        &[
            Instruction::Aload0,
            Instruction::Getfield(value),
            Instruction::Iconst2,
            Instruction::Imul,
            Instruction::Ireturn,
        ],
    );
    class
}

/// One static method per implementation handle kind, each taking `n`:
/// `construct` builds a box through `Box::new`, `unbound` reads it through
/// `Box::get`, `bound` applies `box::plus` to 10 and `throughInterface`
/// reads it through `Sized::size`.
fn kinds_class() -> ClassFile {
    let mut class = public_class("p/Kinds", version::JAVA_8);
    let box_init = class.get_or_add_method_ref("p/Box", "<init>", "(I)V").unwrap();
    let box_type = class.get_or_add_class("p/Box").unwrap();
    let new_box = [
        Instruction::New(box_type),
        Instruction::Dup,
        Instruction::Iload0,
        Instruction::Invokespecial(box_init),
    ];

    let maker = metafactory_call_site(
        &mut class,
        reference_kind::NEW_INVOKE_SPECIAL,
        "make",
        "()Lp/BoxMaker;",
        "(I)Lp/Box;",
        "(I)Lp/Box;",
        &method_ref("p/Box", "<init>", "(I)V"),
    );
    let reader = metafactory_call_site(
        &mut class,
        reference_kind::INVOKE_VIRTUAL,
        "read",
        "()Lp/BoxReader;",
        "(Lp/Box;)I",
        "(Lp/Box;)I",
        &method_ref("p/Box", "get", "()I"),
    );
    let binder = metafactory_call_site(
        &mut class,
        reference_kind::INVOKE_VIRTUAL,
        "applyAsInt",
        "(Lp/Box;)Lp/IntOp;",
        "(I)I",
        "(I)I",
        &method_ref("p/Box", "plus", "(I)I"),
    );
    let sized = metafactory_call_site(
        &mut class,
        reference_kind::INVOKE_INTERFACE,
        "read",
        "()Lp/SizedReader;",
        "(Lp/Sized;)I",
        "(Lp/Sized;)I",
        &interface_method_ref("p/Sized", "size", "()I"),
    );

    let make = class
        .get_or_add_interface_method_ref("p/BoxMaker", "make", "(I)Lp/Box;")
        .unwrap();
    let read_box = class
        .get_or_add_interface_method_ref("p/BoxReader", "read", "(Lp/Box;)I")
        .unwrap();
    let apply = class
        .get_or_add_interface_method_ref("p/IntOp", "applyAsInt", "(I)I")
        .unwrap();
    let read_sized = class
        .get_or_add_interface_method_ref("p/SizedReader", "read", "(Lp/Sized;)I")
        .unwrap();
    let get = class.get_or_add_method_ref("p/Box", "get", "()I").unwrap();
    let interface_call = |index| Instruction::Invokeinterface {
        index,
        count: 2,
        filler: 0,
    };
    let public_static = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;

    add_method(
        &mut class,
        public_static,
        "construct",
        "(I)I",
        2,
        1,
        &[
            Instruction::Invokedynamic { index: maker, filler: 0 },
            Instruction::Iload0,
            interface_call(make),
            Instruction::Invokevirtual(get),
            Instruction::Ireturn,
        ],
    );
    let mut code = vec![Instruction::Invokedynamic { index: reader, filler: 0 }];
    code.extend(new_box.iter().cloned());
    code.extend([interface_call(read_box), Instruction::Ireturn]);
    add_method(&mut class, public_static, "unbound", "(I)I", 4, 1, &code);

    let mut code = new_box.to_vec();
    code.extend([
        Instruction::Invokedynamic { index: binder, filler: 0 },
        Instruction::Bipush(10),
        interface_call(apply),
        Instruction::Ireturn,
    ]);
    add_method(&mut class, public_static, "bound", "(I)I", 3, 1, &code);

    let mut code = vec![Instruction::Invokedynamic { index: sized, filler: 0 }];
    code.extend(new_box.iter().cloned());
    code.extend([interface_call(read_sized), Instruction::Ireturn]);
    add_method(&mut class, public_static, "throughInterface", "(I)I", 4, 1, &code);
    class
}

fn kinds_program() -> ClassPool {
    ClassPool::from_classes([
        functional("p/Sized", "size", "()I"),
        functional("p/BoxMaker", "make", "(I)Lp/Box;"),
        functional("p/BoxReader", "read", "(Lp/Box;)I"),
        functional("p/SizedReader", "read", "(Lp/Sized;)I"),
        int_op(),
        box_class(),
        kinds_class(),
    ])
    .unwrap()
}

#[test]
fn every_implementation_kind_survives_desugaring() {
    let cases = [("construct", 7), ("unbound", 7), ("bound", 17), ("throughInterface", 14)];
    let run = |pool: &ClassPool| -> Vec<Value> {
        let mut interpreter = Interpreter::new(pool);
        cases
            .iter()
            .map(|(name, _)| interpreter.call_static("p/Kinds", name, "(I)I", vec![Value::Int(7)]))
            .collect()
    };
    let expected: Vec<Value> = cases.iter().map(|(_, v)| Value::Int(*v)).collect();

    let mut program = kinds_program();
    assert_eq!(run(&program), expected);

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.warnings());
    assert_eq!(summary.created.len(), 4);
    assert_eq!(invokedynamic_count(program.lookup("p/Kinds").unwrap()), 0);

    assert_eq!(run(&reparsed(&program)), expected);
}

#[test]
fn alternate_metafactory_adds_bridges_and_markers() {
    const SHOUT: &str = "(Ljava/lang/String;)Ljava/lang/String;";
    const ERASED: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";
    let mut class = public_class("p/Alt", version::JAVA_8);
    add_method(
        &mut class,
        MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        "lambda$shout$0",
        SHOUT,
        1,
        1,
        &[Instruction::Aload0, Instruction::Areturn],
    );
    // serializable, with markers, with bridges
    let site = alt_metafactory_call_site(
        &mut class,
        "apply",
        "()Lp/StrOp;",
        SHOUT,
        &method_ref("p/Alt", "lambda$shout$0", SHOUT),
        7,
        &["p/Marker"],
        &[ERASED],
    );
    let erased_apply = class
        .get_or_add_interface_method_ref("p/StrOp", "apply", ERASED)
        .unwrap();
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "shout",
        ERASED,
        2,
        1,
        &[
            Instruction::Invokedynamic { index: site, filler: 0 },
            Instruction::Aload0,
            Instruction::Invokeinterface {
                index: erased_apply,
                count: 2,
                filler: 0,
            },
            Instruction::Areturn,
        ],
    );
    let mut program = ClassPool::from_classes([
        functional("p/StrOp", "apply", SHOUT),
        public_interface("p/Marker", version::JAVA_8),
        class,
    ])
    .unwrap();
    let call = |pool: &ClassPool| {
        Interpreter::new(pool).call_static("p/Alt", "shout", ERASED, vec![Value::Str("hey".into())])
    };
    assert_eq!(call(&program), Value::Str("hey".into()));

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.warnings());
    assert_eq!(summary.created, vec!["p/Alt$$Lambda$0"]);

    let generated = program.lookup("p/Alt$$Lambda$0").unwrap();
    assert_eq!(
        generated.interface_names(),
        vec!["p/StrOp", "p/Marker", "java/io/Serializable"]
    );
    assert!(generated.find_method("apply", SHOUT).is_some());
    let bridge = generated.find_method("apply", ERASED).unwrap();
    assert!(bridge
        .access_flags
        .contains(MethodAccessFlags::BRIDGE | MethodAccessFlags::SYNTHETIC));

    assert_eq!(call(&reparsed(&program)), Value::Str("hey".into()));
}

#[test]
fn sites_sharing_a_bootstrap_method_get_their_own_factories() {
    const OBJECT_FACTORY: &str = "(Ljava/lang/Object;)Lp/IntOp;";
    const STRING_FACTORY: &str = "(Ljava/lang/String;)Lp/IntOp;";
    let mut class = public_class("p/Shared", version::JAVA_8);
    add_method(
        &mut class,
        MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        "lambda$shared$0",
        "(Ljava/lang/Object;I)I",
        2,
        2,
        &[Instruction::Iload1, Instruction::Iconst1, Instruction::Iadd, Instruction::Ireturn],
    );
    let of_object = lambda_call_site(
        &mut class,
        "applyAsInt",
        OBJECT_FACTORY,
        "(I)I",
        &method_ref("p/Shared", "lambda$shared$0", "(Ljava/lang/Object;I)I"),
    );
    let of_string = sibling_call_site(&mut class, of_object, STRING_FACTORY);
    let apply = class
        .get_or_add_interface_method_ref("p/IntOp", "applyAsInt", "(I)I")
        .unwrap();
    for (name, site) in [("viaObject", of_object), ("viaString", of_string)] {
        add_method(
            &mut class,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            name,
            "(I)I",
            2,
            1,
            &[
                Instruction::Aconstnull,
                Instruction::Invokedynamic { index: site, filler: 0 },
                Instruction::Iload0,
                Instruction::Invokeinterface {
                    index: apply,
                    count: 2,
                    filler: 0,
                },
                Instruction::Ireturn,
            ],
        );
    }
    let mut program = ClassPool::from_classes([int_op(), class]).unwrap();
    let run = |pool: &ClassPool| {
        let mut interpreter = Interpreter::new(pool);
        (
            interpreter.call_static("p/Shared", "viaObject", "(I)I", vec![Value::Int(4)]),
            interpreter.call_static("p/Shared", "viaString", "(I)I", vec![Value::Int(9)]),
        )
    };
    assert_eq!(run(&program), (Value::Int(5), Value::Int(10)));

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.warnings());
    assert_eq!(summary.created.len(), 2);

    let mut factories: Vec<&str> = summary
        .created
        .iter()
        .filter_map(|name| {
            let generated = program.lookup(name).unwrap();
            [OBJECT_FACTORY, STRING_FACTORY]
                .into_iter()
                .find(|descriptor| generated.find_method("lambdaFactory$", descriptor).is_some())
        })
        .collect();
    factories.sort_unstable();
    assert_eq!(factories, vec![OBJECT_FACTORY, STRING_FACTORY]);

    assert_eq!(run(&reparsed(&program)), (Value::Int(5), Value::Int(10)));
}

/// `p/A.run()` returns its private `lambda$run$0()` through a lambda, and
/// `p/B extends p/A` declares its own private method of the same name.
fn shadowing_program() -> ClassPool {
    const SUPPLIER: &str = "java/util/function/IntSupplier";
    let hidden = MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC;

    let mut a = public_class("p/A", version::JAVA_8);
    add_default_constructor(&mut a);
    add_method(
        &mut a,
        hidden,
        "lambda$run$0",
        "()I",
        1,
        1,
        &[Instruction::Iconst1, Instruction::Ireturn],
    );
    let site = metafactory_call_site(
        &mut a,
        reference_kind::INVOKE_SPECIAL,
        "getAsInt",
        "(Lp/A;)Ljava/util/function/IntSupplier;",
        "()I",
        "()I",
        &method_ref("p/A", "lambda$run$0", "()I"),
    );
    let get = a.get_or_add_interface_method_ref(SUPPLIER, "getAsInt", "()I").unwrap();
    add_method(
        &mut a,
        MethodAccessFlags::PUBLIC,
        "run",
        "()I",
        1,
        1,
        &[
            Instruction::Aload0,
            Instruction::Invokedynamic { index: site, filler: 0 },
            Instruction::Invokeinterface {
                index: get,
                count: 1,
                filler: 0,
            },
            Instruction::Ireturn,
        ],
    );

    let mut b = ClassBuilder::new("p/B", "p/A", ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER, version::JAVA_8)
        .unwrap()
        .build();
    add_default_constructor(&mut b);
    add_method(
        &mut b,
        hidden,
        "lambda$run$0",
        "()I",
        1,
        1,
        &[Instruction::Iconst2, Instruction::Ireturn],
    );

    let mut main = public_class("p/Main", version::JAVA_8);
    let b_type = main.get_or_add_class("p/B").unwrap();
    let b_init = main.get_or_add_method_ref("p/B", "<init>", "()V").unwrap();
    let run = main.get_or_add_method_ref("p/A", "run", "()I").unwrap();
    add_method(
        &mut main,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "test",
        "()I",
        2,
        0,
        &[
            Instruction::New(b_type),
            Instruction::Dup,
            Instruction::Invokespecial(b_init),
            Instruction::Invokevirtual(run),
            Instruction::Ireturn,
        ],
    );
    ClassPool::from_classes([a, b, main]).unwrap()
}

#[test]
fn subclass_method_of_the_same_name_does_not_capture_the_lambda() {
    let mut program = shadowing_program();
    assert_eq!(call(&program, "test", "()I", Vec::new()), Value::Int(1));

    let reporter = CollectingReporter::new();
    let summary = backport(&mut program, version::JAVA_7, &reporter);
    assert!(reporter.is_empty(), "{:?}", reporter.warnings());
    assert_eq!(summary.created, vec!["p/A$$Lambda$0"]);

    for name in ["p/A", "p/B"] {
        let class = program.lookup(name).unwrap();
        let body = class.find_method("lambda$run$0", "()I").unwrap();
        assert!(body.access_flags.contains(MethodAccessFlags::PRIVATE), "{} body was widened", name);
    }
    let a = program.lookup("p/A").unwrap();
    let accessor = a.find_method("access$lambda$run$0", "(Lp/A;)I").unwrap();
    assert!(accessor.is_static());
    assert!(matches!(
        common::instructions(a, "access$lambda$run$0", "(Lp/A;)I")[1],
        Instruction::Invokespecial(_)
    ));

    assert_eq!(call(&reparsed(&program), "test", "()I", Vec::new()), Value::Int(1));
}
