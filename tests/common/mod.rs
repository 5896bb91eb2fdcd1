//! Shared fixtures: builders for hand-assembled classes and a small
//! interpreter that runs the instructions those classes and the rewriters
//! produce.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use classfile_backport::attribute_info::{AttributeInfo, AttributeInfoVariant, BootstrapMethod, CodeAttribute, CODE};
use classfile_backport::backport::{ClassBuilder, InvocationKind, LAMBDA_METAFACTORY, STRING_CONCAT_FACTORY};
use classfile_backport::class_pool::ClassPool;
use classfile_backport::code_attribute::{decode_code, encode_code, Instruction};
use classfile_backport::constant_info::{reference_kind, ConstantInfo, InvokeDynamicConstant, MemberKind, MemberRef};
use classfile_backport::descriptor::{parse_method_descriptor, JvmType};
use classfile_backport::method_info::{MethodAccessFlags, MethodInfo};
use classfile_backport::{ClassAccessFlags, ClassFile};

// ---------------------------------------------------------------------------
// Class construction
// ---------------------------------------------------------------------------

pub fn public_class(name: &str, major_version: u16) -> ClassFile {
    ClassBuilder::new(
        name,
        "java/lang/Object",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        major_version,
    )
    .unwrap()
    .build()
}

pub fn public_interface(name: &str, major_version: u16) -> ClassFile {
    ClassBuilder::new(
        name,
        "java/lang/Object",
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        major_version,
    )
    .unwrap()
    .build()
}

pub fn method_ref(class_name: &str, name: &str, descriptor: &str) -> MemberRef {
    MemberRef {
        kind: MemberKind::Method,
        class_name: class_name.into(),
        name: name.into(),
        descriptor: descriptor.into(),
    }
}

pub fn interface_method_ref(class_name: &str, name: &str, descriptor: &str) -> MemberRef {
    MemberRef {
        kind: MemberKind::InterfaceMethod,
        ..method_ref(class_name, name, descriptor)
    }
}

pub fn add_method(
    class: &mut ClassFile,
    access_flags: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    max_stack: u16,
    max_locals: u16,
    code: &[Instruction],
) {
    let name_index = class.get_or_add_utf8(name).unwrap();
    let descriptor_index = class.get_or_add_utf8(descriptor).unwrap();
    let code_name = class.get_or_add_utf8(CODE).unwrap();
    let mut method = MethodInfo::new(access_flags, name_index, descriptor_index);
    method.attributes.push(AttributeInfo::from_parsed(
        code_name,
        AttributeInfoVariant::Code(CodeAttribute {
            max_stack,
            max_locals,
            code: encode_code(code).unwrap(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }),
    ));
    class.methods.push(method);
}

pub fn add_abstract_method(class: &mut ClassFile, name: &str, descriptor: &str) {
    let name_index = class.get_or_add_utf8(name).unwrap();
    let descriptor_index = class.get_or_add_utf8(descriptor).unwrap();
    class.methods.push(MethodInfo::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        name_index,
        descriptor_index,
    ));
}

/// `<init>()V` calling the superclass `<init>()V`.
pub fn add_default_constructor(class: &mut ClassFile) {
    let super_name = class.super_class_name().unwrap_or("java/lang/Object").to_string();
    let super_init = class.get_or_add_method_ref(&super_name, "<init>", "()V").unwrap();
    add_method(
        class,
        MethodAccessFlags::PUBLIC,
        "<init>",
        "()V",
        1,
        1,
        &[Instruction::Aload0, Instruction::Invokespecial(super_init), Instruction::Return],
    );
}

fn add_bootstrap(class: &mut ClassFile, owner: &str, name: &str, descriptor: &str, arguments: Vec<u16>) -> u16 {
    let handle = class
        .get_or_add_method_handle(reference_kind::INVOKE_STATIC, &method_ref(owner, name, descriptor))
        .unwrap();
    let table = class.ensure_bootstrap_methods().unwrap();
    table.bootstrap_methods.push(BootstrapMethod {
        bootstrap_method_ref: handle,
        bootstrap_arguments: arguments,
    });
    (table.bootstrap_methods.len() - 1) as u16
}

fn add_call_site(class: &mut ClassFile, bootstrap_index: u16, name: &str, descriptor: &str) -> u16 {
    let name_and_type_index = class.get_or_add_name_and_type(name, descriptor).unwrap();
    class
        .add_constant(ConstantInfo::InvokeDynamic(InvokeDynamicConstant {
            bootstrap_method_attr_index: bootstrap_index,
            name_and_type_index,
        }))
        .unwrap()
}

/// A `makeConcatWithConstants` call site. Returns the constant index the
/// `invokedynamic` instruction uses.
pub fn concat_call_site(class: &mut ClassFile, recipe: &str, constants: &[&str], descriptor: &str) -> u16 {
    let mut arguments = vec![class.get_or_add_string(recipe).unwrap()];
    for constant in constants {
        arguments.push(class.get_or_add_string(constant).unwrap());
    }
    let bootstrap = add_bootstrap(
        class,
        STRING_CONCAT_FACTORY,
        "makeConcatWithConstants",
        "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
        arguments,
    );
    add_call_site(class, bootstrap, "makeConcatWithConstants", descriptor)
}

const METAFACTORY: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";
const ALT_METAFACTORY: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

/// A `LambdaMetafactory.metafactory` call site for a static implementation
/// method. Returns the constant index the `invokedynamic` instruction uses.
pub fn lambda_call_site(
    class: &mut ClassFile,
    method_name: &str,
    factory_descriptor: &str,
    method_descriptor: &str,
    target: &MemberRef,
) -> u16 {
    metafactory_call_site(
        class,
        reference_kind::INVOKE_STATIC,
        method_name,
        factory_descriptor,
        method_descriptor,
        method_descriptor,
        target,
    )
}

/// A `LambdaMetafactory.metafactory` call site whose implementation is
/// reached through a handle of `handle_kind`.
pub fn metafactory_call_site(
    class: &mut ClassFile,
    handle_kind: u8,
    method_name: &str,
    factory_descriptor: &str,
    method_descriptor: &str,
    instantiated_descriptor: &str,
    target: &MemberRef,
) -> u16 {
    let sam = class.get_or_add_method_type(method_descriptor).unwrap();
    let handle = class.get_or_add_method_handle(handle_kind, target).unwrap();
    let instantiated = class.get_or_add_method_type(instantiated_descriptor).unwrap();
    let bootstrap = add_bootstrap(
        class,
        LAMBDA_METAFACTORY,
        "metafactory",
        METAFACTORY,
        vec![sam, handle, instantiated],
    );
    add_call_site(class, bootstrap, method_name, factory_descriptor)
}

/// A `LambdaMetafactory.altMetafactory` call site for a static
/// implementation method with the given flags, marker interfaces and
/// bridge descriptors.
pub fn alt_metafactory_call_site(
    class: &mut ClassFile,
    method_name: &str,
    factory_descriptor: &str,
    method_descriptor: &str,
    target: &MemberRef,
    flags: i32,
    markers: &[&str],
    bridges: &[&str],
) -> u16 {
    let sam = class.get_or_add_method_type(method_descriptor).unwrap();
    let handle = class
        .get_or_add_method_handle(reference_kind::INVOKE_STATIC, target)
        .unwrap();
    let mut arguments = vec![sam, handle, sam, class.get_or_add_integer(flags).unwrap()];
    if flags & 2 != 0 {
        arguments.push(class.get_or_add_integer(markers.len() as i32).unwrap());
        for marker in markers {
            arguments.push(class.get_or_add_class(marker).unwrap());
        }
    }
    if flags & 4 != 0 {
        arguments.push(class.get_or_add_integer(bridges.len() as i32).unwrap());
        for bridge in bridges {
            arguments.push(class.get_or_add_method_type(bridge).unwrap());
        }
    }
    let bootstrap = add_bootstrap(class, LAMBDA_METAFACTORY, "altMetafactory", ALT_METAFACTORY, arguments);
    add_call_site(class, bootstrap, method_name, factory_descriptor)
}

/// Another call site on the bootstrap method `site` uses, with its own
/// call-site type.
pub fn sibling_call_site(class: &mut ClassFile, site: u16, descriptor: &str) -> u16 {
    let Some(ConstantInfo::InvokeDynamic(indy)) = class.constant(site) else {
        panic!("constant {} is not a dynamic call site", site);
    };
    let bootstrap = indy.bootstrap_method_attr_index;
    let (name, _) = class.get_name_and_type(indy.name_and_type_index).unwrap();
    let name = name.to_string();
    add_call_site(class, bootstrap, &name, descriptor)
}

pub fn instructions(class: &ClassFile, name: &str, descriptor: &str) -> Vec<Instruction> {
    let method = class
        .find_method(name, descriptor)
        .unwrap_or_else(|| panic!("{}{} not found", name, descriptor));
    decode_code(&method.code().expect("method has no code").code)
        .unwrap()
        .into_iter()
        .map(|(_, instruction)| instruction)
        .collect()
}

pub fn invokedynamic_count(class: &ClassFile) -> usize {
    class
        .methods
        .iter()
        .filter_map(|m| m.code())
        .flat_map(|code| decode_code(&code.code).unwrap())
        .filter(|(_, instruction)| matches!(instruction, Instruction::Invokedynamic { .. }))
        .count()
}

/// Serialize and parse again, as a consumer of the output would.
pub fn reparse(class: &ClassFile) -> ClassFile {
    ClassFile::from_bytes(&class.to_bytes().unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Boxed(Box<Value>),
    Builder(Rc<RefCell<String>>),
    Object(Rc<RefCell<Object>>),
    Lambda(Rc<Lambda>),
}

impl Value {
    fn slots(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Object {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
}

/// A lambda created by the metafactory itself, before desugaring.
#[derive(Debug, PartialEq)]
pub struct Lambda {
    kind: InvocationKind,
    target: MemberRef,
    captured: Vec<Value>,
}

/// Runs methods of a class pool. Platform classes are emulated for the few
/// members the fixtures and rewriters call. Every frame checks that the
/// operand stack and locals stay within the declared limits.
pub struct Interpreter<'p> {
    pool: &'p ClassPool,
    statics: HashMap<(String, String), Value>,
    initialized: HashSet<String>,
}

impl<'p> Interpreter<'p> {
    pub fn new(pool: &'p ClassPool) -> Self {
        Interpreter {
            pool,
            statics: HashMap::new(),
            initialized: HashSet::new(),
        }
    }

    pub fn call_static(&mut self, class_name: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Value {
        self.invoke_static(&method_ref(class_name, name, descriptor), args)
    }

    fn initialize(&mut self, class_name: &str) {
        if !self.initialized.insert(class_name.to_string()) {
            return;
        }
        let pool = self.pool;
        if let Some(class) = pool.lookup(class_name) {
            if let Some(clinit) = class.find_method("<clinit>", "()V") {
                self.execute(class, clinit, Vec::new());
            }
        }
    }

    /// The method as declared by `class_name` or its nearest superclass.
    fn find_declared(&self, class_name: &str, name: &str, descriptor: &str) -> Option<(&'p ClassFile, &'p MethodInfo)> {
        let pool = self.pool;
        let mut current = pool.lookup(class_name);
        while let Some(class) = current {
            if let Some(method) = class.find_method(name, descriptor) {
                return Some((class, method));
            }
            current = class.super_class_name().and_then(|s| pool.lookup(s));
        }
        None
    }

    /// Virtual dispatch: concrete methods of the class chain first, then
    /// default methods of its interfaces.
    fn find_virtual(&self, class_name: &str, name: &str, descriptor: &str) -> Option<(&'p ClassFile, &'p MethodInfo)> {
        let pool = self.pool;
        let mut interfaces = VecDeque::new();
        let mut current = pool.lookup(class_name);
        while let Some(class) = current {
            if let Some(method) = class.find_method(name, descriptor) {
                if method.code().is_some() && !method.is_static() {
                    return Some((class, method));
                }
            }
            interfaces.extend(class.interface_names().into_iter().map(String::from));
            current = class.super_class_name().and_then(|s| pool.lookup(s));
        }
        while let Some(interface) = interfaces.pop_front() {
            let Some(class) = pool.lookup(&interface) else {
                continue;
            };
            if let Some(method) = class.find_method(name, descriptor) {
                if method.code().is_some() && !method.is_static() {
                    return Some((class, method));
                }
            }
            interfaces.extend(class.interface_names().into_iter().map(String::from));
        }
        None
    }

    fn invoke_static(&mut self, member: &MemberRef, args: Vec<Value>) -> Value {
        if let Some(value) = platform_static(member, &args) {
            return value;
        }
        self.initialize(&member.class_name);
        let (class, method) = self
            .find_declared(&member.class_name, &member.name, &member.descriptor)
            .unwrap_or_else(|| panic!("no static method {}.{}{}", member.class_name, member.name, member.descriptor));
        assert!(method.is_static(), "{}.{} is not static", member.class_name, member.name);
        self.execute(class, method, args)
    }

    fn invoke_special(&mut self, member: &MemberRef, receiver: Value, args: Vec<Value>) -> Value {
        match (&receiver, member.name.as_str()) {
            (Value::Builder(builder), "<init>") => {
                if let Some(Value::Str(initial)) = args.first() {
                    builder.borrow_mut().push_str(initial);
                }
                return Value::Void;
            }
            _ if member.class_name == "java/lang/Object" => return Value::Void,
            _ => {}
        }
        let (class, method) = self
            .find_declared(&member.class_name, &member.name, &member.descriptor)
            .unwrap_or_else(|| panic!("no method {}.{}{}", member.class_name, member.name, member.descriptor));
        let mut all = vec![receiver];
        all.extend(args);
        self.execute(class, method, all)
    }

    fn invoke_virtual(&mut self, member: &MemberRef, receiver: Value, args: Vec<Value>) -> Value {
        let (params, _) = parse_method_descriptor(&member.descriptor).unwrap();
        match &receiver {
            Value::Builder(builder) => match member.name.as_str() {
                "append" => {
                    let text = java_string(&args[0], &params[0]);
                    builder.borrow_mut().push_str(&text);
                    receiver.clone()
                }
                "toString" => Value::Str(builder.borrow().clone()),
                other => panic!("StringBuilder.{} is not emulated", other),
            },
            Value::Str(s) => match member.name.as_str() {
                "length" => Value::Int(s.chars().count() as i32),
                "toString" => receiver.clone(),
                other => panic!("String.{} is not emulated", other),
            },
            Value::Boxed(inner) => (**inner).clone(),
            Value::Lambda(lambda) => {
                let lambda = Rc::clone(lambda);
                self.call_lambda(&lambda, args)
            }
            Value::Object(object) => {
                let class_name = object.borrow().class_name.clone();
                let (class, method) = self
                    .find_virtual(&class_name, &member.name, &member.descriptor)
                    .unwrap_or_else(|| panic!("{} has no method {}{}", class_name, member.name, member.descriptor));
                let mut all = vec![receiver];
                all.extend(args);
                self.execute(class, method, all)
            }
            other => panic!("cannot invoke {} on {:?}", member.name, other),
        }
    }

    fn call_lambda(&mut self, lambda: &Lambda, args: Vec<Value>) -> Value {
        let mut all = lambda.captured.clone();
        all.extend(args);
        match lambda.kind {
            InvocationKind::Static => self.invoke_static(&lambda.target, all),
            InvocationKind::Virtual | InvocationKind::Interface => {
                let receiver = all.remove(0);
                self.invoke_virtual(&lambda.target, receiver, all)
            }
            InvocationKind::Special => {
                let receiver = all.remove(0);
                self.invoke_special(&lambda.target, receiver, all)
            }
            InvocationKind::Constructor => {
                self.initialize(&lambda.target.class_name);
                let object = Value::Object(Rc::new(RefCell::new(Object {
                    class_name: lambda.target.class_name.clone(),
                    fields: HashMap::new(),
                })));
                self.invoke_special(&lambda.target, object.clone(), all);
                object
            }
        }
    }

    fn invoke_dynamic(&mut self, class: &ClassFile, index: u16, args: Vec<Value>) -> Value {
        let Some(ConstantInfo::InvokeDynamic(indy)) = class.constant(index) else {
            panic!("constant {} is not a dynamic call site", index);
        };
        let (_, descriptor) = class.get_name_and_type(indy.name_and_type_index).unwrap();
        let (params, _) = parse_method_descriptor(descriptor).unwrap();
        let bootstrap = &class.bootstrap_methods().unwrap().bootstrap_methods[indy.bootstrap_method_attr_index as usize];
        let (_, factory) = class.resolve_method_handle(bootstrap.bootstrap_method_ref).unwrap();

        match factory.class_name.as_str() {
            STRING_CONCAT_FACTORY => {
                let recipe = class.get_string(bootstrap.bootstrap_arguments[0]).unwrap();
                let mut constants = bootstrap.bootstrap_arguments[1..].iter();
                let mut values = args.iter().zip(&params);
                let mut out = String::new();
                for c in recipe.chars() {
                    match c {
                        '\u{1}' => {
                            let (value, ty) = values.next().unwrap();
                            out.push_str(&java_string(value, ty));
                        }
                        '\u{2}' => {
                            let constant = constant_value(class, *constants.next().unwrap());
                            out.push_str(&java_string(&constant, &JvmType::object()));
                        }
                        _ => out.push(c),
                    }
                }
                Value::Str(out)
            }
            LAMBDA_METAFACTORY => {
                let (kind, target) = class
                    .resolve_method_handle(bootstrap.bootstrap_arguments[1])
                    .unwrap();
                Value::Lambda(Rc::new(Lambda {
                    kind: InvocationKind::from_reference_kind(kind).unwrap(),
                    target,
                    captured: args,
                }))
            }
            other => panic!("bootstrap class {} is not emulated", other),
        }
    }

    fn execute(&mut self, class: &'p ClassFile, method: &'p MethodInfo, args: Vec<Value>) -> Value {
        let code = method.code().expect("method has no code");
        let method_name = class.method_name(method).unwrap_or("?").to_string();
        let instructions = decode_code(&code.code).unwrap();
        let positions: HashMap<u32, usize> = instructions
            .iter()
            .enumerate()
            .map(|(position, (offset, _))| (*offset, position))
            .collect();

        let mut locals = vec![Value::Void; code.max_locals as usize];
        let mut slot = 0;
        for arg in args {
            let width = arg.slots();
            assert!(slot + width <= locals.len(), "{}: arguments exceed max_locals", method_name);
            locals[slot] = arg;
            slot += width;
        }

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        loop {
            let (offset, instruction) = &instructions[pc];
            pc += 1;

            if let Some(index) = load_slot(instruction) {
                stack.push(locals[index].clone());
            } else if let Some(index) = store_slot(instruction) {
                let value = stack.pop().unwrap();
                assert!(
                    index + value.slots() <= locals.len(),
                    "{}: local {} exceeds max_locals {}",
                    method_name,
                    index,
                    locals.len()
                );
                locals[index] = value;
            } else {
                match instruction {
                    Instruction::Nop | Instruction::Checkcast(_) => {}
                    Instruction::Aconstnull => stack.push(Value::Null),
                    Instruction::Iconstm1 => stack.push(Value::Int(-1)),
                    Instruction::Iconst0 => stack.push(Value::Int(0)),
                    Instruction::Iconst1 => stack.push(Value::Int(1)),
                    Instruction::Iconst2 => stack.push(Value::Int(2)),
                    Instruction::Iconst3 => stack.push(Value::Int(3)),
                    Instruction::Iconst4 => stack.push(Value::Int(4)),
                    Instruction::Iconst5 => stack.push(Value::Int(5)),
                    Instruction::Lconst0 => stack.push(Value::Long(0)),
                    Instruction::Lconst1 => stack.push(Value::Long(1)),
                    Instruction::Bipush(v) => stack.push(Value::Int(*v as i32)),
                    Instruction::Sipush(v) => stack.push(Value::Int(*v as i32)),
                    Instruction::Ldc(index) => stack.push(constant_value(class, *index as u16)),
                    Instruction::LdcW(index) | Instruction::Ldc2W(index) => {
                        stack.push(constant_value(class, *index))
                    }
                    Instruction::Iadd | Instruction::Isub | Instruction::Imul => {
                        let (Value::Int(b), Value::Int(a)) = (stack.pop().unwrap(), stack.pop().unwrap()) else {
                            panic!("{}: int arithmetic on non-ints", method_name);
                        };
                        stack.push(Value::Int(match instruction {
                            Instruction::Iadd => a.wrapping_add(b),
                            Instruction::Isub => a.wrapping_sub(b),
                            _ => a.wrapping_mul(b),
                        }));
                    }
                    Instruction::Ladd => {
                        let (Value::Long(b), Value::Long(a)) = (stack.pop().unwrap(), stack.pop().unwrap()) else {
                            panic!("{}: long arithmetic on non-longs", method_name);
                        };
                        stack.push(Value::Long(a.wrapping_add(b)));
                    }
                    Instruction::I2l => {
                        let Value::Int(v) = stack.pop().unwrap() else {
                            panic!("{}: i2l on a non-int", method_name);
                        };
                        stack.push(Value::Long(v as i64));
                    }
                    Instruction::Dup => {
                        let top = stack.last().unwrap().clone();
                        stack.push(top);
                    }
                    Instruction::Dupx1 => {
                        let v1 = stack.pop().unwrap();
                        let v2 = stack.pop().unwrap();
                        stack.push(v1.clone());
                        stack.push(v2);
                        stack.push(v1);
                    }
                    Instruction::Swap => {
                        let v1 = stack.pop().unwrap();
                        let v2 = stack.pop().unwrap();
                        stack.push(v1);
                        stack.push(v2);
                    }
                    Instruction::Pop => {
                        stack.pop().unwrap();
                    }
                    Instruction::Pop2 => {
                        if stack.pop().unwrap().slots() == 1 {
                            stack.pop().unwrap();
                        }
                    }
                    Instruction::Goto(delta) => pc = jump(&positions, *offset, *delta),
                    Instruction::Ifeq(delta) | Instruction::Ifne(delta) => {
                        let Value::Int(v) = stack.pop().unwrap() else {
                            panic!("{}: branch on a non-int", method_name);
                        };
                        let taken = match instruction {
                            Instruction::Ifeq(_) => v == 0,
                            _ => v != 0,
                        };
                        if taken {
                            pc = jump(&positions, *offset, *delta);
                        }
                    }
                    Instruction::New(index) => {
                        let name = class.get_class_name(*index).unwrap().to_string();
                        if name == "java/lang/StringBuilder" {
                            stack.push(Value::Builder(Rc::new(RefCell::new(String::new()))));
                        } else {
                            self.initialize(&name);
                            stack.push(Value::Object(Rc::new(RefCell::new(Object {
                                class_name: name,
                                fields: HashMap::new(),
                            }))));
                        }
                    }
                    Instruction::Getfield(index) => {
                        let field = class.resolve_ref(*index).unwrap();
                        let Value::Object(object) = stack.pop().unwrap() else {
                            panic!("{}: getfield on a non-object", method_name);
                        };
                        let value = object.borrow().fields.get(&field.name).cloned();
                        stack.push(value.unwrap_or_else(|| default_value(&field.descriptor)));
                    }
                    Instruction::Putfield(index) => {
                        let field = class.resolve_ref(*index).unwrap();
                        let value = stack.pop().unwrap();
                        let Value::Object(object) = stack.pop().unwrap() else {
                            panic!("{}: putfield on a non-object", method_name);
                        };
                        object.borrow_mut().fields.insert(field.name, value);
                    }
                    Instruction::Getstatic(index) => {
                        let field = class.resolve_ref(*index).unwrap();
                        self.initialize(&field.class_name);
                        let value = self
                            .statics
                            .get(&(field.class_name.clone(), field.name.clone()))
                            .cloned()
                            .unwrap_or_else(|| default_value(&field.descriptor));
                        stack.push(value);
                    }
                    Instruction::Putstatic(index) => {
                        let field = class.resolve_ref(*index).unwrap();
                        let value = stack.pop().unwrap();
                        self.statics.insert((field.class_name, field.name), value);
                    }
                    Instruction::Invokestatic(index) => {
                        let member = class.resolve_ref(*index).unwrap();
                        let args = pop_arguments(&mut stack, &member.descriptor);
                        push_result(&mut stack, self.invoke_static(&member, args));
                    }
                    Instruction::Invokespecial(index) => {
                        let member = class.resolve_ref(*index).unwrap();
                        let args = pop_arguments(&mut stack, &member.descriptor);
                        let receiver = stack.pop().unwrap();
                        push_result(&mut stack, self.invoke_special(&member, receiver, args));
                    }
                    Instruction::Invokevirtual(index) | Instruction::Invokeinterface { index, .. } => {
                        let member = class.resolve_ref(*index).unwrap();
                        let args = pop_arguments(&mut stack, &member.descriptor);
                        let receiver = stack.pop().unwrap();
                        push_result(&mut stack, self.invoke_virtual(&member, receiver, args));
                    }
                    Instruction::Invokedynamic { index, .. } => {
                        let Some(ConstantInfo::InvokeDynamic(indy)) = class.constant(*index) else {
                            panic!("{}: invokedynamic without a call site", method_name);
                        };
                        let (_, descriptor) = class.get_name_and_type(indy.name_and_type_index).unwrap();
                        let args = pop_arguments(&mut stack, descriptor);
                        let result = self.invoke_dynamic(class, *index, args);
                        push_result(&mut stack, result);
                    }
                    Instruction::Ireturn
                    | Instruction::Lreturn
                    | Instruction::Freturn
                    | Instruction::Dreturn
                    | Instruction::Areturn => return stack.pop().unwrap(),
                    Instruction::Return => return Value::Void,
                    other => panic!("{}: {:?} is not emulated", method_name, other),
                }
            }

            let depth: usize = stack.iter().map(Value::slots).sum();
            assert!(
                depth <= code.max_stack as usize,
                "{}: stack depth {} exceeds max_stack {} at offset {}",
                method_name,
                depth,
                code.max_stack,
                offset
            );
        }
    }
}

fn load_slot(instruction: &Instruction) -> Option<usize> {
    match instruction {
        Instruction::Iload(n)
        | Instruction::Lload(n)
        | Instruction::Fload(n)
        | Instruction::Dload(n)
        | Instruction::Aload(n) => Some(*n as usize),
        Instruction::Iload0 | Instruction::Lload0 | Instruction::Fload0 | Instruction::Dload0 | Instruction::Aload0 => {
            Some(0)
        }
        Instruction::Iload1 | Instruction::Lload1 | Instruction::Fload1 | Instruction::Dload1 | Instruction::Aload1 => {
            Some(1)
        }
        Instruction::Iload2 | Instruction::Lload2 | Instruction::Fload2 | Instruction::Dload2 | Instruction::Aload2 => {
            Some(2)
        }
        Instruction::Iload3 | Instruction::Lload3 | Instruction::Fload3 | Instruction::Dload3 | Instruction::Aload3 => {
            Some(3)
        }
        _ => None,
    }
}

fn store_slot(instruction: &Instruction) -> Option<usize> {
    match instruction {
        Instruction::Istore(n)
        | Instruction::Lstore(n)
        | Instruction::Fstore(n)
        | Instruction::Dstore(n)
        | Instruction::Astore(n) => Some(*n as usize),
        Instruction::Istore0
        | Instruction::Lstore0
        | Instruction::Fstore0
        | Instruction::Dstore0
        | Instruction::Astore0 => Some(0),
        Instruction::Istore1
        | Instruction::Lstore1
        | Instruction::Fstore1
        | Instruction::Dstore1
        | Instruction::Astore1 => Some(1),
        Instruction::Istore2
        | Instruction::Lstore2
        | Instruction::Fstore2
        | Instruction::Dstore2
        | Instruction::Astore2 => Some(2),
        Instruction::Istore3
        | Instruction::Lstore3
        | Instruction::Fstore3
        | Instruction::Dstore3
        | Instruction::Astore3 => Some(3),
        _ => None,
    }
}

fn jump(positions: &HashMap<u32, usize>, offset: u32, delta: i16) -> usize {
    let target = (offset as i64 + delta as i64) as u32;
    *positions
        .get(&target)
        .unwrap_or_else(|| panic!("branch to {} is not an instruction boundary", target))
}

fn pop_arguments(stack: &mut Vec<Value>, descriptor: &str) -> Vec<Value> {
    let (params, _) = parse_method_descriptor(descriptor).unwrap();
    stack.split_off(stack.len() - params.len())
}

fn push_result(stack: &mut Vec<Value>, value: Value) {
    if value != Value::Void {
        stack.push(value);
    }
}

fn platform_static(member: &MemberRef, args: &[Value]) -> Option<Value> {
    match (member.class_name.as_str(), member.name.as_str()) {
        ("java/lang/Integer" | "java/lang/Long" | "java/lang/Boolean" | "java/lang/Character", "valueOf") => {
            Some(Value::Boxed(Box::new(args[0].clone())))
        }
        ("java/lang/String", "valueOf") => {
            let (params, _) = parse_method_descriptor(&member.descriptor)?;
            Some(Value::Str(java_string(&args[0], &params[0])))
        }
        _ => None,
    }
}

fn constant_value(class: &ClassFile, index: u16) -> Value {
    match class.constant(index) {
        Some(ConstantInfo::Integer(c)) => Value::Int(c.value),
        Some(ConstantInfo::Long(c)) => Value::Long(c.value),
        Some(ConstantInfo::Float(c)) => Value::Float(c.value),
        Some(ConstantInfo::Double(c)) => Value::Double(c.value),
        Some(ConstantInfo::String(_)) => Value::Str(class.get_string(index).unwrap().to_string()),
        other => panic!("constant {} ({:?}) cannot be loaded", index, other),
    }
}

fn default_value(descriptor: &str) -> Value {
    match descriptor {
        "J" => Value::Long(0),
        "F" => Value::Float(0.0),
        "D" => Value::Double(0.0),
        "I" | "Z" | "B" | "C" | "S" => Value::Int(0),
        _ => Value::Null,
    }
}

/// `String.valueOf` for a value of static type `ty`.
pub fn java_string(value: &Value, ty: &JvmType) -> String {
    match (value, ty) {
        (Value::Int(v), JvmType::Boolean) => (*v != 0).to_string(),
        (Value::Int(v), JvmType::Char) => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
        (Value::Int(v), _) => v.to_string(),
        (Value::Long(v), _) => v.to_string(),
        (Value::Float(v), _) => format!("{:?}", v),
        (Value::Double(v), _) => format!("{:?}", v),
        (Value::Str(s), _) => s.clone(),
        (Value::Null, _) => "null".to_string(),
        (Value::Boxed(inner), _) => java_string(inner, ty),
        (Value::Builder(builder), _) => builder.borrow().clone(),
        (other, _) => panic!("{:?} has no string form here", other),
    }
}
