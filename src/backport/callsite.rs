//! Classification of `invokedynamic` call sites.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::attribute_info::BootstrapMethod;
use crate::class_pool::{ClassPools, ResolvedMethod};
use crate::code_attribute::Instruction;
use crate::constant_info::{reference_kind, ConstantInfo, MemberRef};
use crate::descriptor::{parse_method_descriptor, JvmType};
use crate::error::Result;
use crate::report::{WarningCategory, WarningReporter};
use crate::types::ClassFile;
use crate::visitor::{walk_class, ClassVisitor, Node};

pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
pub const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

const FLAG_SERIALIZABLE: i32 = 1;
const FLAG_MARKERS: i32 = 2;
const FLAG_BRIDGES: i32 = 4;

/// Recipe tag for the next dynamic argument.
pub const TAG_ARG: char = '\u{1}';
/// Recipe tag for the next static constant.
pub const TAG_CONST: char = '\u{2}';

/// How a lambda reaches its implementation method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvocationKind {
    Constructor,
    Static,
    Virtual,
    Interface,
    Special,
}

impl InvocationKind {
    pub fn from_reference_kind(kind: u8) -> Option<Self> {
        match kind {
            reference_kind::INVOKE_VIRTUAL => Some(InvocationKind::Virtual),
            reference_kind::INVOKE_STATIC => Some(InvocationKind::Static),
            reference_kind::INVOKE_SPECIAL => Some(InvocationKind::Special),
            reference_kind::NEW_INVOKE_SPECIAL => Some(InvocationKind::Constructor),
            reference_kind::INVOKE_INTERFACE => Some(InvocationKind::Interface),
            _ => None,
        }
    }

    /// Whether the first delegated argument is the receiver.
    pub fn has_receiver(&self) -> bool {
        matches!(
            self,
            InvocationKind::Virtual | InvocationKind::Interface | InvocationKind::Special
        )
    }
}

/// A lambda or method reference created through the lambda metafactory.
#[derive(Clone, Debug, PartialEq)]
pub struct LambdaExpression {
    /// Class that declares the call site.
    pub origin: String,
    pub bootstrap_index: u16,
    /// Descriptor of the call site: captured values to the interface.
    pub factory_descriptor: String,
    /// The functional interface followed by any marker interfaces.
    pub interfaces: Vec<String>,
    pub method_name: String,
    pub method_descriptor: String,
    pub instantiated_descriptor: String,
    pub bridge_descriptors: Vec<String>,
    pub kind: InvocationKind,
    pub target: MemberRef,
    /// The implementation method as found in the class pools.
    pub resolved: Option<ResolvedMethod>,
    pub serializable: bool,
}

impl LambdaExpression {
    pub fn functional_interface(&self) -> &str {
        &self.interfaces[0]
    }

    pub fn captured_types(&self) -> Vec<JvmType> {
        parse_method_descriptor(&self.factory_descriptor)
            .map(|(params, _)| params)
            .unwrap_or_default()
    }

    pub fn is_capturing(&self) -> bool {
        !self.captured_types().is_empty()
    }

    /// Key of the generated class: equal lambdas in one class share it.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}{}|{:?}|{}.{}{}|{}|{}|{}",
            self.origin,
            self.interfaces.join(","),
            self.method_name,
            self.method_descriptor,
            self.kind,
            self.target.class_name,
            self.target.name,
            self.target.descriptor,
            self.factory_descriptor,
            self.bridge_descriptors.join(","),
            self.serializable,
        )
    }
}

/// A static concatenation constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConcatConstant {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

/// The shape of a string concatenation site.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcatRecipe {
    pub bootstrap_index: u16,
    /// `None` for `makeConcat`: every argument in order.
    pub recipe: Option<String>,
    pub constants: Vec<ConcatConstant>,
    pub descriptor: String,
}

impl ConcatRecipe {
    /// Number of dynamic arguments the recipe consumes.
    pub fn argument_count(&self) -> Option<usize> {
        self.recipe
            .as_ref()
            .map(|recipe| recipe.chars().filter(|c| *c == TAG_ARG).count())
    }

    pub fn constant_count(&self) -> usize {
        self.recipe
            .as_ref()
            .map(|recipe| recipe.chars().filter(|c| *c == TAG_CONST).count())
            .unwrap_or(0)
    }
}

/// An `invokedynamic` instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicCallSite {
    pub method_index: usize,
    pub offset: u32,
    pub constant_index: u16,
    pub bootstrap_index: u16,
    pub name: String,
    pub descriptor: String,
}

/// Everything the analyzer learned about one class.
///
/// Lambdas and recipes are keyed by their `InvokeDynamic` constant: sites
/// that share a bootstrap entry may still differ in their call-site type.
#[derive(Clone, Debug, Default)]
pub struct CallSiteAnalysis {
    pub lambdas: BTreeMap<u16, LambdaExpression>,
    pub concats: BTreeMap<u16, ConcatRecipe>,
    pub sites: Vec<DynamicCallSite>,
}

impl CallSiteAnalysis {
    pub fn lambda_sites(&self) -> impl Iterator<Item = (&DynamicCallSite, &LambdaExpression)> {
        self.sites
            .iter()
            .filter_map(|site| self.lambdas.get(&site.constant_index).map(|l| (site, l)))
    }

    pub fn concat_sites(&self) -> impl Iterator<Item = (&DynamicCallSite, &ConcatRecipe)> {
        self.sites
            .iter()
            .filter_map(|site| self.concats.get(&site.constant_index).map(|c| (site, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.lambdas.is_empty() && self.concats.is_empty()
    }
}

/// Classify the bootstrap methods and call sites of `class`.
pub fn analyze_call_sites(
    pools: ClassPools<'_>,
    reporter: &dyn WarningReporter,
    class: &ClassFile,
) -> Result<CallSiteAnalysis> {
    let mut analyzer = CallSiteAnalyzer::new(pools, reporter);
    walk_class(class, &mut analyzer)?;
    Ok(analyzer.analysis)
}

/// Visitor that builds a [`CallSiteAnalysis`].
pub struct CallSiteAnalyzer<'a> {
    pools: ClassPools<'a>,
    reporter: &'a dyn WarningReporter,
    analysis: CallSiteAnalysis,
}

impl<'a> CallSiteAnalyzer<'a> {
    pub fn new(pools: ClassPools<'a>, reporter: &'a dyn WarningReporter) -> Self {
        CallSiteAnalyzer {
            pools,
            reporter,
            analysis: CallSiteAnalysis::default(),
        }
    }

    pub fn finish(self) -> CallSiteAnalysis {
        self.analysis
    }

    fn malformed(&self, class: &ClassFile, index: u16, reason: &str) {
        self.reporter.report(
            WarningCategory::MalformedCallSite,
            &format!("{}: bootstrap method {} {}", class.display_name(), index, reason),
        );
    }

    fn classify(&mut self, class: &ClassFile, index: u16, method: &BootstrapMethod) {
        let Some((kind, handle)) = class.resolve_method_handle(method.bootstrap_method_ref) else {
            return;
        };
        if kind != reference_kind::INVOKE_STATIC {
            return;
        }
        // Each call site naming this bootstrap method supplies its own
        // interface method name and factory descriptor.
        let sites = call_sites_of(class, index);
        if sites.is_empty() {
            debug!("{}: bootstrap method {} is not used by any call site", class.display_name(), index);
            return;
        }
        let mut reported = BTreeSet::new();
        for (constant, name, descriptor) in sites {
            let outcome = match (handle.class_name.as_str(), handle.name.as_str()) {
                (LAMBDA_METAFACTORY, "metafactory" | "altMetafactory") => {
                    let alternate = handle.name == "altMetafactory";
                    self.lambda_expression(class, index, method, alternate, name, descriptor)
                        .map(|lambda| {
                            self.analysis.lambdas.insert(constant, lambda);
                        })
                }
                (STRING_CONCAT_FACTORY, "makeConcatWithConstants" | "makeConcat") => {
                    let with_constants = handle.name == "makeConcatWithConstants";
                    concat_recipe(class, index, method, with_constants, descriptor).map(|recipe| {
                        self.analysis.concats.insert(constant, recipe);
                    })
                }
                _ => return,
            };
            if let Err(reason) = outcome {
                if reported.insert(reason.clone()) {
                    self.malformed(class, index, &reason);
                }
            }
        }
    }

    fn lambda_expression(
        &self,
        class: &ClassFile,
        index: u16,
        method: &BootstrapMethod,
        alternate: bool,
        name: &str,
        descriptor: &str,
    ) -> std::result::Result<LambdaExpression, String> {
        let args = &method.bootstrap_arguments;
        if args.len() < 3 || (!alternate && args.len() != 3) {
            return Err(format!("has {} arguments", args.len()));
        }
        let method_descriptor = method_type(class, args[0])?;
        let (handle_kind, target) = class
            .resolve_method_handle(args[1])
            .ok_or_else(|| "has no implementation method handle".to_string())?;
        let kind = InvocationKind::from_reference_kind(handle_kind)
            .ok_or_else(|| format!("uses reference kind {}", handle_kind))?;
        let instantiated_descriptor = method_type(class, args[2])?;

        let (_, returned) =
            parse_method_descriptor(descriptor).ok_or_else(|| format!("has call site type {}", descriptor))?;
        let JvmType::Reference(interface) = returned else {
            return Err(format!("produces {}", returned));
        };

        let mut interfaces = vec![interface];
        let mut bridge_descriptors = Vec::new();
        let mut serializable = false;
        if alternate {
            let flags = integer(class, args[3])?;
            serializable = flags & FLAG_SERIALIZABLE != 0;
            let mut position = 4;
            if flags & FLAG_MARKERS != 0 {
                let count = integer(class, *args.get(position).ok_or("lacks a marker count")?)?;
                position += 1;
                for _ in 0..count {
                    let marker = args
                        .get(position)
                        .and_then(|&i| class.get_class_name(i))
                        .ok_or("has a missing marker interface")?;
                    if !interfaces.iter().any(|i| i == marker) {
                        interfaces.push(marker.to_string());
                    }
                    position += 1;
                }
            }
            if flags & FLAG_BRIDGES != 0 {
                let count = integer(class, *args.get(position).ok_or("lacks a bridge count")?)?;
                position += 1;
                for _ in 0..count {
                    let bridge = method_type(class, *args.get(position).ok_or("has a missing bridge")?)?;
                    if bridge != method_descriptor && !bridge_descriptors.contains(&bridge) {
                        bridge_descriptors.push(bridge);
                    }
                    position += 1;
                }
            }
            if position != args.len() {
                return Err(format!("has {} unexpected trailing arguments", args.len() - position));
            }
        }

        let resolved = match kind {
            InvocationKind::Constructor => self.pools.lookup(&target.class_name).and_then(|owner| {
                owner
                    .find_method(&target.name, &target.descriptor)
                    .map(|m| ResolvedMethod {
                        owner: target.class_name.clone(),
                        access_flags: m.access_flags,
                        owner_is_interface: false,
                        in_program: self.pools.is_program_class(&target.class_name),
                        is_synthetic: m.access_flags.contains(crate::method_info::MethodAccessFlags::SYNTHETIC),
                    })
            }),
            _ => self
                .pools
                .resolve_method(&target.class_name, &target.name, &target.descriptor),
        };

        Ok(LambdaExpression {
            origin: class.display_name().to_string(),
            bootstrap_index: index,
            factory_descriptor: descriptor.to_string(),
            interfaces,
            method_name: name.to_string(),
            method_descriptor,
            instantiated_descriptor,
            bridge_descriptors,
            kind,
            target,
            resolved,
            serializable,
        })
    }
}

impl ClassVisitor for CallSiteAnalyzer<'_> {
    fn visit(&mut self, class: &ClassFile, node: &Node<'_>) {
        match node {
            Node::BootstrapMethod { index, method } => self.classify(class, *index, method),
            Node::Instruction {
                method_index,
                offset,
                instruction: Instruction::Invokedynamic { index, .. },
            } => {
                let Some(ConstantInfo::InvokeDynamic(indy)) = class.constant(*index) else {
                    return;
                };
                let Some((name, descriptor)) = class.get_name_and_type(indy.name_and_type_index) else {
                    return;
                };
                self.analysis.sites.push(DynamicCallSite {
                    method_index: *method_index,
                    offset: *offset,
                    constant_index: *index,
                    bootstrap_index: indy.bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                });
            }
            _ => {}
        }
    }
}

/// Every `InvokeDynamic` constant that names `bootstrap_index`, with its
/// name and type.
fn call_sites_of(class: &ClassFile, bootstrap_index: u16) -> Vec<(u16, &str, &str)> {
    class
        .const_pool
        .iter()
        .enumerate()
        .filter_map(|(position, constant)| match constant {
            ConstantInfo::InvokeDynamic(indy) if indy.bootstrap_method_attr_index == bootstrap_index => class
                .get_name_and_type(indy.name_and_type_index)
                .map(|(name, descriptor)| (position as u16 + 1, name, descriptor)),
            _ => None,
        })
        .collect()
}

fn method_type(class: &ClassFile, index: u16) -> std::result::Result<String, String> {
    class
        .get_method_type(index)
        .map(str::to_string)
        .ok_or_else(|| format!("argument {} is not a method type", index))
}

fn integer(class: &ClassFile, index: u16) -> std::result::Result<i32, String> {
    match class.constant(index) {
        Some(ConstantInfo::Integer(c)) => Ok(c.value),
        _ => Err(format!("argument {} is not an integer", index)),
    }
}

fn concat_recipe(
    class: &ClassFile,
    index: u16,
    method: &BootstrapMethod,
    with_constants: bool,
    descriptor: &str,
) -> std::result::Result<ConcatRecipe, String> {
    let (params, ret) =
        parse_method_descriptor(descriptor).ok_or_else(|| format!("has call site type {}", descriptor))?;
    if ret != JvmType::Reference("java/lang/String".into()) {
        return Err(format!("produces {}", ret));
    }
    if !with_constants {
        if !method.bootstrap_arguments.is_empty() {
            return Err("passes arguments to makeConcat".into());
        }
        return Ok(ConcatRecipe {
            bootstrap_index: index,
            recipe: None,
            constants: Vec::new(),
            descriptor: descriptor.to_string(),
        });
    }

    let (&recipe_index, constant_indices) = method
        .bootstrap_arguments
        .split_first()
        .ok_or("has no recipe")?;
    let recipe = class
        .get_string(recipe_index)
        .ok_or("has a recipe that is not a string")?
        .to_string();
    let mut constants = Vec::with_capacity(constant_indices.len());
    for &constant in constant_indices {
        constants.push(match class.constant(constant) {
            Some(ConstantInfo::String(c)) => ConcatConstant::String(
                class
                    .get_utf8(c.string_index)
                    .ok_or("has a dangling string constant")?
                    .to_string(),
            ),
            Some(ConstantInfo::Integer(c)) => ConcatConstant::Int(c.value),
            Some(ConstantInfo::Long(c)) => ConcatConstant::Long(c.value),
            Some(ConstantInfo::Float(c)) => ConcatConstant::Float(c.value),
            Some(ConstantInfo::Double(c)) => ConcatConstant::Double(c.value),
            _ => return Err(format!("has unsupported constant {}", constant)),
        });
    }
    let concat = ConcatRecipe {
        bootstrap_index: index,
        recipe: Some(recipe),
        constants,
        descriptor: descriptor.to_string(),
    };
    if concat.argument_count() != Some(params.len()) {
        return Err(format!("recipe does not match call site type {}", descriptor));
    }
    if concat.constant_count() != concat.constants.len() {
        return Err("recipe does not match its constants".into());
    }
    Ok(concat)
}
