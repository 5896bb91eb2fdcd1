//! Named collections of parsed classes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::Result;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassFile;

/// Classes keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct ClassPool {
    classes: BTreeMap<String, ClassFile>,
}

impl ClassPool {
    pub fn new() -> Self {
        ClassPool::default()
    }

    /// Build a pool from parsed classes. A later class with the same name
    /// replaces an earlier one.
    pub fn from_classes<I>(classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = ClassFile>,
    {
        let mut pool = ClassPool::new();
        for class in classes {
            pool.insert(class)?;
        }
        Ok(pool)
    }

    /// Add or replace a class, returning the previous one with that name.
    pub fn insert(&mut self, class: ClassFile) -> Result<Option<ClassFile>> {
        let name = class.name()?.to_string();
        Ok(self.classes.insert(name, class))
    }

    pub fn lookup(&self, name: &str) -> Option<&ClassFile> {
        self.classes.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut ClassFile> {
        self.classes.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ClassFile> {
        self.classes.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Class names in sorted order.
    pub fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassFile)> {
        self.classes.iter().map(|(name, class)| (name.as_str(), class))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A method found by hierarchy resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub owner: String,
    pub access_flags: MethodAccessFlags,
    pub owner_is_interface: bool,
    /// Declared by a program class, so its access may be changed.
    pub in_program: bool,
    pub is_synthetic: bool,
}

/// Program and library pools seen together. Lookups prefer the program pool.
#[derive(Clone, Copy)]
pub struct ClassPools<'a> {
    pub program: &'a ClassPool,
    pub library: &'a ClassPool,
}

impl<'a> ClassPools<'a> {
    pub fn new(program: &'a ClassPool, library: &'a ClassPool) -> Self {
        ClassPools { program, library }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a ClassFile> {
        self.program.lookup(name).or_else(|| self.library.lookup(name))
    }

    pub fn is_program_class(&self, name: &str) -> bool {
        self.program.contains(name)
    }

    /// The class itself followed by its known superclasses.
    pub fn superclass_chain(&self, name: &str) -> Vec<&'a ClassFile> {
        let mut chain = Vec::new();
        let mut current = self.lookup(name);
        while let Some(class) = current {
            chain.push(class);
            if chain.len() > 256 {
                break;
            }
            current = class.super_class_name().and_then(|s| self.lookup(s));
        }
        chain
    }

    /// Every interface implemented by `name`, directly or through
    /// superclasses and superinterfaces, in breadth-first order.
    pub fn all_interfaces(&self, name: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for class in self.superclass_chain(name) {
            queue.extend(class.interface_names().into_iter().map(String::from));
        }
        while let Some(interface) = queue.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            if let Some(class) = self.lookup(&interface) {
                queue.extend(class.interface_names().into_iter().map(String::from));
            }
            order.push(interface);
        }
        order
    }

    /// True when `name` is `ancestor` or inherits from it.
    pub fn is_assignable_to(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor
            || ancestor == "java/lang/Object"
            || self
                .superclass_chain(name)
                .iter()
                .any(|class| class.display_name() == ancestor)
            || self.all_interfaces(name).iter().any(|i| i == ancestor)
    }

    /// Resolve a method the way the JVM does: the class and its
    /// superclasses first, then its superinterfaces.
    pub fn resolve_method(&self, class: &str, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        let found = |owner: &ClassFile| {
            owner.find_method(name, descriptor).map(|method| ResolvedMethod {
                owner: owner.display_name().to_string(),
                access_flags: method.access_flags,
                owner_is_interface: owner.is_interface(),
                in_program: self.is_program_class(owner.display_name()),
                is_synthetic: method.access_flags.contains(MethodAccessFlags::SYNTHETIC),
            })
        };
        for owner in self.superclass_chain(class) {
            if let Some(resolved) = found(owner) {
                return Some(resolved);
            }
        }
        self.all_interfaces(class)
            .iter()
            .filter_map(|interface| self.lookup(interface))
            .find_map(found)
    }
}
