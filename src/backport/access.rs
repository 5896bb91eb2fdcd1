//! Deferred widening of member access.

use std::collections::BTreeMap;

use log::debug;

use crate::class_pool::ClassPool;
use crate::method_info::MethodAccessFlags;

/// How visible a member must be. Ordered from narrowest to widest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    Package,
    Public,
}

/// A member whose access must be widened to at least `visibility`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRequest {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub visibility: Visibility,
}

/// Collects widening requests from every rewriter and applies them once
/// the whole program has been rewritten.
#[derive(Debug, Default)]
pub struct AccessFixer {
    requests: BTreeMap<(String, String, String), Visibility>,
}

impl AccessFixer {
    pub fn new() -> Self {
        AccessFixer::default()
    }

    pub fn request(&mut self, request: AccessRequest) {
        let key = (request.class_name, request.name, request.descriptor);
        let entry = self.requests.entry(key).or_insert(request.visibility);
        *entry = (*entry).max(request.visibility);
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Widen every requested member still present in `program`. Returns
    /// the classes that changed.
    pub fn apply(&self, program: &mut ClassPool) -> Vec<String> {
        let mut changed = Vec::new();
        for ((class_name, name, descriptor), visibility) in &self.requests {
            let Some(class) = program.lookup_mut(class_name) else {
                debug!("Access request for missing class {}", class_name);
                continue;
            };
            let Some(index) = class.find_method_index(name, descriptor) else {
                debug!("Access request for {}.{}{} skipped: member is gone", class_name, name, descriptor);
                continue;
            };
            let flags = class.methods[index].access_flags;
            let widened = widen(flags, *visibility);
            if widened != flags {
                debug!("Widened {}.{}{} to {:?}", class_name, name, descriptor, visibility);
                class.methods[index].access_flags = widened;
                if changed.last() != Some(class_name) {
                    changed.push(class_name.clone());
                }
            }
        }
        changed
    }
}

fn widen(flags: MethodAccessFlags, visibility: Visibility) -> MethodAccessFlags {
    if flags.contains(MethodAccessFlags::PUBLIC) {
        return flags;
    }
    let mut widened = flags - MethodAccessFlags::PRIVATE;
    if visibility == Visibility::Public {
        widened = (widened - MethodAccessFlags::PROTECTED) | MethodAccessFlags::PUBLIC;
    }
    widened
}
