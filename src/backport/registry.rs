use std::collections::{BTreeMap, BTreeSet};

use log::debug;

/// Classes synthesized during a run: lambda implementation classes and
/// interface companions. Names are deterministic: lambda classes are
/// numbered per origin class in discovery order.
#[derive(Debug, Default)]
pub struct CompanionRegistry {
    // signature -> lambda class name
    lambda_classes: BTreeMap<String, String>,
    // origin class -> lambda classes created for it
    lambdas_by_origin: BTreeMap<String, Vec<String>>,
    next_lambda_index: BTreeMap<String, u32>,
    // interface -> companion class
    companions: BTreeMap<String, String>,
}

impl CompanionRegistry {
    pub fn new() -> Self {
        CompanionRegistry::default()
    }

    /// The lambda class registered for `signature`.
    pub fn lambda_class(&self, signature: &str) -> Option<&str> {
        self.lambda_classes.get(signature).map(String::as_str)
    }

    /// Pick the next free `Origin$$Lambda$N` name. `taken` tells whether a
    /// name already exists in the class pools.
    pub fn next_lambda_name<F>(&mut self, origin: &str, taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let counter = self.next_lambda_index.entry(origin.to_string()).or_insert(0);
        loop {
            let name = format!("{}$$Lambda${}", origin, counter);
            *counter += 1;
            if !taken(&name) {
                return name;
            }
        }
    }

    pub fn register_lambda(&mut self, origin: &str, signature: String, class_name: String) {
        debug!("Registered lambda class {} for {}", class_name, origin);
        self.lambdas_by_origin
            .entry(origin.to_string())
            .or_default()
            .push(class_name.clone());
        self.lambda_classes.insert(signature, class_name);
    }

    pub fn lambda_classes_of(&self, origin: &str) -> &[String] {
        self.lambdas_by_origin
            .get(origin)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Forget every lambda class of `origin`, returning their names.
    pub fn discard_origin(&mut self, origin: &str) -> Vec<String> {
        let discarded = self.lambdas_by_origin.remove(origin).unwrap_or_default();
        let names: BTreeSet<&String> = discarded.iter().collect();
        self.lambda_classes.retain(|_, class| !names.contains(class));
        discarded
    }

    /// Name of the companion class of `interface`, recorded on first use.
    pub fn companion_name(&mut self, interface: &str) -> String {
        self.companions
            .entry(interface.to_string())
            .or_insert_with(|| format!("{}$$CC", interface))
            .clone()
    }

    pub fn companion_of(&self, interface: &str) -> Option<&str> {
        self.companions.get(interface).map(String::as_str)
    }

    pub fn is_companion(&self, class_name: &str) -> bool {
        self.companions.values().any(|c| c == class_name)
    }

    pub fn is_lambda_class(&self, class_name: &str) -> bool {
        self.lambda_classes.values().any(|c| c == class_name)
    }
}
