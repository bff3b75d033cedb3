use std::collections::HashMap;

use crate::error::{ErrorCode, PrimResult};
use crate::value::Obj;
use crate::vm::Vm;

/// Native primitive handler. `args` is the argument window on the operand
/// stack; the returned value is pushed back. Statement-style primitives
/// return the false singleton.
pub type PrimHandler = fn(&mut Vm, &[Obj]) -> PrimResult;

pub struct PrimEntry {
    pub name: &'static str,
    pub handler: PrimHandler,
}

/// Namespaced primitive table. Sets register under a short namespace
/// ("data", "radio") and invocation looks up `"set:name"`.
#[derive(Default)]
pub struct PrimitiveRegistry {
    sets: HashMap<&'static str, HashMap<&'static str, PrimHandler>>,
}

impl PrimitiveRegistry {
    pub fn new() -> PrimitiveRegistry {
        PrimitiveRegistry::default()
    }

    /// Registry with every built-in set installed.
    pub fn with_builtins() -> PrimitiveRegistry {
        let mut registry = PrimitiveRegistry::new();
        crate::data::add_data_prims(&mut registry);
        crate::data::add_io_prims(&mut registry);
        crate::radio::add_radio_prims(&mut registry);
        registry
    }

    pub fn add_set(&mut self, namespace: &'static str, entries: &[PrimEntry]) {
        let set = self.sets.entry(namespace).or_default();
        for entry in entries {
            set.insert(entry.name, entry.handler);
        }
    }

    pub fn lookup(&self, namespace: &str, name: &str) -> Option<PrimHandler> {
        self.sets.get(namespace)?.get(name).copied()
    }

    /// Invoke `"set:name"`. An unknown primitive fails the calling task.
    pub fn call(&self, full_name: &str, vm: &mut Vm, args: &[Obj]) -> PrimResult {
        let (namespace, name) = full_name
            .split_once(':')
            .ok_or(ErrorCode::UnspecifiedError)?;
        let handler = self
            .lookup(namespace, name)
            .ok_or(ErrorCode::UnspecifiedError)?;
        handler(vm, args)
    }
}
