// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builder API for aggregate descriptors.

use super::Registry;
use crate::descriptor::DescriptorId;
use crate::value::Value;
use std::rc::Rc;

type Hook = Rc<dyn Fn(&mut Value)>;

/// Builder for aggregate descriptors, obtained from
/// [`Registry::aggregate`].
pub struct AggregateBuilder<'r> {
    registry: &'r mut Registry,
    name: String,
    base: Option<DescriptorId>,
    polymorphic: bool,
    fields: Vec<(String, DescriptorId)>,
    virtual_fields: Vec<(String, String)>,
    constructor: Option<Hook>,
    destructor: Option<Hook>,
}

impl Registry {
    /// Start building an aggregate named `name`.
    pub fn aggregate(&mut self, name: impl Into<String>) -> AggregateBuilder<'_> {
        AggregateBuilder {
            registry: self,
            name: name.into(),
            base: None,
            polymorphic: false,
            fields: Vec::new(),
            virtual_fields: Vec::new(),
            constructor: None,
            destructor: None,
        }
    }
}

impl AggregateBuilder<'_> {
    /// Derive from `base`.
    pub fn base(mut self, base: DescriptorId) -> Self {
        self.base = Some(base);
        self
    }

    /// Instances carry their runtime type.
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, descriptor: DescriptorId) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    /// Add a virtual field over `spec`.
    pub fn virtual_field(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.virtual_fields.push((name.into(), spec.into()));
        self
    }

    /// Set the constructor.
    pub fn constructor(mut self, f: impl Fn(&mut Value) + 'static) -> Self {
        self.constructor = Some(Rc::new(f));
        self
    }

    /// Set the destructor.
    pub fn destructor(mut self, f: impl Fn(&mut Value) + 'static) -> Self {
        self.destructor = Some(Rc::new(f));
        self
    }

    /// Register the aggregate.
    pub fn build(self) -> DescriptorId {
        let registry = self.registry;
        let id = if self.polymorphic {
            registry.create_object_aggregate(self.name, self.base)
        } else {
            registry.create_aggregate(self.name, self.base)
        };
        for (name, descriptor) in self.fields {
            registry.add_field(id, name, descriptor);
        }
        for (name, spec) in self.virtual_fields {
            registry.add_virtual_field(id, name, spec);
        }
        let hooks = &mut registry.get_mut(id).hooks;
        hooks.constructor = self.constructor;
        hooks.destructor = self.destructor;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_registers_fields_and_hooks() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let id = registry
            .aggregate("Node")
            .polymorphic()
            .field("name", b.string)
            .field("weight", b.u16)
            .virtual_field("all", "name;weight")
            .constructor(|v| {
                if let Some(fields) = v.fields_mut() {
                    fields[1] = Value::Int(3);
                }
            })
            .build();
        let d = registry.get(id);
        assert!(d.is_polymorphic());
        assert!(d.constructor().is_some());
        assert_eq!(registry.field_count(id), 2);
        assert_eq!(registry.field(id, 1).offset(), 8);
        assert_eq!(registry.get(id).size(), 16);
        let value = registry.create_empty_value(id);
        assert_eq!(value.fields().map(|f| f[1].clone()), Some(Value::Int(3)));
    }
}
