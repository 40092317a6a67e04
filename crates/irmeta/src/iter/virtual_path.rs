// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Virtual fields: derived views compiled from path specs.
//!
//! Grammar:
//!
//! ```text
//! spec    := element (';' element)*
//! element := '^' | name ('/' segment)*
//! segment := name | '*'
//! ```
//!
//! `;` concatenates results. A name selects a field (pointers on the way
//! are followed). `*` takes each element of a list or the pointee of a
//! pointer. `^` splices in the same-named virtual field of a base class.
//! `"a;b/*;c/*/*"` is field `a`, then each element of list `b`, then each
//! element of each element of `c`.

use super::{Entry, EntryIterator, MetaIterator, ObjectRef};
use crate::descriptor::{DescriptorId, DescriptorKind};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Expand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathElement {
    Inherit,
    Path { head: String, rest: Vec<Segment> },
}

/// Compiled virtual field spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    elements: Vec<PathElement>,
}

impl VirtualNode {
    /// Compile `spec`; malformed specs are fatal.
    pub(crate) fn compile(spec: &str) -> Self {
        let mut elements = Vec::new();
        for element in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            if element == "^" {
                elements.push(PathElement::Inherit);
                continue;
            }
            let mut parts = element.split('/').map(str::trim);
            let head = parts.next().unwrap_or_default();
            kernel_assert!(
                !head.is_empty() && head != "*" && head != "^",
                "virtual path element '{}' must start with a field name",
                element
            );
            let rest = parts
                .map(|part| match part {
                    "*" => Segment::Expand,
                    "" | "^" => kernel_fatal!("bad segment in virtual path '{}'", element),
                    name => Segment::Field(name.to_string()),
                })
                .collect();
            elements.push(PathElement::Path {
                head: head.to_string(),
                rest,
            });
        }
        Self { elements }
    }
}

// Nearest declaration of `name` at or above `from` in the chain of `object`.
fn declaration(
    object: &ObjectRef<'_>,
    name: &str,
    from: DescriptorId,
) -> Option<(DescriptorId, Rc<VirtualNode>)> {
    let registry = object.registry();
    let mut current = Some(from);
    while let Some(level) = current {
        let info = registry.get(level).aggregate()?;
        if let Some(spec) = info.virtual_field(name) {
            let node = info
                .virtual_cache
                .borrow_mut()
                .entry(name.to_string())
                .or_insert_with(|| Rc::new(VirtualNode::compile(spec)))
                .clone();
            return Some((level, node));
        }
        current = info.base();
    }
    None
}

fn follow_pointers<'a>(mut object: ObjectRef<'a>) -> Option<ObjectRef<'a>> {
    while matches!(object.registry().get(object.descriptor()).kind(), DescriptorKind::Pointer(_)) {
        object = object.deref()?;
    }
    Some(object)
}

fn evaluate<'a>(
    object: ObjectRef<'a>,
    name: &str,
    level: DescriptorId,
    node: &VirtualNode,
) -> Vec<Entry<'a>> {
    let registry = object.registry();
    let mut out = Vec::new();
    for element in &node.elements {
        match element {
            PathElement::Inherit => {
                let base = registry.get(level).base();
                let Some((declaring, inherited)) =
                    base.and_then(|b| declaration(&object, name, b))
                else {
                    kernel_fatal!(
                        "virtual field '{}' of '{}' has no base declaration to inherit",
                        name,
                        registry.name_of(level)
                    );
                };
                out.extend(evaluate(object, name, declaring, &inherited));
            }
            PathElement::Path { head, rest } => {
                let member = registry
                    .field_by_name(object.descriptor(), head)
                    .map(|(_, f)| f.name());
                let mut current: Vec<Entry<'a>> = vec![(member, object.field(head))];
                for segment in rest {
                    current = current
                        .into_iter()
                        .flat_map(|(entry_name, entry)| step(entry_name, entry, segment))
                        .collect();
                }
                out.extend(current);
            }
        }
    }
    out
}

fn step<'a>(name: Option<&'a str>, object: ObjectRef<'a>, segment: &Segment) -> Vec<Entry<'a>> {
    match segment {
        Segment::Field(field) => {
            let Some(target) = follow_pointers(object) else {
                return Vec::new();
            };
            let registry = target.registry();
            let member = registry
                .field_by_name(target.descriptor(), field)
                .map(|(_, f)| f.name());
            vec![(member, target.field(field))]
        }
        Segment::Expand => match object.registry().get(object.descriptor()).kind() {
            DescriptorKind::List(_) => object.elements().map(|(_, e)| (None, e)).collect(),
            DescriptorKind::Pointer(_) => object.deref().map(|t| (name, t)).into_iter().collect(),
            _ => kernel_fatal!("'*' applied to '{}'", object.type_name()),
        },
    }
}

/// Iterates the results of a virtual field. Results are computed when the
/// iterator is created and again on every [`MetaIterator::first`].
#[derive(Clone)]
pub struct VirtualIterator<'a> {
    object: ObjectRef<'a>,
    level: DescriptorId,
    node: Rc<VirtualNode>,
    name: String,
    results: EntryIterator<'a>,
}

impl<'a> VirtualIterator<'a> {
    /// Iterator over virtual field `name` of `object`; fatal if undeclared.
    pub fn new(object: ObjectRef<'a>, name: &str) -> Self {
        let Some((level, node)) = declaration(&object, name, object.descriptor()) else {
            kernel_fatal!("'{}' has no virtual field '{}'", object.type_name(), name);
        };
        let results = EntryIterator::new(evaluate(object, name, level, &node));
        Self {
            object,
            level,
            node,
            name: name.to_string(),
            results,
        }
    }
}

impl<'a> MetaIterator<'a> for VirtualIterator<'a> {
    fn current(&self) -> Option<ObjectRef<'a>> {
        self.results.current()
    }

    fn current_name(&self) -> Option<&'a str> {
        self.results.current_name()
    }

    fn next(&mut self) {
        self.results.next();
    }

    fn first(&mut self) {
        let entries = evaluate(self.object, &self.name, self.level, &self.node);
        self.results = EntryIterator::new(entries);
    }

    fn length(&self) -> usize {
        self.results.length()
    }

    fn boxed_clone(&self) -> Box<dyn MetaIterator<'a> + 'a> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::registry::Registry;
    use crate::value::Value;

    #[test]
    fn test_compile() {
        let node = VirtualNode::compile("a; b/*;c/*/*;^");
        assert_eq!(node.elements.len(), 4);
        assert_eq!(node.elements[3], PathElement::Inherit);
        assert_eq!(
            node.elements[2],
            PathElement::Path {
                head: "c".into(),
                rest: vec![Segment::Expand, Segment::Expand]
            }
        );
    }

    #[test]
    #[should_panic(expected = "must start with a field name")]
    fn test_compile_rejects_leading_star() {
        VirtualNode::compile("*/a");
    }

    #[test]
    fn test_virtual_field_paths() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let ints = registry.get_list(b.i32, "LIST:Vec<i32>");
        let nested = registry.get_list(ints, "LIST:Vec<Vec<i32>>");
        let base = registry
            .aggregate("Base")
            .field("id", b.i32)
            .virtual_field("all", "id")
            .build();
        let node = registry
            .aggregate("Node")
            .base(base)
            .field("a", b.i32)
            .field("b", ints)
            .field("c", nested)
            .virtual_field("all", "^;a;b/*;c/*/*")
            .build();
        let mut heap = Heap::new();
        let h = heap.alloc(
            node,
            Value::Aggregate(vec![
                Value::Int(0),
                Value::Int(1),
                Value::List(vec![Value::Int(2), Value::Int(3)]),
                Value::List(vec![
                    Value::List(vec![Value::Int(4)]),
                    Value::List(vec![Value::Int(5), Value::Int(6)]),
                ]),
            ]),
        );
        let object = ObjectRef::object(&registry, &heap, h);
        let mut it = object.virtual_field("all");
        assert_eq!(it.length(), 7);
        assert_eq!(it.current_name(), Some("id"));
        let values: Vec<i128> = super::super::Elements::new(it.boxed_clone())
            .map(|(_, o)| o.as_int())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6]);
        it.next();
        assert_eq!(it.current_name(), Some("a"));
        it.first();
        assert_eq!(it.current_name(), Some("id"));
    }
}
