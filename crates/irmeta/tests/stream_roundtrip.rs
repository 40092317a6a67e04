// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream round trips through `BinaryWriter` / `BinaryReader`.

use irmeta::stream::codec;
use irmeta::{
    BinaryReader, BinaryWriter, DescriptorId, Handle, Heap, Registry, StreamOptions, Value,
};

fn round_trip(registry: &Registry, heap: &Heap, roots: &[Handle]) -> (Heap, Vec<Handle>) {
    round_trip_with(registry, heap, roots, StreamOptions::default())
}

fn round_trip_with(
    registry: &Registry,
    heap: &Heap,
    roots: &[Handle],
    options: StreamOptions,
) -> (Heap, Vec<Handle>) {
    let mut writer = BinaryWriter::new(options);
    for root in roots {
        writer.write_object(registry, heap, *root);
    }
    let bytes = writer.write_close();

    let mut out = Heap::new();
    let mut reader = BinaryReader::new(&bytes, registry);
    let read: Vec<Handle> = roots
        .iter()
        .map(|_| reader.read_object(registry, &mut out).expect("non-null root"))
        .collect();
    reader.read_close(registry, &mut out);
    (out, read)
}

fn point(registry: &mut Registry) -> DescriptorId {
    let i32_id = registry.builtins().i32;
    registry.aggregate("Point").field("x", i32_id).field("y", i32_id).build()
}

fn pointee(heap: &Heap, handle: Handle, field: usize) -> Option<Handle> {
    heap.value(handle).fields().expect("aggregate")[field]
        .as_pointer()
        .expect("pointer field")
}

#[test]
fn test_point_fields_survive() {
    let mut registry = Registry::new();
    let p = point(&mut registry);
    let mut heap = Heap::new();
    let h = heap.alloc(p, Value::Aggregate(vec![Value::Int(i32::MAX.into()), Value::Int(-5)]));

    let (out, roots) = round_trip(&registry, &heap, &[h]);
    assert_eq!(out.descriptor_of(roots[0]), Some(p));
    assert_eq!(out.value(roots[0]), heap.value(h));
}

#[test]
fn test_shared_pointee_keeps_identity() {
    let mut registry = Registry::new();
    let p = point(&mut registry);
    let owner = registry.owning_pointer(p);
    let pair = registry.aggregate("Pair").field("first", owner).field("second", owner).build();

    let mut heap = Heap::new();
    let target = heap.alloc(p, Value::Aggregate(vec![Value::Int(1), Value::Int(2)]));
    let h = heap.alloc(
        pair,
        Value::Aggregate(vec![Value::Pointer(Some(target)), Value::Pointer(Some(target))]),
    );

    let (out, roots) = round_trip(&registry, &heap, &[h]);
    let first = pointee(&out, roots[0], 0).expect("first");
    let second = pointee(&out, roots[0], 1).expect("second");
    assert_eq!(first, second);
    assert_ne!(first, roots[0]);
    assert_eq!(out.value(first), heap.value(target));
    assert_eq!(out.len(), 2);
}

#[test]
fn test_union_tag_selects_alternative() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let u = registry.create_union("Number", None);
    registry.add_field(u, "tag", b.i32);
    registry.add_union_field(u, "a", b.i64);
    registry.add_union_field(u, "b", b.i32);
    registry.set_tag_field(u, "tag");

    let mut value = registry.create_empty_value(u);
    registry.select_alternative(u, &mut value, 1, Value::Int(-77));
    assert_eq!(registry.proper_field_count(u, &value), 1);
    let mut heap = Heap::new();
    let h = heap.alloc(u, value);

    let (out, roots) = round_trip(&registry, &heap, &[h]);
    let read = out.value(roots[0]);
    assert_eq!(registry.active_alternative(u, read), Some(1));
    let union = read.as_union().expect("union value");
    assert_eq!(union.fields, vec![Value::Int(1)]);
    assert_eq!(union.active, Some((1, Box::new(Value::Int(-77)))));
    assert_eq!(registry.proper_field(u, read, 0).map(|f| f.name()), Some("b"));
}

#[test]
fn test_selector_union_writes_index() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let u = registry.create_union("Either", None);
    registry.add_field(u, "kind", b.u8);
    registry.add_union_field(u, "small", b.u8);
    registry.add_union_field(u, "name", b.string);
    registry.set_selector(u, |value| match value.fields()?.first()?.as_int()? {
        0 => Some(0),
        1 => Some(1),
        _ => None,
    });

    let mut heap = Heap::new();
    let mut named = registry.create_empty_value(u);
    named.as_union_mut().expect("union").fields[0] = Value::Int(1);
    registry.select_alternative(u, &mut named, 1, Value::Str("ir".into()));
    let named = heap.alloc(u, named);
    let mut empty = registry.create_empty_value(u);
    empty.as_union_mut().expect("union").fields[0] = Value::Int(9);
    registry.clear_alternative(u, &mut empty);
    let empty = heap.alloc(u, empty);

    let (out, roots) = round_trip(&registry, &heap, &[named, empty]);
    assert_eq!(out.value(roots[0]), heap.value(named));
    assert_eq!(out.value(roots[1]), heap.value(empty));
    assert_eq!(registry.proper_field_count(u, out.value(roots[1])), 0);
}

#[test]
fn test_lists_static_pointers_and_strings() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let p = point(&mut registry);
    let points = registry.get_list(p, "LIST:Vec<Point>");
    let ints = registry.get_list(b.i64, "LIST:Vec<i64>");
    let embedded = registry.get_pointer(p, true, true, false);
    let poly = registry
        .aggregate("Polyline")
        .field("name", b.string)
        .field("points", points)
        .field("weights", ints)
        .field("anchor", embedded)
        .field("spare", embedded)
        .build();

    let mut heap = Heap::new();
    let xy = |x: i128, y: i128| Value::Aggregate(vec![Value::Int(x), Value::Int(y)]);
    let h = heap.alloc(
        poly,
        Value::Aggregate(vec![
            Value::Str("outline \u{2192} 1".into()),
            Value::List(vec![xy(0, 0), xy(3, 4), xy(-1, 9)]),
            Value::List(vec![Value::Int(i64::MIN.into()), Value::Int(0), Value::Int(300)]),
            Value::Static(Some(Box::new(xy(7, 8)))),
            Value::Static(None),
        ]),
    );

    let (out, roots) = round_trip(&registry, &heap, &[h]);
    assert_eq!(out.value(roots[0]), heap.value(h));
    // static pointees are embedded, not separate objects
    assert_eq!(out.len(), 1);
}

#[test]
fn test_polymorphic_reference_keeps_runtime_type() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let shape = registry.aggregate("Shape").polymorphic().field("id", b.u32).build();
    let circle = registry.aggregate("Circle").base(shape).field("radius", b.u32).build();
    let owner = registry.owning_pointer(shape);
    let reference = registry.reference_pointer(shape);
    let scene = registry
        .aggregate("Scene")
        .field("main", owner)
        .field("focus", reference)
        .build();

    let mut heap = Heap::new();
    let c = heap.alloc(circle, Value::Aggregate(vec![Value::Int(1), Value::Int(10)]));
    let both = vec![Value::Pointer(Some(c)), Value::Pointer(Some(c))];
    let s = heap.alloc(scene, Value::Aggregate(both));

    let (out, roots) = round_trip(&registry, &heap, &[s]);
    let main = pointee(&out, roots[0], 0).expect("main");
    assert_eq!(pointee(&out, roots[0], 1), Some(main));
    assert_eq!(out.descriptor_of(main), Some(circle));
    assert_eq!(out.value(main), heap.value(c));
}

#[test]
fn test_cyclic_graph() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let node = registry.create_aggregate("Node", None);
    let next = registry.reference_pointer(node);
    registry.add_field(node, "id", b.i32);
    registry.add_field(node, "next", next);

    let mut heap = Heap::new();
    let a = heap.reserve();
    let c = heap.alloc(node, Value::Aggregate(vec![Value::Int(2), Value::Pointer(Some(a))]));
    heap.fill(a, node, Value::Aggregate(vec![Value::Int(1), Value::Pointer(Some(c))]));

    let (out, roots) = round_trip(&registry, &heap, &[a]);
    let second = pointee(&out, roots[0], 1).expect("second");
    assert_eq!(pointee(&out, second, 1), Some(roots[0]));
    assert_eq!(out.value(second).fields().expect("fields")[0], Value::Int(2));
}

#[test]
fn test_init_hooks_run_after_read() {
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let cached = registry
        .aggregate("Cached")
        .field("input", b.i64)
        .field("derived", b.i64)
        .build();
    registry.set_post_init(cached, |value| {
        if let Some(fields) = value.fields_mut() {
            let input = fields[0].as_int().unwrap_or(0);
            fields[1] = Value::Int(input * 2);
        }
    });

    let mut heap = Heap::new();
    let h = heap.alloc(cached, Value::Aggregate(vec![Value::Int(21), Value::Int(0)]));
    let (out, roots) = round_trip(&registry, &heap, &[h]);
    assert_eq!(out.value(roots[0]).fields().expect("fields")[1], Value::Int(42));
}

#[test]
fn test_explicit_ids_match_compact() {
    let mut registry = Registry::new();
    let p = point(&mut registry);
    let owner = registry.owning_pointer(p);
    let list = registry.get_list(owner, "LIST:Vec<PTR:O:::Point>");
    let bag = registry.aggregate("Bag").field("items", list).build();

    let mut heap = Heap::new();
    let items: Vec<Value> = (0..40)
        .map(|i| {
            let h = heap.alloc(p, Value::Aggregate(vec![Value::Int(i), Value::Int(-i)]));
            Value::Pointer(Some(h))
        })
        .collect();
    let h = heap.alloc(bag, Value::Aggregate(vec![Value::List(items)]));

    let (compact, compact_roots) = round_trip(&registry, &heap, &[h]);
    let explicit_options = StreamOptions::new().compact_ids(false);
    let (explicit, explicit_roots) = round_trip_with(&registry, &heap, &[h], explicit_options);
    assert_eq!(compact.len(), 41);
    assert_eq!(explicit.len(), 41);
    let values = |heap: &Heap, root: Handle| -> Vec<Value> {
        heap.value(root).fields().expect("fields")[0]
            .as_list()
            .expect("list")
            .iter()
            .map(|item| heap.value(item.as_pointer().flatten().expect("item")).clone())
            .collect()
    };
    assert_eq!(values(&compact, compact_roots[0]), values(&explicit, explicit_roots[0]));
}

#[test]
fn test_randomized_round_trips() {
    let mut rng = fastrand::Rng::with_seed(0x1_2E7A);
    let mut registry = Registry::new();
    let b = registry.builtins().clone();
    let p = point(&mut registry);
    let owner = registry.owning_pointer(p);
    let refs = registry.get_list(owner, "LIST:Vec<PTR:O:::Point>");
    let record = registry
        .aggregate("Record")
        .field("signed", b.i64)
        .field("unsigned", b.u64)
        .field("small", b.i8)
        .field("label", b.string)
        .field("points", refs)
        .build();

    for _ in 0..50 {
        let mut heap = Heap::new();
        let pool: Vec<Handle> = (0..rng.usize(1..6))
            .map(|_| {
                let x = rng.i32(..);
                let y = rng.i32(..);
                heap.alloc(p, Value::Aggregate(vec![Value::Int(x.into()), Value::Int(y.into())]))
            })
            .collect();
        let points = (0..rng.usize(0..12))
            .map(|_| Value::Pointer(Some(pool[rng.usize(..pool.len())])))
            .collect();
        let label: String = (0..rng.usize(0..20)).map(|_| rng.alphanumeric()).collect();
        let h = heap.alloc(
            record,
            Value::Aggregate(vec![
                Value::Int(rng.i64(..).into()),
                Value::Int(rng.u64(..).into()),
                Value::Int(rng.i8(..).into()),
                Value::Str(label),
                Value::List(points),
            ]),
        );

        let (out, roots) = round_trip(&registry, &heap, &[h]);
        let original = heap.value(h).fields().expect("fields");
        let read = out.value(roots[0]).fields().expect("fields");
        assert_eq!(original[..4], read[..4]);
        let targets = |heap: &Heap, list: &Value| -> Vec<(Handle, Value)> {
            list.as_list()
                .expect("list")
                .iter()
                .map(|v| {
                    let h = v.as_pointer().flatten().expect("pointer");
                    (h, heap.value(h).clone())
                })
                .collect()
        };
        let before = targets(&heap, &original[4]);
        let after = targets(&out, &read[4]);
        assert_eq!(before.len(), after.len());
        for i in 0..before.len() {
            assert_eq!(before[i].1, after[i].1);
            for j in 0..before.len() {
                // sharing is preserved exactly
                assert_eq!(before[i].0 == before[j].0, after[i].0 == after[j].0);
            }
        }
    }
}

#[test]
fn test_integer_encoding_sizes() {
    let len = |v: i128| {
        let mut buf = Vec::new();
        codec::encode_int(&mut buf, v);
        buf.len()
    };
    assert_eq!(len(0), 1);
    assert_eq!(len(127), 1);
    assert_eq!(len(128), 2);
    assert_eq!(len(255), 2);
    assert_eq!(len(256), 3);
    assert_eq!(len(-1), 1);
    assert_eq!(len(-128), 2);
    assert_eq!(len(-129), 2);
    assert_eq!(len(-257), 3);
    assert_eq!(len(i64::MAX.into()), 9);
    assert_eq!(len(u64::MAX.into()), 9);
    assert_eq!(len(i128::MIN), 17);
}
