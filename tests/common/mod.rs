//! Generators shared by the property and live PostgreSQL suites

#![allow(dead_code)]

use proptest::prelude::*;
use selector_sql::prelude::*;
use serde_json::{json, Map, Value};

/// Table every generated selector compiles against
pub fn items(name: &str) -> Table {
    Table::new(
        name,
        vec![
            ("title", SqlType::Text, true),
            ("score", SqlType::Integer, true),
            ("tags", SqlType::Array(Box::new(SqlType::Text)), true),
            ("meta", SqlType::Json, true),
        ],
    )
    .unwrap()
}

pub fn arb_text() -> impl Strategy<Value = Value> {
    prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(|s| json!(s))
}

pub fn arb_int() -> impl Strategy<Value = Value> {
    (-3i64..4).prop_map(|n| json!(n))
}

pub fn arb_json() -> impl Strategy<Value = Value> {
    prop_oneof![arb_text(), arb_int(), Just(Value::Null), any::<bool>().prop_map(Value::Bool)]
}

/// `{field: condition}` pairs that always compile against `items()`
pub fn arb_condition() -> impl Strategy<Value = (String, Value)> {
    prop_oneof![
        arb_text().prop_map(|v| ("title".to_string(), v)),
        arb_int().prop_map(|v| ("score".to_string(), json!({"$gt": v}))),
        arb_int().prop_map(|v| ("score".to_string(), json!({"$lte": v}))),
        prop::collection::vec(prop_oneof![arb_int(), Just(Value::Null)], 0..3)
            .prop_map(|vs| ("score".to_string(), json!({"$in": vs}))),
        prop::collection::vec(arb_int(), 0..3)
            .prop_map(|vs| ("score".to_string(), json!({"$nin": vs}))),
        any::<bool>().prop_map(|b| ("score".to_string(), json!({"$exists": b}))),
        Just(("score".to_string(), Value::Null)),
        arb_text().prop_map(|v| ("tags".to_string(), v)),
        prop::collection::vec(arb_text(), 1..3)
            .prop_map(|vs| ("tags".to_string(), json!({"$all": vs}))),
        (0u64..3).prop_map(|n| ("tags".to_string(), json!({"$size": n}))),
        arb_json().prop_map(|v| ("meta.kind".to_string(), v)),
        arb_int().prop_map(|v| ("meta.rank".to_string(), json!({"$gte": v}))),
        arb_int().prop_map(|v| ("score".to_string(), json!({"$not": {"$lt": v}}))),
    ]
}

pub fn arb_selector() -> impl Strategy<Value = Value> {
    let leaf = prop::collection::vec(arb_condition(), 0..3).prop_map(|conditions| {
        let mut map = Map::new();
        for (field, condition) in conditions {
            map.insert(field, condition);
        }
        Value::Object(map)
    });

    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(|s| json!({"$and": s})),
            prop::collection::vec(inner.clone(), 1..3).prop_map(|s| json!({"$or": s})),
            prop::collection::vec(inner, 1..3).prop_map(|s| json!({"$nor": s})),
        ]
    })
}

pub fn arb_document() -> impl Strategy<Value = Value> {
    (
        prop::option::of(arb_text()),
        prop::option::of(arb_int()),
        prop::option::of(prop::collection::vec(arb_text(), 0..3)),
        prop::option::of((prop::option::of(arb_json()), prop::option::of(arb_int()))),
    )
        .prop_map(|(title, score, tags, meta)| {
            let mut doc = Map::new();
            doc.insert("_id".to_string(), json!("x"));
            if let Some(title) = title {
                doc.insert("title".to_string(), title);
            }
            if let Some(score) = score {
                doc.insert("score".to_string(), score);
            }
            if let Some(tags) = tags {
                doc.insert("tags".to_string(), Value::Array(tags));
            }
            if let Some((kind, rank)) = meta {
                let mut meta = Map::new();
                if let Some(kind) = kind {
                    meta.insert("kind".to_string(), kind);
                }
                if let Some(rank) = rank {
                    meta.insert("rank".to_string(), rank);
                }
                doc.insert("meta".to_string(), Value::Object(meta));
            }
            Value::Object(doc)
        })
}
