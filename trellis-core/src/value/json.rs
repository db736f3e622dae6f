//! JSON conversion.
//!
//! JSON objects become records and arrays become lists. Going the other way,
//! sets serialize as arrays, and maps serialize as objects when every key is
//! a string and as `[key, value]` pairs otherwise. A reference cycle is cut
//! with `null`.

use std::collections::HashSet;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as Json};

use super::{Data, Object, ObjectId, Value};

// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// Build a value from a JSON document. Nested containers become fresh
    /// data objects.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s.as_str()),
            Json::Array(items) => Value::Object(Object::list(items.iter().map(Value::from_json))),
            Json::Object(fields) => Value::Object(Object::record(
                fields.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value as JSON without tracking any reads.
    pub fn to_json(&self) -> Json {
        to_json(self, &mut HashSet::new())
    }
}

impl Object {
    /// Snapshot this object as JSON without tracking any reads.
    pub fn to_json(&self) -> Json {
        object_to_json(self, &mut HashSet::new())
    }
}

fn to_json(value: &Value, path: &mut HashSet<ObjectId>) -> Json {
    match value {
        Value::Undefined | Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::Str(s) => Json::String(s.to_string()),
        Value::Object(o) => object_to_json(o, path),
        Value::Reactive(r) => object_to_json(r.raw(), path),
    }
}

fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Json::from(n as i64)
    } else {
        JsonNumber::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

fn object_to_json(object: &Object, path: &mut HashSet<ObjectId>) -> Json {
    if !path.insert(object.id()) {
        return Json::Null;
    }
    let json = match &*object.read() {
        Data::Record(record) => {
            let mut fields = JsonMap::new();
            for (k, v) in &record.fields {
                fields.insert(k.to_string(), to_json(v, path));
            }
            Json::Object(fields)
        }
        Data::List(items) => Json::Array(items.iter().map(|v| to_json(v, path)).collect()),
        Data::Set(members) => Json::Array(members.iter().map(|v| to_json(v, path)).collect()),
        Data::Map(entries) => {
            if entries.keys().all(|k| matches!(k, Value::Str(_))) {
                let mut fields = JsonMap::new();
                for (k, v) in entries {
                    fields.insert(k.as_str().unwrap_or_default().to_string(), to_json(v, path));
                }
                Json::Object(fields)
            } else {
                Json::Array(
                    entries
                        .iter()
                        .map(|(k, v)| Json::Array(vec![to_json(k, path), to_json(v, path)]))
                        .collect(),
                )
            }
        }
    };
    path.remove(&object.id());
    json
}
