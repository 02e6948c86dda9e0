//! # Kibana Clients
//!
//! REST schemes for the Kibana kinds. Saved objects and data views live in a
//! space; paths are prefixed with `/s/{space}` outside the default space.

use crate::crd::kibana::space_prefix;
use crate::crd::{DataView, KibanaRole, SavedObject, Space};
use crate::external::rest::{Endpoint, Operation, RestResource};
use crate::external::HttpMethod;
use serde_json::{Map, Value};

#[must_use]
pub fn role() -> RestResource<KibanaRole> {
    RestResource::put_by_name("KibanaRole", |_, id| format!("/api/security/role/{id}"))
}

/// Spaces are created by POST to the collection with the id in the body
#[must_use]
pub fn space() -> RestResource<Space> {
    RestResource::with_endpoints(
        "Space",
        |_, id| format!("/api/spaces/space/{id}"),
        Endpoint {
            method: HttpMethod::Post,
            path: |_, _| "/api/spaces/space".to_string(),
        },
        Endpoint {
            method: HttpMethod::Put,
            path: |_, id| format!("/api/spaces/space/{id}"),
        },
    )
    .preparing(|_, id, _, body| {
        let mut map = object_of(body);
        map.insert("id".to_string(), Value::String(id.to_string()));
        map.entry("name")
            .or_insert_with(|| Value::String(id.to_string()));
        Value::Object(map)
    })
}

#[must_use]
pub fn saved_object() -> RestResource<SavedObject> {
    fn item(obj: &SavedObject, id: &str) -> String {
        format!(
            "{}/api/saved_objects/{}/{id}",
            space_prefix(obj.spec.space.as_deref()),
            obj.spec.object_type.as_str()
        )
    }
    RestResource::with_endpoints(
        "SavedObject",
        item,
        Endpoint {
            method: HttpMethod::Post,
            path: item,
        },
        Endpoint {
            method: HttpMethod::Put,
            path: item,
        },
    )
}

/// Data views wrap their body in `{"data_view": ...}`; updates go to the item
/// path with POST and must not repeat the id
#[must_use]
pub fn data_view() -> RestResource<DataView> {
    fn item(obj: &DataView, id: &str) -> String {
        format!(
            "{}/api/data_views/data_view/{id}",
            space_prefix(obj.spec.space.as_deref())
        )
    }
    RestResource::with_endpoints(
        "DataView",
        item,
        Endpoint {
            method: HttpMethod::Post,
            path: |obj, _| {
                format!(
                    "{}/api/data_views/data_view",
                    space_prefix(obj.spec.space.as_deref())
                )
            },
        },
        Endpoint {
            method: HttpMethod::Post,
            path: item,
        },
    )
    .preparing(|_, id, operation, body| {
        let mut view = object_of(body);
        match operation {
            Operation::Create => {
                view.insert("id".to_string(), Value::String(id.to_string()));
            }
            Operation::Update => {
                view.remove("id");
            }
        }
        serde_json::json!({ "data_view": view })
    })
}

fn object_of(body: &Value) -> Map<String, Value> {
    match body {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}
