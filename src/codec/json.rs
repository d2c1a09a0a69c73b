//! JSONPB encoding.
//!
//! Bodies are the canonical protobuf JSON projection framed by an XSSI
//! guard line and a trailing newline. Decoding tolerates the guard.
//!
//! `google.protobuf.FieldMask` fields accept both the canonical string
//! form (`"name"`, `"a,b.c"`) and the structured `{"paths": [...]}` form.

use prost_reflect::{DeserializeOptions, DynamicMessage, Kind, MessageDescriptor, SerializeOptions};
use serde_json::Value;

use super::{CodecError, DecodeOptions};

/// Guard line written before every JSON body.
pub const XSSI_PREAMBLE: &str = ")]}'\n";

const FIELD_MASK_TYPE_NAME: &str = "google.protobuf.FieldMask";
const WELL_KNOWN_PACKAGE: &str = "google.protobuf.";

pub(crate) fn encode(msg: &DynamicMessage, framed: bool) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    if framed {
        out.extend_from_slice(XSSI_PREAMBLE.as_bytes());
    }
    let mut serializer = serde_json::Serializer::new(&mut out);
    msg.serialize_with_options(&mut serializer, &SerializeOptions::new())
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    if framed {
        out.push(b'\n');
    }
    Ok(out)
}

pub(crate) fn decode(
    body: &[u8],
    desc: MessageDescriptor,
    options: &DecodeOptions,
) -> Result<DynamicMessage, CodecError> {
    let guard = XSSI_PREAMBLE.trim_end().as_bytes();
    let body = body.strip_prefix(guard).unwrap_or(body);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::Decode(
            "empty body, a JSON value is required".to_string(),
        ));
    }

    let mut value: Value =
        serde_json::from_slice(body).map_err(|e| CodecError::Decode(e.to_string()))?;
    alias_field_masks(&mut value, &desc);

    let de_options = DeserializeOptions::new().deny_unknown_fields(!options.discard_unknown_fields);
    DynamicMessage::deserialize_with_options(desc, value, &de_options)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Rewrites structured field masks into their canonical string form.
fn alias_field_masks(value: &mut Value, desc: &MessageDescriptor) {
    if desc.full_name() == FIELD_MASK_TYPE_NAME {
        if let Some(joined) = structured_paths(value) {
            *value = Value::String(joined);
        }
        return;
    }
    if desc.full_name().starts_with(WELL_KNOWN_PACKAGE) {
        return;
    }

    let Value::Object(fields) = value else {
        return;
    };
    for (key, field_value) in fields.iter_mut() {
        let Some(field) = desc
            .get_field_by_json_name(key)
            .or_else(|| desc.get_field_by_name(key))
        else {
            continue;
        };
        let Kind::Message(field_desc) = field.kind() else {
            continue;
        };

        if field.is_map() {
            let Kind::Message(value_desc) = field_desc.map_entry_value_field().kind() else {
                continue;
            };
            if let Value::Object(entries) = field_value {
                for entry in entries.values_mut() {
                    alias_field_masks(entry, &value_desc);
                }
            }
        } else if field.is_list() {
            if let Value::Array(items) = field_value {
                for item in items {
                    alias_field_masks(item, &field_desc);
                }
            }
        } else {
            alias_field_masks(field_value, &field_desc);
        }
    }
}

fn structured_paths(value: &Value) -> Option<String> {
    let Value::Object(obj) = value else {
        return None;
    };
    if obj.len() != 1 {
        return None;
    }
    let paths = obj.get("paths")?.as_array()?;
    let paths = paths
        .iter()
        .map(|p| p.as_str().map(lower_camel_path))
        .collect::<Option<Vec<_>>>()?;
    Some(paths.join(","))
}

/// `foo_bar.baz_qux` → `fooBar.bazQux`
fn lower_camel_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut upper = false;
    for c in path.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
