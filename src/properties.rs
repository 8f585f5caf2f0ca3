//! Property access bridge between registered objects and the wire.
//!
//! Reads go host value → codec bytes; writes go codec bytes → host value.
//! The write path deliberately performs no existence or type check on the
//! property name: the host accepts unknown names as dynamic properties, and
//! callers may rely on that.

use anyhow::{Context, Result};

use crate::host::{HostObject, ValueCodec};
use crate::protocol::Property;

/// Read every introspectable property of `object`, encoding each value
/// through the codec. Order follows the host's declared order.
pub fn read_all(object: &dyn HostObject, codec: &dyn ValueCodec) -> Vec<Property> {
    object
        .properties()
        .into_iter()
        .map(|p| Property {
            name: p.name,
            writable: p.writable,
            value: codec.encode(&p.value),
        })
        .collect()
}

/// Decode `encoded` and assign it to the named property of `object`.
///
/// # Errors
///
/// Fails only when the value bytes cannot be decoded; the assignment
/// itself is unchecked.
pub fn write(
    object: &dyn HostObject,
    codec: &dyn ValueCodec,
    name: &str,
    encoded: &[u8],
) -> Result<()> {
    let value = codec
        .decode(encoded)
        .with_context(|| format!("undecodable value for property {name:?}"))?;
    object.set_property(name, value);
    Ok(())
}

/// Default value codec: property values as JSON text.
#[derive(Debug, Default)]
pub struct JsonValueCodec;

impl ValueCodec for JsonValueCodec {
    fn encode(&self, value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap_or_default()
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        serde_json::from_slice(bytes).context("invalid JSON value payload")
    }
}
