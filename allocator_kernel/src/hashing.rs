/// Allocator Kernel v1: canonical hashing.
///
/// Deterministic canonical serialization + SHA-256 of an allocation.
/// Produces byte-identical output across platforms.
///
/// Rules:
///   - kernel_version first
///   - consumers sorted by id (UTF-8 byte order)
///   - resources inside each consumer sorted by id
///   - UTF-8 JSON, no whitespace, integers only

use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

use crate::domain::AllocationVector;
use crate::error::{KernelError, KernelResult};
use crate::KERNEL_VERSION;

/// Canonical serialization of an allocation to UTF-8 JSON bytes.
pub fn canonical_serialize(allocation: &AllocationVector) -> KernelResult<Vec<u8>> {
    let obj = build_canonical_value(allocation);
    serde_json::to_string(&obj)
        .map(String::into_bytes)
        .map_err(|e| KernelError::Config(format!("canonical_serialize: {}", e)))
}

/// SHA-256 of the canonical serialization, lowercase hex.
pub fn canonical_hash(allocation: &AllocationVector) -> KernelResult<String> {
    let bytes = canonical_serialize(allocation)?;
    Ok(hex_digest(&bytes))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Field order: kernel_version, allocation.
///
/// serde_json::Map preserves insertion order (preserve_order feature);
/// inserting from BTreeMaps gives sorted keys.
fn build_canonical_value(allocation: &AllocationVector) -> Value {
    let mut consumers = Map::new();
    for (consumer, counts) in allocation.iter() {
        let mut slice = Map::new();
        for (resource, &count) in counts {
            slice.insert(resource.clone(), Value::Number(count.into()));
        }
        consumers.insert(consumer.clone(), Value::Object(slice));
    }

    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::Number((KERNEL_VERSION as i64).into()),
    );
    root.insert("allocation".to_string(), Value::Object(consumers));
    Value::Object(root)
}
