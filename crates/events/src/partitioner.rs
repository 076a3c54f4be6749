use xxhash_rust::xxh3::xxh3_64;

use shelfline_core::ProductId;

/// Message key for a product: `product-{id}`.
pub fn message_key(id: ProductId) -> String {
    format!("product-{id}")
}

/// Stable key to partition mapping.
///
/// Uses xxh3 so the mapping is identical across processes and releases.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    let partitions = u64::from(partitions.max(1));
    (xxh3_64(key.as_bytes()) % partitions) as u32
}
