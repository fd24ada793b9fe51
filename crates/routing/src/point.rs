//! Deterministic point identity.
//!
//! Every `(route_id, utterance)` pair maps to a stable UUIDv5 so that
//! independent sync runs agree on point identity without coordination and
//! re-embedding the same utterance upserts in place. Negative samples live
//! in a separate id namespace so a string used as both an utterance on one
//! route and a counter-example on another never collides.

use uuid::Uuid;

/// Point id for a route utterance.
pub fn positive_point_id(route_id: i64, utterance: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", route_id, utterance).as_bytes(),
    )
}

/// Point id for a route negative sample.
pub fn negative_point_id(route_id: i64, utterance: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("negative:{}:{}", route_id, utterance).as_bytes(),
    )
}
