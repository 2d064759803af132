//! Domain layer: value objects, aggregates, events and the access gate.
pub mod access;
pub mod aggregates;
pub mod events;
pub mod value_objects;
