// zsk-common: identifier allocation, field encoding and wire types for zsk

pub mod clock;
pub mod fields;
pub mod ids;
pub mod types;
