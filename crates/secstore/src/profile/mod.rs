//! Profile property bags and their compact three-field encoding.
//!
//! - [`property`]: property definitions, values and the ordered collection.
//! - [`codec`]: `ProfileCodec`, packing a collection into the `names`,
//!   `string_values` and `binary_values` fields of a profile record.

pub mod codec;
pub mod property;

pub use codec::{DecodeReport, EncodedProfile, ProfileCodec, NULL_LENGTH};
pub use property::{
    PropertyCollection, PropertyDefinition, PropertyKind, PropertyValue, ProfileProperty,
};
