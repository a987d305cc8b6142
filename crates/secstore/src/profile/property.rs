//! Profile property model: definitions, values and the ordered collection
//! the codec reads from and writes into.

use serde::{Deserialize, Serialize};

use crate::compare;
use crate::error::{Result, SecStoreError};

/// Storage class of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    String,
    Binary,
}

impl PropertyKind {
    /// Single-letter tag used in the encoded names stream.
    pub fn tag(self) -> &'static str {
        match self {
            PropertyKind::String => "S",
            PropertyKind::Binary => "B",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "S" => Some(PropertyKind::String),
            "B" => Some(PropertyKind::Binary),
            _ => None,
        }
    }
}

/// A serialized property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Binary(_) => PropertyKind::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            PropertyValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Binary(b) => Some(b),
            PropertyValue::String(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Binary(b)
    }
}

/// Schema entry for one profile property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    pub kind: PropertyKind,
    /// Anonymous callers may read and write this property.
    pub allow_anonymous: bool,
    /// The property may hold an explicit null.
    pub nullable: bool,
    pub default_value: Option<PropertyValue>,
}

impl PropertyDefinition {
    /// A nullable string property with no default.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::String)
    }

    /// A nullable binary property with no default.
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Binary)
    }

    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            allow_anonymous: false,
            nullable: true,
            default_value: None,
        }
    }

    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Check that a name can be embedded in the `:`-separated names stream.
pub fn validate_property_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(':') {
        return Err(SecStoreError::InvalidPropertyName(name.to_string()));
    }
    Ok(())
}

fn check_kind(definition: &PropertyDefinition, value: &PropertyValue) -> Result<()> {
    if value.kind() != definition.kind {
        return Err(SecStoreError::PropertyKindMismatch {
            name: definition.name.clone(),
            expected: definition.kind,
            found: value.kind(),
        });
    }
    Ok(())
}

/// A property definition together with its current value and state flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileProperty {
    definition: PropertyDefinition,
    value: Option<PropertyValue>,
    is_dirty: bool,
    using_default_value: bool,
    deserialized: bool,
}

impl ProfileProperty {
    /// Start at the definition's default value, clean.
    pub fn new(definition: PropertyDefinition) -> Self {
        let value = definition.default_value.clone();
        Self {
            definition,
            value,
            is_dirty: false,
            using_default_value: true,
            deserialized: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &PropertyDefinition {
        &self.definition
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn using_default_value(&self) -> bool {
        self.using_default_value
    }

    /// `true` once the value was restored by the codec.
    pub fn deserialized(&self) -> bool {
        self.deserialized
    }

    /// Assign a value as the caller; marks the property dirty.
    ///
    /// # Errors
    ///
    /// `SecStoreError::PropertyKindMismatch` if the value's kind differs from
    /// the definition's. The property is left unchanged.
    pub fn set(&mut self, value: Option<PropertyValue>) -> Result<()> {
        if let Some(v) = &value {
            check_kind(&self.definition, v)?;
        }
        self.value = value;
        self.is_dirty = true;
        self.using_default_value = false;
        Ok(())
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub(crate) fn apply_decoded(&mut self, value: Option<PropertyValue>) {
        self.value = value;
        self.is_dirty = false;
        self.using_default_value = false;
        self.deserialized = true;
    }
}

/// Ordered set of profile properties.
///
/// Visitation order is insertion order; it defines the payload layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyCollection {
    properties: Vec<ProfileProperty>,
}

impl PropertyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection of clean properties from a schema.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = PropertyDefinition>,
    ) -> Result<Self> {
        let mut collection = Self::new();
        for definition in definitions {
            collection.add(definition)?;
        }
        Ok(collection)
    }

    /// Append a property.
    ///
    /// # Errors
    ///
    /// `SecStoreError::InvalidPropertyName` for empty names, names containing
    /// `:`, or names already present. `SecStoreError::PropertyKindMismatch`
    /// when the default value does not match the declared kind.
    pub fn add(&mut self, definition: PropertyDefinition) -> Result<()> {
        validate_property_name(&definition.name)?;
        if let Some(default) = &definition.default_value {
            check_kind(&definition, default)?;
        }
        if self.get(&definition.name).is_some() {
            return Err(SecStoreError::InvalidPropertyName(format!(
                "{} (duplicate)",
                definition.name
            )));
        }
        self.properties.push(ProfileProperty::new(definition));
        Ok(())
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&ProfileProperty> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProfileProperty> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    /// Lookup honouring `case_sensitive`; an exact match wins.
    pub fn find_mut(&mut self, name: &str, case_sensitive: bool) -> Option<&mut ProfileProperty> {
        let index = self
            .properties
            .iter()
            .position(|p| p.name() == name)
            .or_else(|| {
                self.properties
                    .iter()
                    .position(|p| compare::equals(p.name(), name, case_sensitive))
            })?;
        self.properties.get_mut(index)
    }

    /// Current value of a property, `None` if unknown or null.
    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.get(name).and_then(ProfileProperty::value)
    }

    /// Assign a property value as the caller.
    ///
    /// # Errors
    ///
    /// `SecStoreError::NotFound` if no property has this name and
    /// `SecStoreError::PropertyKindMismatch` if the value is of the wrong kind.
    pub fn set(&mut self, name: &str, value: Option<PropertyValue>) -> Result<()> {
        let property = self
            .get_mut(name)
            .ok_or_else(|| SecStoreError::NotFound(format!("profile property {name}")))?;
        property.set(value)
    }

    pub fn mark_all_clean(&mut self) {
        for property in &mut self.properties {
            property.mark_clean();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileProperty> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
