//! # Attribute Descriptors
//!
//! Field-level metadata describing a component's byte layout. Consumers
//! (serializers, inspectors) read fields through these descriptors instead
//! of knowing the concrete type.

use bytemuck::Pod;

/// Semantic type of one component field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// `bool` stored as one byte.
    Bool,
    /// Single byte character.
    Char,
    /// `i8`.
    Int8,
    /// `i16`.
    Int16,
    /// `i32`.
    Int32,
    /// `i64`.
    Int64,
    /// `u8`.
    UInt8,
    /// `u16`.
    UInt16,
    /// `u32`.
    UInt32,
    /// `u64`.
    UInt64,
    /// `f32`.
    Float32,
    /// `f64`.
    Float64,
    /// Fixed-length vector of `i32`.
    VectorInt32,
    /// Fixed-length vector of `u32`.
    VectorUInt32,
    /// Fixed-length vector of `f32`.
    VectorFloat32,
    /// Fixed-length vector of `f64`.
    VectorFloat64,
    /// Row-major matrix of `f32`.
    MatrixFloat32,
    /// Quaternion `[x, y, z, w]` of `f32`.
    Quat,
    /// Interned string id (`u64` hash).
    StringId,
    /// Opaque bytes handled by the component's own serializer.
    Custom,
}

impl AttributeType {
    /// Byte size of one element, `None` for custom data.
    #[must_use]
    pub const fn element_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Char | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32
            | Self::UInt32
            | Self::Float32
            | Self::VectorInt32
            | Self::VectorUInt32
            | Self::VectorFloat32
            | Self::MatrixFloat32
            | Self::Quat => Some(4),
            Self::Int64
            | Self::UInt64
            | Self::Float64
            | Self::VectorFloat64
            | Self::StringId => Some(8),
            Self::Custom => None,
        }
    }
}

/// Bound, step or option value attached to an attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// Text, used for enumerated options.
    Text(String),
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Describes one field of a component.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDescription {
    /// Semantic type.
    pub ty: AttributeType,
    /// Byte offset from the start of the component.
    pub offset: usize,
    /// Field name.
    pub name: String,
    /// Lower bound for editing.
    pub min: Option<AttributeValue>,
    /// Upper bound for editing.
    pub max: Option<AttributeValue>,
    /// Edit step.
    pub step: Option<f32>,
    /// Enumerated values; the field stores the index.
    pub options: Vec<AttributeValue>,
}

impl AttributeDescription {
    /// Creates a descriptor with no bounds or options.
    #[must_use]
    pub fn new(ty: AttributeType, offset: usize, name: impl Into<String>) -> Self {
        Self {
            ty,
            offset,
            name: name.into(),
            min: None,
            max: None,
            step: None,
            options: Vec::new(),
        }
    }

    /// Sets the editing bounds.
    #[must_use]
    pub fn with_bounds(
        mut self,
        min: impl Into<AttributeValue>,
        max: impl Into<AttributeValue>,
    ) -> Self {
        self.min = Some(min.into());
        self.max = Some(max.into());
        self
    }

    /// Sets the editing step.
    #[must_use]
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the enumerated options.
    #[must_use]
    pub fn with_options<I, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Reads the field as `T` from a component's bytes.
    ///
    /// Returns `None` if the field does not fit inside `component`.
    #[must_use]
    pub fn read<T: Pod>(&self, component: &[u8]) -> Option<T> {
        let end = self.offset.checked_add(std::mem::size_of::<T>())?;
        component.get(self.offset..end).map(bytemuck::pod_read_unaligned)
    }

    /// Writes `value` into the field of a component's bytes.
    ///
    /// Returns `false` if the field does not fit inside `component`.
    pub fn write<T: Pod>(&self, component: &mut [u8], value: T) -> bool {
        let bytes = bytemuck::bytes_of(&value);
        match component.get_mut(self.offset..self.offset + bytes.len()) {
            Some(field) => {
                field.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

/// Describes a component type.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentDescription {
    /// Display name.
    pub name: String,
    /// Fields ordered by offset.
    pub attributes: Vec<AttributeDescription>,
    /// Pool capacity declared by the type; `None` defers to configuration.
    pub max_instances: Option<u32>,
}

impl ComponentDescription {
    /// Creates a description with no fields and no declared capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            max_instances: None,
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDescription) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sets the pool capacity.
    #[must_use]
    pub fn with_max_instances(mut self, max_instances: u32) -> Self {
        self.max_instances = Some(max_instances);
        self
    }

    /// Looks a field up by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Byte length of field `index`: the next field's offset (or the
    /// component size) minus its own offset.
    #[must_use]
    pub fn attribute_len(&self, index: usize, component_size: usize) -> Option<usize> {
        let attribute = self.attributes.get(index)?;
        let end = self.attributes.get(index + 1).map_or(component_size, |next| next.offset);
        end.checked_sub(attribute.offset)
    }

    /// Bytes of field `index` inside `component`.
    #[must_use]
    pub fn field_bytes<'c>(&self, index: usize, component: &'c [u8]) -> Option<&'c [u8]> {
        let len = self.attribute_len(index, component.len())?;
        let offset = self.attributes[index].offset;
        component.get(offset..offset + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ComponentDescription {
        ComponentDescription::new("Sample")
            .with_attribute(
                AttributeDescription::new(AttributeType::UInt32, 0, "kind")
                    .with_options(["A", "B"]),
            )
            .with_attribute(
                AttributeDescription::new(AttributeType::Float32, 4, "gain")
                    .with_bounds(0.0f32, 10.0f32)
                    .with_step(0.5),
            )
    }

    #[test]
    fn test_attribute_lengths() {
        let desc = sample();
        assert_eq!(desc.attribute_len(0, 12), Some(4));
        assert_eq!(desc.attribute_len(1, 12), Some(8));
        assert_eq!(desc.attribute_len(2, 12), None);
        assert_eq!(desc.max_instances, None);
        assert_eq!(desc.clone().with_max_instances(1024).max_instances, Some(1024));
    }

    #[test]
    fn test_field_access() {
        let desc = sample();
        let mut bytes = [0u8; 8];
        let gain = desc.attribute("gain").unwrap();
        assert!(gain.write(&mut bytes, 2.5f32));
        assert_eq!(gain.read::<f32>(&bytes), Some(2.5));
        assert_eq!(desc.field_bytes(1, &bytes).unwrap(), &2.5f32.to_ne_bytes());

        // Field past the end of the buffer.
        assert_eq!(gain.read::<f64>(&bytes), None);
        assert!(!gain.write(&mut bytes, 1.0f64));
    }

    #[test]
    fn test_options_and_bounds() {
        let desc = sample();
        let options = vec![AttributeValue::from("A"), AttributeValue::from("B")];
        assert_eq!(desc.attributes[0].options, options);
        assert_eq!(desc.attributes[1].min, Some(AttributeValue::Float(0.0)));
        assert_eq!(desc.attributes[1].step, Some(0.5));
        assert_eq!(AttributeType::Quat.element_size(), Some(4));
        assert_eq!(AttributeType::Custom.element_size(), None);
    }
}
