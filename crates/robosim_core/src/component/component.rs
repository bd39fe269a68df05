//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be `Pod` and have a fixed size so a pool can store them as
//! raw bytes and hand them back as typed views.

use std::io::{self, Read, Write};
use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};

use super::attribute::{AttributeDescription, AttributeType, ComponentDescription};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Pod`: Plain old data, stored as bytes in a pool
/// - `Default`: Written into a slot when the component is added
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Battery {
///     charge: f32,
/// }
///
/// impl Component for Battery {
///     const NAME: &'static str = "Battery";
/// }
/// ```
pub trait Component: Pod + Default + Send + Sync + 'static {
    /// Type name. Also the source of the stable component id.
    const NAME: &'static str;

    /// Field layout and pool capacity.
    ///
    /// The default treats the whole component as one custom field.
    fn description() -> ComponentDescription {
        ComponentDescription::new(Self::NAME)
            .with_attribute(AttributeDescription::new(AttributeType::Custom, 0, "custom"))
    }

    /// Writes the component. Defaults to its raw bytes.
    ///
    /// # Errors
    ///
    /// Any error from `writer`.
    fn serialize(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(bytemuck::bytes_of(self))
    }

    /// Reads the component. Defaults to its raw bytes.
    ///
    /// # Errors
    ///
    /// Any error from `reader`, or `InvalidData` from custom readers.
    fn deserialize(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        reader.read_exact(bytemuck::bytes_of_mut(self))
    }

    /// Bytes written by [`Component::serialize`].
    fn serialized_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Position, orientation and scale of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    /// Position in world units.
    pub position: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl Transform {
    /// Creates a transform at `position` with identity orientation and unit scale.
    #[inline]
    #[must_use]
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

impl Component for Transform {
    const NAME: &'static str = "Transform";

    fn description() -> ComponentDescription {
        ComponentDescription::new(Self::NAME)
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::VectorFloat32,
                    offset_of!(Self, position),
                    "position",
                )
                .with_bounds(-1000.0f32, 1000.0f32)
                .with_step(0.05),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::Quat,
                    offset_of!(Self, orientation),
                    "orientation",
                )
                .with_bounds(-360.0f32, 360.0f32)
                .with_step(0.5),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::VectorFloat32,
                    offset_of!(Self, scale),
                    "scale",
                )
                .with_bounds(0.0f32, 1000.0f32)
                .with_step(0.05),
            )
    }
}

/// Physical body simulated by the physics backend.
///
/// Flags are stored as `u32` so the layout has no padding.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RigidBody {
    /// One of [`RigidBody::DYNAMIC`], [`RigidBody::KINEMATIC`], [`RigidBody::STATIC`].
    pub kind: u32,
    /// Linear velocity in m/s.
    pub linear_velocity: [f32; 3],
    /// Angular velocity in rad/s.
    pub angular_velocity: [f32; 3],
    /// Mass in kg.
    pub mass: f32,
    /// Friction coefficient.
    pub friction: f32,
    /// 0 is perfectly inelastic, 1 perfectly elastic.
    pub restitution: f32,
    /// Resistance to translation.
    pub linear_damping: f32,
    /// Resistance to rotation.
    pub angular_damping: f32,
    /// Non-zero if the body may sleep.
    pub allow_sleep: u32,
    /// Non-zero if the body starts awake.
    pub awake: u32,
}

impl RigidBody {
    /// Collides and is moved by collisions.
    pub const DYNAMIC: u32 = 0;
    /// Moves with constant velocity, unaffected by collisions.
    pub const KINEMATIC: u32 = 1;
    /// Infinite mass.
    pub const STATIC: u32 = 2;
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            kind: Self::DYNAMIC,
            linear_velocity: [0.0; 3],
            angular_velocity: [0.0; 3],
            mass: 1.0,
            friction: 0.5,
            restitution: 0.5,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: 1,
            awake: 1,
        }
    }
}

impl Component for RigidBody {
    const NAME: &'static str = "RigidBody";

    fn description() -> ComponentDescription {
        ComponentDescription::new(Self::NAME)
            .with_attribute(
                AttributeDescription::new(AttributeType::UInt32, offset_of!(Self, kind), "type")
                    .with_options(["DYNAMIC", "KINEMATIC", "STATIC"]),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::VectorFloat32,
                    offset_of!(Self, linear_velocity),
                    "linearVelocity",
                )
                .with_step(0.05),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::VectorFloat32,
                    offset_of!(Self, angular_velocity),
                    "angularVelocity",
                )
                .with_step(0.05),
            )
            .with_attribute(
                AttributeDescription::new(AttributeType::Float32, offset_of!(Self, mass), "mass")
                    .with_bounds(0.0f32, 1000.0f32)
                    .with_step(0.05),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::Float32,
                    offset_of!(Self, friction),
                    "friction",
                )
                .with_bounds(0.0f32, 1.0f32)
                .with_step(0.01),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::Float32,
                    offset_of!(Self, restitution),
                    "restitution",
                )
                .with_bounds(0.0f32, 1.0f32)
                .with_step(0.01),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::Float32,
                    offset_of!(Self, linear_damping),
                    "linearDamping",
                )
                .with_bounds(0.0f32, 1.0f32)
                .with_step(0.01),
            )
            .with_attribute(
                AttributeDescription::new(
                    AttributeType::Float32,
                    offset_of!(Self, angular_damping),
                    "angularDamping",
                )
                .with_bounds(0.0f32, 1.0f32)
                .with_step(0.01),
            )
            .with_attribute(AttributeDescription::new(
                AttributeType::UInt32,
                offset_of!(Self, allow_sleep),
                "allowSleep",
            ))
            .with_attribute(AttributeDescription::new(
                AttributeType::UInt32,
                offset_of!(Self, awake),
                "awake",
            ))
    }
}

const NAME_CAPACITY: usize = 32;

/// Human readable entity name, UTF-8 in a fixed buffer.
///
/// Serialized as a little-endian `u32` length followed by the text bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Name {
    bytes: [u8; NAME_CAPACITY],
}

impl Name {
    /// Buffer size in bytes.
    pub const CAPACITY: usize = NAME_CAPACITY;

    /// Creates a name, truncating on a char boundary if `text` is too long.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut name = Self::default();
        name.set(text);
        name
    }

    /// Replaces the text, truncating on a char boundary.
    pub fn set(&mut self, text: &str) {
        let mut len = text.len().min(Self::CAPACITY);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        self.bytes = [0; Self::CAPACITY];
        self.bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
    }

    /// Length of the text in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|b| *b == 0).unwrap_or(Self::CAPACITY)
    }

    /// Returns `true` for an empty name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// The text. Invalid UTF-8 (only possible through raw writes) reads as empty.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len()]).unwrap_or_default()
    }
}

impl Component for Name {
    const NAME: &'static str = "Name";

    fn description() -> ComponentDescription {
        ComponentDescription::new(Self::NAME)
            .with_attribute(AttributeDescription::new(AttributeType::Char, 0, "name"))
    }

    fn serialize(&self, writer: &mut dyn Write) -> io::Result<()> {
        let text = self.as_str().as_bytes();
        writer.write_all(&(text.len() as u32).to_le_bytes())?;
        writer.write_all(text)
    }

    fn deserialize(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        let mut len = [0u8; 4];
        reader.read_exact(&mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > Self::CAPACITY {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("name of {len} bytes exceeds {}", Self::CAPACITY),
            ));
        }

        let mut buf = [0u8; Self::CAPACITY];
        reader.read_exact(&mut buf[..len])?;
        let text = std::str::from_utf8(&buf[..len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.set(text);
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        4 + self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_sizes() {
        assert_eq!(std::mem::size_of::<Transform>(), 40);
        assert_eq!(std::mem::size_of::<RigidBody>(), 56);
        assert_eq!(std::mem::size_of::<Name>(), Name::CAPACITY);
    }

    #[test]
    fn test_descriptions_follow_layout() {
        let desc = RigidBody::description();
        assert_eq!(desc.name, "RigidBody");
        assert_eq!(desc.attributes[0].options.len(), 3);
        assert_eq!(desc.attribute("mass").unwrap().offset, 28);

        let body = RigidBody::default();
        let bytes = bytemuck::bytes_of(&body);
        assert_eq!(desc.attribute("mass").unwrap().read::<f32>(bytes), Some(1.0));
        assert_eq!(desc.attribute_len(0, bytes.len()), Some(4));

        let transform = Transform::description();
        assert_eq!(transform.attribute("scale").unwrap().offset, 28);
    }

    #[test]
    fn test_default_description_is_custom() {
        #[derive(Clone, Copy, Default, Pod, Zeroable)]
        #[repr(C)]
        struct Battery {
            charge: f32,
        }

        impl Component for Battery {
            const NAME: &'static str = "Battery";
        }

        let desc = Battery::description();
        assert_eq!(desc.attributes.len(), 1);
        assert_eq!(desc.attributes[0].ty, AttributeType::Custom);
        assert_eq!(desc.max_instances, None);
    }

    #[test]
    fn test_raw_serialization() {
        let t = Transform::at([1.0, 2.0, 3.0]);
        let mut out = Vec::new();
        t.serialize(&mut out).unwrap();
        assert_eq!(out.len(), t.serialized_size());

        let mut back = Transform::default();
        back.deserialize(&mut out.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_name_serialization() {
        let name = Name::new("rover");
        let mut out = Vec::new();
        name.serialize(&mut out).unwrap();
        assert_eq!(out, [5, 0, 0, 0, b'r', b'o', b'v', b'e', b'r']);

        let mut back = Name::default();
        back.deserialize(&mut out.as_slice()).unwrap();
        assert_eq!(back.as_str(), "rover");

        let too_long = 40u32.to_le_bytes();
        assert!(back.deserialize(&mut too_long.as_slice()).is_err());
    }

    #[test]
    fn test_name_truncates_on_char_boundary() {
        let text = "é".repeat(20);
        let name = Name::new(&text);
        assert_eq!(name.len(), 32);
        assert_eq!(name.as_str().chars().count(), 16);
        assert!(Name::default().is_empty());
    }
}
