/*!
    Typed properties shared by sources and plugins.

    Everything configurable exposes a static table of
    [`PropertyDescriptor`]s and reads or writes [`Value`]s by property name.
    Descriptors carry the type, access mode, whether the property may only
    change while idle, and an optional numeric range; [`PropertyDescriptor::check`]
    applies all of them so implementations only assign fields.
*/

use std::collections::BTreeMap;
use std::fmt;

use media_types::{Error, FrameBuffer, Result};

/**
    The type tag of a [`Value`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    U8,
    U16,
    U32,
    I16,
    I32,
    F32,
    F64,
    String,
    Color,
    Point,
    Size,
    Range,
    Array,
    Array2D,
    Jagged,
    Image,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::U8 | Self::U16 | Self::U32 | Self::I16 | Self::I32 | Self::F32 | Self::F64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Color => "color",
            Self::Point => "point",
            Self::Size => "size",
            Self::Range => "range",
            Self::Array => "array",
            Self::Array2D => "array2d",
            Self::Jagged => "jagged array",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
    A color with alpha, 8 bits per channel.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Argb {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb {
    pub const fn new(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(255, r, g, b)
    }

    pub const fn from_u32(value: u32) -> Self {
        let [a, r, g, b] = value.to_be_bytes();
        Self { a, r, g, b }
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }

    /**
        Parse `#RRGGBB` (opaque) or `#AARRGGBB`.
    */
    pub fn parse(text: &str) -> Result<Self> {
        let hex = text.trim().trim_start_matches('#');
        let invalid = || Error::IncompatibleTypes(format!("'{text}' is not a color"));
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        match hex.len() {
            6 => Ok(Self::from_u32(0xFF00_0000 | value)),
            8 => Ok(Self::from_u32(value)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Argb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.to_u32())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/**
    A dynamically typed property value.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
    String(String),
    Color(Argb),
    Point(Point),
    Size(Size),
    Range(Range),
    /// One-dimensional array.
    Array(Vec<Value>),
    /// Rectangular array stored row by row.
    Array2D {
        rows: usize,
        cols: usize,
        items: Vec<Value>,
    },
    /// Array of arrays with independent lengths.
    Jagged(Vec<Vec<Value>>),
    /// Opaque image handle.
    Image(FrameBuffer),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::U8(_) => ValueType::U8,
            Self::U16(_) => ValueType::U16,
            Self::U32(_) => ValueType::U32,
            Self::I16(_) => ValueType::I16,
            Self::I32(_) => ValueType::I32,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
            Self::String(_) => ValueType::String,
            Self::Color(_) => ValueType::Color,
            Self::Point(_) => ValueType::Point,
            Self::Size(_) => ValueType::Size,
            Self::Range(_) => ValueType::Range,
            Self::Array(_) => ValueType::Array,
            Self::Array2D { .. } => ValueType::Array2D,
            Self::Jagged(_) => ValueType::Jagged,
            Self::Image(_) => ValueType::Image,
        }
    }

    /**
        The numeric value, for any of the numeric variants.
    */
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::U8(v) => Some(v as f64),
            Self::U16(v) => Some(v as f64),
            Self::U32(v) => Some(v as f64),
            Self::I16(v) => Some(v as f64),
            Self::I32(v) => Some(v as f64),
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    /**
        Convert to `target` where that loses nothing.

        Numbers convert between widths when integral and in range, and to
        floats always. Strings parse into colors. Anything else must already
        have the target type.
    */
    pub fn coerce(self, target: ValueType) -> Result<Value> {
        if self.value_type() == target {
            return Ok(self);
        }

        match self {
            Self::String(text) if target == ValueType::Color => Argb::parse(&text).map(Self::Color),
            value if target.is_numeric() => match value.as_f64() {
                Some(number) => number_as(number, target),
                None => Err(incompatible(value.value_type(), target)),
            },
            value => Err(incompatible(value.value_type(), target)),
        }
    }

    /**
        Element `index` of an array value.

        Rows of two-dimensional and jagged arrays are returned as arrays.
    */
    pub fn index(&self, index: usize) -> Result<Value> {
        let out_of_bounds = |len| Error::IndexOutOfBounds { index, len };
        match self {
            Self::Array(items) => items.get(index).cloned().ok_or(out_of_bounds(items.len())),
            Self::Jagged(rows) => rows
                .get(index)
                .map(|row| Self::Array(row.clone()))
                .ok_or(out_of_bounds(rows.len())),
            Self::Array2D { rows, cols, items } => {
                if index >= *rows {
                    return Err(out_of_bounds(*rows));
                }
                let start = index * cols;
                items
                    .get(start..start + cols)
                    .map(|row| Self::Array(row.to_vec()))
                    .ok_or(out_of_bounds(*rows))
            }
            other => Err(Error::IncompatibleTypes(format!(
                "{} value cannot be indexed",
                other.value_type()
            ))),
        }
    }
}

fn incompatible(from: ValueType, to: ValueType) -> Error {
    Error::IncompatibleTypes(format!("cannot convert {from} to {to}"))
}

fn number_as(number: f64, target: ValueType) -> Result<Value> {
    macro_rules! integer {
        ($ty:ty, $variant:ident) => {{
            if number.fract() != 0.0 || number < <$ty>::MIN as f64 || number > <$ty>::MAX as f64 {
                return Err(Error::IncompatibleTypes(format!(
                    "{number} does not fit {}",
                    ValueType::$variant
                )));
            }
            Ok(Value::$variant(number as $ty))
        }};
    }

    match target {
        ValueType::U8 => integer!(u8, U8),
        ValueType::U16 => integer!(u16, U16),
        ValueType::U32 => integer!(u32, U32),
        ValueType::I16 => integer!(i16, I16),
        ValueType::I32 => integer!(i32, I32),
        ValueType::F32 => Ok(Value::F32(number as f32)),
        ValueType::F64 => Ok(Value::F64(number)),
        other => Err(incompatible(ValueType::F64, other)),
    }
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = Error;

                fn try_from(value: Value) -> Result<Self> {
                    match value.coerce(ValueType::$variant)? {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(incompatible(other.value_type(), ValueType::$variant)),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i16 => I16,
    i32 => I32,
    f32 => F32,
    f64 => F64,
    String => String,
    Argb => Color,
    Point => Point,
    Size => Size,
    Range => Range,
    FrameBuffer => Image,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/**
    Whether a property can be written.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/**
    Static description of one property.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
    pub access: Access,
    /// Changes are rejected while the owner is running.
    pub idle_only: bool,
    /// Inclusive bounds for numeric values.
    pub range: Option<(f64, f64)>,
    pub description: &'static str,
}

impl PropertyDescriptor {
    pub const fn new(name: &'static str, value_type: ValueType, description: &'static str) -> Self {
        Self {
            name,
            value_type,
            access: Access::ReadWrite,
            idle_only: false,
            range: None,
            description,
        }
    }

    pub const fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    pub const fn idle_only(mut self) -> Self {
        self.idle_only = true;
        self
    }

    pub const fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /**
        Validate a value about to be written to this property.

        Returns the value converted to the property's type.
    */
    pub fn check(&self, value: Value) -> Result<Value> {
        if self.access == Access::ReadOnly {
            return Err(Error::ReadOnlyProperty(self.name.to_string()));
        }

        let value = value.coerce(self.value_type).map_err(|e| match e {
            Error::IncompatibleTypes(detail) => {
                Error::IncompatibleTypes(format!("property '{}': {detail}", self.name))
            }
            other => other,
        })?;

        if let (Some((min, max)), Some(number)) = (self.range, value.as_f64())
            && !(min..=max).contains(&number)
        {
            return Err(Error::InvalidArgument(format!(
                "{} must be within [{min}, {max}], got {number}",
                self.name
            )));
        }

        Ok(value)
    }
}

/**
    Ordered property assignments, as applied to a plugin or source.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration(BTreeMap<String, Value>);

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Value)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, value)| (name.into(), value)).collect())
    }
}

/**
    Something with named, typed properties.
*/
pub trait Configurable {
    /**
        The property table. Names are unique.
    */
    fn properties(&self) -> &'static [PropertyDescriptor];

    fn get_property(&self, name: &str) -> Result<Value>;

    /**
        Write a property. Implementations run the value through
        [`PropertyDescriptor::check`] before assigning it.
    */
    fn set_property(&mut self, name: &str, value: Value) -> Result<()>;

    /**
        Element `index` of an array-valued property.
    */
    fn get_indexed_property(&self, name: &str, index: usize) -> Result<Value> {
        self.get_property(name)?.index(index)
    }

    fn descriptor(&self, name: &str) -> Result<&'static PropertyDescriptor> {
        self.properties()
            .iter()
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| Error::InvalidProperty(name.to_string()))
    }

    /**
        Apply every assignment in order, stopping at the first failure.
    */
    fn configure(&mut self, configuration: &Configuration) -> Result<()> {
        for (name, value) in configuration.iter() {
            self.set_property(name, value.clone())?;
        }
        Ok(())
    }

    /**
        Snapshot of every property that can be written back.
    */
    fn configuration(&self) -> Configuration {
        self.properties()
            .iter()
            .filter(|descriptor| descriptor.access == Access::ReadWrite)
            .filter_map(|descriptor| {
                self.get_property(descriptor.name)
                    .ok()
                    .map(|value| (descriptor.name, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        level: u8,
        label: String,
        weights: Vec<f32>,
    }

    const SAMPLE_PROPERTIES: &[PropertyDescriptor] = &[
        PropertyDescriptor::new("level", ValueType::U8, "level").with_range(0.0, 100.0),
        PropertyDescriptor::new("label", ValueType::String, "label").idle_only(),
        PropertyDescriptor::new("weights", ValueType::Array, "weights").read_only(),
    ];

    impl Configurable for Sample {
        fn properties(&self) -> &'static [PropertyDescriptor] {
            SAMPLE_PROPERTIES
        }

        fn get_property(&self, name: &str) -> Result<Value> {
            match name {
                "level" => Ok(self.level.into()),
                "label" => Ok(self.label.clone().into()),
                "weights" => Ok(Value::Array(self.weights.iter().map(|w| Value::F32(*w)).collect())),
                _ => Err(Error::InvalidProperty(name.to_string())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
            let value = self.descriptor(name)?.check(value)?;
            match name {
                "level" => self.level = value.try_into()?,
                "label" => self.label = value.try_into()?,
                _ => return Err(Error::InvalidProperty(name.to_string())),
            }
            Ok(())
        }
    }

    fn sample() -> Sample {
        Sample {
            level: 1,
            label: "a".to_string(),
            weights: vec![0.5, 0.25],
        }
    }

    #[test]
    fn numeric_values_coerce_when_lossless() {
        assert_eq!(Value::I32(200).coerce(ValueType::U8), Ok(Value::U8(200)));
        assert_eq!(Value::U8(3).coerce(ValueType::F64), Ok(Value::F64(3.0)));
        assert!(matches!(
            Value::I32(300).coerce(ValueType::U8),
            Err(Error::IncompatibleTypes(_))
        ));
        assert!(matches!(
            Value::F64(1.5).coerce(ValueType::I32),
            Err(Error::IncompatibleTypes(_))
        ));
        assert!(matches!(
            Value::Bool(true).coerce(ValueType::U32),
            Err(Error::IncompatibleTypes(_))
        ));
    }

    #[test]
    fn colors_parse_from_hex() {
        assert_eq!(Argb::parse("#FF8000").unwrap(), Argb::opaque(255, 128, 0));
        assert_eq!(Argb::parse("80102030").unwrap(), Argb::new(0x80, 0x10, 0x20, 0x30));
        assert_eq!(Argb::new(1, 2, 3, 4).to_string(), "#01020304");
        assert_eq!(
            Value::from("#000000").coerce(ValueType::Color),
            Ok(Value::Color(Argb::opaque(0, 0, 0)))
        );
        assert!(Argb::parse("#12345").is_err());
    }

    #[test]
    fn set_checks_name_type_range_and_access() {
        let mut sample = sample();
        sample.set_property("level", Value::I32(42)).unwrap();
        assert_eq!(sample.level, 42);

        assert_eq!(
            sample.set_property("missing", Value::U8(1)),
            Err(Error::InvalidProperty("missing".to_string()))
        );
        assert!(matches!(
            sample.set_property("level", Value::from("high")),
            Err(Error::IncompatibleTypes(_))
        ));
        assert!(matches!(
            sample.set_property("level", Value::U8(101)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            sample.set_property("weights", Value::Array(Vec::new())),
            Err(Error::ReadOnlyProperty("weights".to_string()))
        );
        assert_eq!(sample.level, 42);
    }

    #[test]
    fn indexed_get_reads_array_elements() {
        let sample = sample();
        assert_eq!(sample.get_indexed_property("weights", 1), Ok(Value::F32(0.25)));
        assert_eq!(
            sample.get_indexed_property("weights", 2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        );
        assert!(matches!(
            sample.get_indexed_property("level", 0),
            Err(Error::IncompatibleTypes(_))
        ));
    }

    #[test]
    fn two_dimensional_arrays_index_by_row() {
        let grid = Value::Array2D {
            rows: 2,
            cols: 2,
            items: vec![Value::U8(1), Value::U8(2), Value::U8(3), Value::U8(4)],
        };
        assert_eq!(grid.index(1), Ok(Value::Array(vec![Value::U8(3), Value::U8(4)])));

        let jagged = Value::Jagged(vec![vec![Value::U8(1)], vec![]]);
        assert_eq!(jagged.index(1), Ok(Value::Array(Vec::new())));
    }

    #[test]
    fn configuration_round_trips_writable_properties() {
        let mut source = sample();
        source.level = 7;
        let configuration = source.configuration();
        assert_eq!(configuration.len(), 2);

        let mut target = sample();
        target.configure(&configuration).unwrap();
        assert_eq!(target.level, 7);
    }
}
