//! BACnet identifiers and value types.
//!
//! Only the parts of the BACnet object model this device actually serves are
//! represented by name; everything else round-trips through the
//! `Proprietary`/`Other` variants so raw wire numbers are never lost.

use serde::{Deserialize, Serialize};
use std::fmt;

/// BACnet object type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
    TrendLog,
    TrendLogMultiple,
    Proprietary(u16),
}

impl ObjectType {
    /// Numeric BACnet identifier.
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::AnalogInput => 0,
            Self::AnalogOutput => 1,
            Self::AnalogValue => 2,
            Self::BinaryInput => 3,
            Self::BinaryOutput => 4,
            Self::BinaryValue => 5,
            Self::Device => 8,
            Self::MultiStateInput => 13,
            Self::MultiStateOutput => 14,
            Self::MultiStateValue => 19,
            Self::TrendLog => 20,
            Self::TrendLogMultiple => 27,
            Self::Proprietary(v) => v,
        }
    }

    /// Map a numeric identifier back to a named type where one exists.
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::AnalogInput,
            1 => Self::AnalogOutput,
            2 => Self::AnalogValue,
            3 => Self::BinaryInput,
            4 => Self::BinaryOutput,
            5 => Self::BinaryValue,
            8 => Self::Device,
            13 => Self::MultiStateInput,
            14 => Self::MultiStateOutput,
            19 => Self::MultiStateValue,
            20 => Self::TrendLog,
            27 => Self::TrendLogMultiple,
            v => Self::Proprietary(v),
        }
    }
}

impl From<u16> for ObjectType {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnalogInput => write!(f, "analog-input"),
            Self::AnalogOutput => write!(f, "analog-output"),
            Self::AnalogValue => write!(f, "analog-value"),
            Self::BinaryInput => write!(f, "binary-input"),
            Self::BinaryOutput => write!(f, "binary-output"),
            Self::BinaryValue => write!(f, "binary-value"),
            Self::Device => write!(f, "device"),
            Self::MultiStateInput => write!(f, "multi-state-input"),
            Self::MultiStateOutput => write!(f, "multi-state-output"),
            Self::MultiStateValue => write!(f, "multi-state-value"),
            Self::TrendLog => write!(f, "trend-log"),
            Self::TrendLogMultiple => write!(f, "trend-log-multiple"),
            Self::Proprietary(v) => write!(f, "proprietary-{}", v),
        }
    }
}

/// BACnet property identifiers routed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyIdentifier {
    ApplicationSoftwareVersion,
    BufferSize,
    Description,
    LogEnable,
    LogInterval,
    ModelName,
    NumberOfStates,
    ObjectName,
    PresentValue,
    RecordCount,
    StateText,
    TotalRecordCount,
    VendorIdentifier,
    VendorName,
    Other(u32),
}

impl PropertyIdentifier {
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::ApplicationSoftwareVersion => 12,
            Self::Description => 28,
            Self::ModelName => 70,
            Self::NumberOfStates => 74,
            Self::ObjectName => 77,
            Self::PresentValue => 85,
            Self::StateText => 110,
            Self::VendorIdentifier => 120,
            Self::VendorName => 121,
            Self::BufferSize => 126,
            Self::LogEnable => 133,
            Self::LogInterval => 134,
            Self::RecordCount => 141,
            Self::TotalRecordCount => 145,
            Self::Other(v) => v,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        match value {
            12 => Self::ApplicationSoftwareVersion,
            28 => Self::Description,
            70 => Self::ModelName,
            74 => Self::NumberOfStates,
            77 => Self::ObjectName,
            85 => Self::PresentValue,
            110 => Self::StateText,
            120 => Self::VendorIdentifier,
            121 => Self::VendorName,
            126 => Self::BufferSize,
            133 => Self::LogEnable,
            134 => Self::LogInterval,
            141 => Self::RecordCount,
            145 => Self::TotalRecordCount,
            v => Self::Other(v),
        }
    }
}

impl From<u32> for PropertyIdentifier {
    fn from(value: u32) -> Self {
        Self::from_u32(value)
    }
}

/// An object reference: type plus instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    pub const fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

/// A monitored (object, property) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRef {
    pub object: ObjectId,
    pub property: PropertyIdentifier,
}

impl PropertyRef {
    pub const fn new(object: ObjectId, property: PropertyIdentifier) -> Self {
        Self { object, property }
    }

    /// Shorthand for the present value of an object.
    pub const fn present_value(object_type: ObjectType, instance: u32) -> Self {
        Self::new(
            ObjectId::new(object_type, instance),
            PropertyIdentifier::PresentValue,
        )
    }
}

/// Present value of an input object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PresentValue {
    Real(f32),
    Boolean(bool),
    Unsigned(u32),
}

impl PresentValue {
    /// Log datum tag a trend log uses to record this value.
    pub const fn datum_type(&self) -> DatumType {
        match self {
            Self::Real(_) => DatumType::Real,
            Self::Boolean(_) => DatumType::Boolean,
            Self::Unsigned(_) => DatumType::Unsigned,
        }
    }
}

impl fmt::Display for PresentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug formatting keeps the fractional part ("42.0", not "42").
            Self::Real(v) => write!(f, "{:?}", v),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

/// BACnet log-datum choice tags.
///
/// Trend log records carry the raw tag byte so that unknown tags loaded from
/// a backup survive untouched; this enum names the tags the device itself
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatumType {
    LogStatus = 0,
    Boolean = 1,
    Real = 2,
    Enumerated = 3,
    Unsigned = 4,
    Signed = 5,
    BitString = 6,
    Null = 7,
    Failure = 8,
    TimeChange = 9,
    Any = 10,
}

impl DatumType {
    /// Tag used by trend-log-multiple composite records ("log-data" choice).
    pub const LOG_DATA: u8 = 1;

    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::LogStatus,
            1 => Self::Boolean,
            2 => Self::Real,
            3 => Self::Enumerated,
            4 => Self::Unsigned,
            5 => Self::Signed,
            6 => Self::BitString,
            7 => Self::Null,
            8 => Self::Failure,
            9 => Self::TimeChange,
            10 => Self::Any,
            _ => return None,
        })
    }
}
