//! Property dispatcher.
//!
//! The protocol engine asks for property values through four typed entry
//! points, one per value kind. Routing goes object type → object instance →
//! property identifier. Anything not recognised yields
//! [`Dispatch::NotHandled`], which the engine turns into the protocol's
//! standard "unknown property" answer; it is not an error.

use bacnet_trend_core::{
    ObjectId, ObjectKind, ObjectType, PresentValue, PropertyIdentifier, TrendBuffer,
};
use tracing::debug;

use crate::context::DeviceContext;
use crate::APPLICATION_VERSION;

/// A typed property read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRequest {
    /// Device the request was addressed to.
    pub device_instance: u32,
    pub object_type: ObjectType,
    pub object_instance: u32,
    pub property: PropertyIdentifier,
    /// Explicit array index, when the request carried one.
    pub array_index: Option<u32>,
}

impl PropertyRequest {
    pub fn new(device_instance: u32, object: ObjectId, property: PropertyIdentifier) -> Self {
        Self {
            device_instance,
            object_type: object.object_type,
            object_instance: object.instance,
            property,
            array_index: None,
        }
    }

    pub fn with_array_index(mut self, index: u32) -> Self {
        self.array_index = Some(index);
        self
    }

    /// Build a request from the raw numbers a wire decoder produces.
    pub fn from_raw(
        device_instance: u32,
        object_type: u16,
        object_instance: u32,
        property: u32,
        use_array_index: bool,
        array_index: u32,
    ) -> Self {
        Self {
            device_instance,
            object_type: ObjectType::from_u16(object_type),
            object_instance,
            property: PropertyIdentifier::from_u32(property),
            array_index: use_array_index.then_some(array_index),
        }
    }

    pub fn object(&self) -> ObjectId {
        ObjectId::new(self.object_type, self.object_instance)
    }
}

/// Result of a typed property read.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    /// The property resolved to this value.
    Value(T),
    /// Object, property or value kind not recognised.
    NotHandled,
}

impl<T> Dispatch<T> {
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Value(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            Dispatch::Value(v) => Some(v),
            Dispatch::NotHandled => None,
        }
    }
}

impl<T> From<Option<T>> for Dispatch<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Dispatch::NotHandled, Dispatch::Value)
    }
}

/// Typed property getters a protocol engine calls back into.
pub trait PropertyProvider {
    /// Character string property, truncated to at most `max_len` bytes.
    /// The written length is the byte length of the returned string.
    fn get_character_string(&self, request: &PropertyRequest, max_len: usize) -> Dispatch<String>;

    /// Enumerated property (booleans map to 0/1).
    fn get_enumerated(&self, request: &PropertyRequest) -> Dispatch<u32>;

    fn get_real(&self, request: &PropertyRequest) -> Dispatch<f32>;

    fn get_unsigned_integer(&self, request: &PropertyRequest) -> Dispatch<u32>;
}

/// Cut `text` to `max_len` bytes without splitting a character.
fn truncate_to(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn not_handled<T>(kind: &str, request: &PropertyRequest) -> Dispatch<T> {
    debug!(
        kind,
        object = %request.object(),
        property = request.property.to_u32(),
        "Property not handled"
    );
    Dispatch::NotHandled
}

impl DeviceContext {
    /// Device properties are only served when the request targets the device itself.
    fn is_self_device(&self, request: &PropertyRequest) -> bool {
        let instance = self.device_instance();
        request.device_instance == instance && request.object_instance == instance
    }

    fn trend_buffer(&self, request: &PropertyRequest) -> Option<&TrendBuffer> {
        self.trend_logs().buffer(request.object()).ok()
    }

    fn resolve_string(&self, request: &PropertyRequest) -> Option<String> {
        let registry = self.registry();
        match request.object_type {
            ObjectType::Device => {
                if !self.is_self_device(request) {
                    return None;
                }
                let device = registry.device();
                match request.property {
                    PropertyIdentifier::ObjectName => Some(device.name.clone()),
                    PropertyIdentifier::ModelName => Some(device.model_name.clone()),
                    PropertyIdentifier::VendorName => Some(device.vendor_name.clone()),
                    PropertyIdentifier::Description => Some(device.description.clone()),
                    PropertyIdentifier::ApplicationSoftwareVersion => {
                        Some(APPLICATION_VERSION.to_string())
                    }
                    _ => None,
                }
            }
            ObjectType::AnalogInput | ObjectType::BinaryInput | ObjectType::MultiStateInput => {
                let object = registry.get(request.object_type, request.object_instance)?;
                match request.property {
                    PropertyIdentifier::ObjectName => Some(object.name.clone()),
                    PropertyIdentifier::StateText => {
                        let states = object.state_text();
                        let index = request.array_index? as usize;
                        if index == 0 || index > states.len() {
                            return None;
                        }
                        Some(states[index - 1].clone())
                    }
                    _ => None,
                }
            }
            ObjectType::TrendLog => {
                let log = self.trend_logs().log(request.object_instance)?;
                (request.property == PropertyIdentifier::ObjectName).then(|| log.name.clone())
            }
            ObjectType::TrendLogMultiple => {
                let log = self.trend_logs().multiple(request.object_instance)?;
                (request.property == PropertyIdentifier::ObjectName).then(|| log.name.clone())
            }
            _ => None,
        }
    }

    fn resolve_enumerated(&self, request: &PropertyRequest) -> Option<u32> {
        match (request.object_type, request.property) {
            (ObjectType::BinaryInput, PropertyIdentifier::PresentValue) => {
                match self
                    .registry()
                    .get(request.object_type, request.object_instance)?
                    .present_value()
                {
                    PresentValue::Boolean(v) => Some(u32::from(v)),
                    _ => None,
                }
            }
            (
                ObjectType::TrendLog | ObjectType::TrendLogMultiple,
                PropertyIdentifier::LogEnable,
            ) => {
                let polling = self.trend_logs().polling(request.object()).ok()?;
                Some(u32::from(polling.enabled))
            }
            _ => None,
        }
    }

    fn resolve_real(&self, request: &PropertyRequest) -> Option<f32> {
        if request.object_type != ObjectType::AnalogInput
            || request.property != PropertyIdentifier::PresentValue
        {
            return None;
        }
        match self
            .registry()
            .get(request.object_type, request.object_instance)?
            .present_value()
        {
            PresentValue::Real(v) => Some(v),
            _ => None,
        }
    }

    fn resolve_unsigned(&self, request: &PropertyRequest) -> Option<u32> {
        match request.object_type {
            ObjectType::Device => {
                (self.is_self_device(request)
                    && request.property == PropertyIdentifier::VendorIdentifier)
                    .then(|| self.registry().device().vendor_identifier)
            }
            ObjectType::MultiStateInput => {
                let object = self
                    .registry()
                    .get(request.object_type, request.object_instance)?;
                let ObjectKind::MultiStateInput {
                    present_value,
                    state_text,
                } = &object.kind
                else {
                    return None;
                };
                match (request.property, request.array_index) {
                    (PropertyIdentifier::PresentValue, _) => Some(*present_value),
                    (PropertyIdentifier::NumberOfStates, _) => Some(state_text.len() as u32),
                    // Index 0 of an array property is its length.
                    (PropertyIdentifier::StateText, Some(0)) => Some(state_text.len() as u32),
                    _ => None,
                }
            }
            ObjectType::TrendLog | ObjectType::TrendLogMultiple => {
                let buffer = self.trend_buffer(request)?;
                match request.property {
                    PropertyIdentifier::BufferSize => Some(buffer.capacity() as u32),
                    PropertyIdentifier::RecordCount => Some(buffer.len() as u32),
                    PropertyIdentifier::TotalRecordCount => {
                        Some(buffer.total_record_count() as u32)
                    }
                    PropertyIdentifier::LogInterval => {
                        // Log_Interval is expressed in hundredths of a second.
                        let polling = self.trend_logs().polling(request.object()).ok()?;
                        Some((polling.interval_ms / 10) as u32)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl PropertyProvider for DeviceContext {
    fn get_character_string(&self, request: &PropertyRequest, max_len: usize) -> Dispatch<String> {
        debug!(
            object = %request.object(),
            property = request.property.to_u32(),
            array_index = ?request.array_index,
            "Request for character string"
        );
        match self.resolve_string(request) {
            Some(text) => Dispatch::Value(truncate_to(text, max_len)),
            None => not_handled("character-string", request),
        }
    }

    fn get_enumerated(&self, request: &PropertyRequest) -> Dispatch<u32> {
        debug!(
            object = %request.object(),
            property = request.property.to_u32(),
            "Request for enumerated"
        );
        match self.resolve_enumerated(request) {
            Some(value) => Dispatch::Value(value),
            None => not_handled("enumerated", request),
        }
    }

    fn get_real(&self, request: &PropertyRequest) -> Dispatch<f32> {
        debug!(
            object = %request.object(),
            property = request.property.to_u32(),
            "Request for real"
        );
        match self.resolve_real(request) {
            Some(value) => Dispatch::Value(value),
            None => not_handled("real", request),
        }
    }

    fn get_unsigned_integer(&self, request: &PropertyRequest) -> Dispatch<u32> {
        debug!(
            object = %request.object(),
            property = request.property.to_u32(),
            array_index = ?request.array_index,
            "Request for unsigned integer"
        );
        match self.resolve_unsigned(request) {
            Some(value) => Dispatch::Value(value),
            None => not_handled("unsigned", request),
        }
    }
}
