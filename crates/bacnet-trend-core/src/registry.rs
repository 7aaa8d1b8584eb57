//! Object registry.
//!
//! The registry holds the device object and the small, fixed set of input
//! objects this device exposes. It is created once at startup and then only
//! mutated by the sampling step or by explicit operator/protocol writes.

use crate::config::DeviceConfig;
use crate::model::{ObjectId, ObjectType, PresentValue};
use thiserror::Error;

/// Errors returned when mutating the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// No object with this type and instance exists.
    #[error("Object not found: {0}")]
    NotFound(ObjectId),

    /// The value kind does not match the object kind.
    #[error("Value {value:?} does not fit object {object}")]
    TypeMismatch { object: ObjectId, value: PresentValue },

    /// Multi-state value outside `1..=number_of_states`.
    #[error("State {state} out of range for {object} (1..={states})")]
    StateOutOfRange {
        object: ObjectId,
        state: u32,
        states: usize,
    },
}

/// The device object.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub instance: u32,
    pub model_name: String,
    pub description: String,
    pub vendor_identifier: u32,
    pub vendor_name: String,
}

/// Per-kind state of an input object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    AnalogInput { present_value: f32 },
    BinaryInput { present_value: bool },
    MultiStateInput {
        present_value: u32,
        state_text: Vec<String>,
    },
}

/// An input object exposed by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    pub name: String,
    pub instance: u32,
    pub kind: ObjectKind,
}

impl ObjectDescriptor {
    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            ObjectKind::AnalogInput { .. } => ObjectType::AnalogInput,
            ObjectKind::BinaryInput { .. } => ObjectType::BinaryInput,
            ObjectKind::MultiStateInput { .. } => ObjectType::MultiStateInput,
        }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.object_type(), self.instance)
    }

    pub fn present_value(&self) -> PresentValue {
        match &self.kind {
            ObjectKind::AnalogInput { present_value } => PresentValue::Real(*present_value),
            ObjectKind::BinaryInput { present_value } => PresentValue::Boolean(*present_value),
            ObjectKind::MultiStateInput { present_value, .. } => {
                PresentValue::Unsigned(*present_value)
            }
        }
    }

    /// State names of a multi-state object, empty for other kinds.
    pub fn state_text(&self) -> &[String] {
        match &self.kind {
            ObjectKind::MultiStateInput { state_text, .. } => state_text,
            _ => &[],
        }
    }
}

/// Instance numbers of the fixed object set.
pub mod instances {
    pub const AI_AUTO_INCREMENT: u32 = 1;
    pub const AI_MANUAL_INCREMENT: u32 = 2;
    pub const BINARY_INPUT: u32 = 3;
    pub const MULTI_STATE_INPUT: u32 = 4;
}

/// The object registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRegistry {
    device: Device,
    objects: Vec<ObjectDescriptor>,
}

impl ObjectRegistry {
    /// Create a registry from explicit parts.
    pub fn new(device: Device, objects: Vec<ObjectDescriptor>) -> Self {
        Self { device, objects }
    }

    /// Build the fixed object set for the configured device.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let device = Device {
            name: config.device_name.clone(),
            instance: config.device_instance,
            model_name: config.model_name.clone(),
            description: config.description.clone(),
            vendor_identifier: config.vendor_identifier,
            vendor_name: config.vendor_name.clone(),
        };

        let objects = vec![
            ObjectDescriptor {
                name: "AI - Auto Increment".to_string(),
                instance: instances::AI_AUTO_INCREMENT,
                kind: ObjectKind::AnalogInput { present_value: 0.0 },
            },
            ObjectDescriptor {
                name: "AI - Manual Increment".to_string(),
                instance: instances::AI_MANUAL_INCREMENT,
                kind: ObjectKind::AnalogInput { present_value: 0.0 },
            },
            ObjectDescriptor {
                name: "BI - Binary Input".to_string(),
                instance: instances::BINARY_INPUT,
                kind: ObjectKind::BinaryInput {
                    present_value: false,
                },
            },
            ObjectDescriptor {
                name: "MSI - Multi-State Input".to_string(),
                instance: instances::MULTI_STATE_INPUT,
                kind: ObjectKind::MultiStateInput {
                    present_value: 1,
                    state_text: vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()],
                },
            },
        ];

        Self::new(device, objects)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Replace the device description, the only mutable device field.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.device.description = description.into();
    }

    /// All input objects in registration order.
    pub fn objects(&self) -> &[ObjectDescriptor] {
        &self.objects
    }

    /// Exact (type, instance) lookup.
    pub fn get(&self, object_type: ObjectType, instance: u32) -> Option<&ObjectDescriptor> {
        self.objects
            .iter()
            .find(|o| o.instance == instance && o.object_type() == object_type)
    }

    fn get_mut(&mut self, object_type: ObjectType, instance: u32) -> Option<&mut ObjectDescriptor> {
        self.objects
            .iter_mut()
            .find(|o| o.instance == instance && o.object_type() == object_type)
    }

    /// Overwrite the present value of an input object.
    ///
    /// Returns whether the stored value actually changed.
    pub fn set(
        &mut self,
        object_type: ObjectType,
        instance: u32,
        value: PresentValue,
    ) -> Result<bool, RegistryError> {
        let object = ObjectId::new(object_type, instance);
        let descriptor = self
            .get_mut(object_type, instance)
            .ok_or(RegistryError::NotFound(object))?;

        match (&mut descriptor.kind, value) {
            (ObjectKind::AnalogInput { present_value }, PresentValue::Real(v)) => {
                let changed = *present_value != v;
                *present_value = v;
                Ok(changed)
            }
            (ObjectKind::BinaryInput { present_value }, PresentValue::Boolean(v)) => {
                let changed = *present_value != v;
                *present_value = v;
                Ok(changed)
            }
            (
                ObjectKind::MultiStateInput {
                    present_value,
                    state_text,
                },
                PresentValue::Unsigned(v),
            ) => {
                if v == 0 || v as usize > state_text.len() {
                    return Err(RegistryError::StateOutOfRange {
                        object,
                        state: v,
                        states: state_text.len(),
                    });
                }
                let changed = *present_value != v;
                *present_value = v;
                Ok(changed)
            }
            _ => Err(RegistryError::TypeMismatch { object, value }),
        }
    }

    /// Add `delta` to an analog input and return the new value.
    pub fn adjust_real(
        &mut self,
        object_type: ObjectType,
        instance: u32,
        delta: f32,
    ) -> Result<f32, RegistryError> {
        let object = ObjectId::new(object_type, instance);
        match self.get(object_type, instance).map(|o| o.present_value()) {
            Some(PresentValue::Real(current)) => {
                let next = current + delta;
                self.set(object_type, instance, PresentValue::Real(next))?;
                Ok(next)
            }
            Some(value) => Err(RegistryError::TypeMismatch { object, value }),
            None => Err(RegistryError::NotFound(object)),
        }
    }
}
