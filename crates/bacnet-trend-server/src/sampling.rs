//! Wall-clock driven input sampling.

use bacnet_trend_core::registry::instances;
use bacnet_trend_core::{ObjectId, ObjectRegistry, ObjectType, PresentValue};
use chrono::Timelike;
use tracing::warn;

/// Multi-state value for the given hour of day.
fn multi_state_for_hour(hour: u32) -> u32 {
    if hour % 3 == 0 {
        3
    } else if hour % 2 == 0 {
        2
    } else {
        1
    }
}

/// Refresh the clock-driven inputs from `now`.
///
/// Returns the objects whose present value changed. The manually adjusted
/// analog input is left alone.
pub fn sample<T: Timelike>(registry: &mut ObjectRegistry, now: &T) -> Vec<ObjectId> {
    let updates = [
        (
            ObjectType::AnalogInput,
            instances::AI_AUTO_INCREMENT,
            PresentValue::Real(now.second() as f32),
        ),
        (
            ObjectType::BinaryInput,
            instances::BINARY_INPUT,
            PresentValue::Boolean(now.minute() % 2 == 0),
        ),
        (
            ObjectType::MultiStateInput,
            instances::MULTI_STATE_INPUT,
            PresentValue::Unsigned(multi_state_for_hour(now.hour())),
        ),
    ];

    let mut changed = Vec::new();
    for (object_type, instance, value) in updates {
        match registry.set(object_type, instance, value) {
            Ok(true) => changed.push(ObjectId::new(object_type, instance)),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Sampling skipped an object"),
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnet_trend_core::DeviceConfig;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    fn registry() -> ObjectRegistry {
        ObjectRegistry::from_config(&DeviceConfig::default())
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn value(registry: &ObjectRegistry, object_type: ObjectType, instance: u32) -> PresentValue {
        registry.get(object_type, instance).unwrap().present_value()
    }

    #[test]
    fn test_sample_at_known_time() {
        let mut registry = registry();
        sample(&mut registry, &at(14, 7, 42));

        assert_eq!(value(&registry, ObjectType::AnalogInput, 1), PresentValue::Real(42.0));
        assert_eq!(value(&registry, ObjectType::BinaryInput, 3), PresentValue::Boolean(false));
        assert_eq!(value(&registry, ObjectType::MultiStateInput, 4), PresentValue::Unsigned(2));
    }

    #[test]
    fn test_multi_state_by_hour() {
        let states: Vec<u32> = (0..24).map(multi_state_for_hour).collect();
        assert_eq!(
            states,
            [3, 1, 2, 3, 2, 1, 3, 1, 2, 3, 2, 1, 3, 1, 2, 3, 2, 1, 3, 1, 2, 3, 2, 1]
        );
    }

    #[test]
    fn test_manual_input_untouched() {
        let mut registry = registry();
        registry.set(ObjectType::AnalogInput, 2, PresentValue::Real(7.5)).unwrap();

        sample(&mut registry, &at(0, 0, 1));

        assert_eq!(value(&registry, ObjectType::AnalogInput, 2), PresentValue::Real(7.5));
    }

    #[test]
    fn test_reports_only_changes() {
        let mut registry = registry();

        // Defaults are AI 0.0, BI false, MSI 1.
        let changed = sample(&mut registry, &at(6, 2, 30));
        assert_eq!(
            changed,
            vec![
                ObjectId::new(ObjectType::AnalogInput, 1),
                ObjectId::new(ObjectType::BinaryInput, 3),
                ObjectId::new(ObjectType::MultiStateInput, 4),
            ]
        );

        assert!(sample(&mut registry, &at(6, 2, 30)).is_empty());
        assert_eq!(
            sample(&mut registry, &at(6, 2, 31)),
            vec![ObjectId::new(ObjectType::AnalogInput, 1)]
        );
    }
}
