// ── Post-update hooks ──
//
// Derived values computed after a device-service update has been
// applied. A hook sees each written attribute and returns extra writes.

use serde_json::Value;

use crate::tree::StorageValue;

pub trait UpdateHook: Send + Sync {
    /// Extra `(relative address, value)` writes implied by `value`
    /// having been written to `address`.
    fn derive(&self, address: &str, value: &Value) -> Vec<(String, StorageValue)>;
}

/// Keeps `remainingTimeUntilArmed` consistent with the alarm system
/// state: `-1` once disarmed, `0` once armed.
///
/// The hub only reports the countdown while arming, so without this the
/// node would keep the last countdown value forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmingCountdownHook;

const CONTROL_VALUE_SUFFIX: &str = "IntrusionDetectionControl.value";
const COUNTDOWN_KEY: &str = "remainingTimeUntilArmed";

impl UpdateHook for ArmingCountdownHook {
    fn derive(&self, address: &str, value: &Value) -> Vec<(String, StorageValue)> {
        if !address.ends_with(CONTROL_VALUE_SUFFIX) {
            return Vec::new();
        }
        let countdown: i64 = match value.as_str() {
            Some("SYSTEM_DISARMED") => -1,
            Some("SYSTEM_ARMED") => 0,
            _ => return Vec::new(),
        };
        let channel = address.strip_suffix(".value").unwrap_or(address);
        vec![(format!("{channel}.{COUNTDOWN_KEY}"), countdown.into())]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const ADDR: &str = "intrusionDetectionSystem.IntrusionDetectionControl.value";

    #[test]
    fn disarmed_resets_countdown() {
        assert_eq!(
            ArmingCountdownHook.derive(ADDR, &json!("SYSTEM_DISARMED")),
            vec![(
                "intrusionDetectionSystem.IntrusionDetectionControl.remainingTimeUntilArmed"
                    .to_owned(),
                StorageValue::from(-1_i64)
            )]
        );
    }

    #[test]
    fn armed_zeroes_countdown() {
        let writes = ArmingCountdownHook.derive(ADDR, &json!("SYSTEM_ARMED"));
        assert_eq!(writes[0].1, StorageValue::from(0_i64));
    }

    #[test]
    fn other_states_and_addresses_are_ignored() {
        assert!(ArmingCountdownHook.derive(ADDR, &json!("SYSTEM_ARMING")).is_empty());
        assert!(
            ArmingCountdownHook
                .derive("dev.SurveillanceAlarm.value", &json!("SYSTEM_ARMED"))
                .is_empty()
        );
    }
}
