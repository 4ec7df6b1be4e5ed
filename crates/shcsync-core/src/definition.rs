// ── Entity type resolver ──
//
// Static knowledge about hub state kinds: which role a (kind, attribute)
// pair plays, its unit, its enumerated values and whether the hub accepts
// writes to it. Pure lookups, no I/O.

use serde_json::Value;

use crate::model::FAULTS_KEY;
use crate::tree::ValueType;

/// Metadata attached to a state node when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMetadata {
    pub role: &'static str,
    pub unit: Option<&'static str>,
    pub states: Option<&'static [&'static str]>,
    pub writable: bool,
    pub value_type: ValueType,
}

impl TypeMetadata {
    /// Writable metadata with only a role, typed after `value`.
    pub fn for_value(role: &'static str, value: Option<&Value>) -> Self {
        Self {
            role,
            unit: None,
            states: None,
            writable: true,
            value_type: value.map_or(ValueType::Mixed, ValueType::of),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

/// Resolve metadata for `key` of a state of kind `kind`.
pub fn resolve(kind: Option<&str>, key: &str, value: Option<&Value>) -> TypeMetadata {
    let mut meta = TypeMetadata::for_value("state", value);

    if key == FAULTS_KEY {
        meta.role = "list";
        return meta;
    }

    meta.role = match kind.and_then(|kind| role(kind, key)) {
        Some(role) => role,
        None if matches!(value, Some(Value::Array(_))) => "list",
        None => "state",
    };
    if let Some(kind) = kind {
        meta.unit = unit(kind, key);
        meta.states = states(kind, key);
        meta.writable = !read_only(kind, key);
    }
    meta
}

/// Functional group a device service belongs to.
pub fn function_for(service_id: &str) -> Option<&'static str> {
    Some(match service_id {
        "TemperatureLevel"
        | "TemperatureOffset"
        | "Thermostat"
        | "ValveTappet"
        | "RoomClimateControl"
        | "TemperatureLevelConfiguration"
        | "VentilationDelay" => "heating",
        "IntrusionDetectionControl" | "SurveillanceAlarm" => "security",
        "CommunicationQuality" => "communicationQuality",
        "BatteryLevel" => "battery",
        "AirQualityLevel" | "airPurityGuardian" => "airQuality",
        "SmokeSensitivity" => "smokeSensitivity",
        _ => return None,
    })
}

/// Display name for a device, given the name of its room.
///
/// Virtual hub devices carry a model code instead of a useful name.
pub fn device_name(model: Option<&str>, name: Option<&str>, room: Option<&str>) -> Option<String> {
    match model {
        Some("ROOM_CLIMATE_CONTROL") => {
            Some(format!("RCC.{}", room.or(name).unwrap_or("unknown")))
        }
        Some("INTRUSION_DETECTION_SYSTEM") => Some("IDS".into()),
        Some("SMOKE_DETECTION_SYSTEM") => Some("SDS".into()),
        Some("VENTILATION_SERVICE") => Some("VS".into()),
        Some("PRESENCE_SIMULATION_SERVICE") => Some("PSS".into()),
        _ => name.map(str::to_owned),
    }
}

// ── Roles ────────────────────────────────────────────────────────────

#[allow(clippy::match_same_arms)]
fn role(kind: &str, key: &str) -> Option<&'static str> {
    Some(match (kind, key) {
        ("binarySwitchState", "on") => "switch",
        ("temperatureLevelState", "temperature") => "value.temperature",
        ("colorState", "rgb") => "level.color.rgb",

        ("climateControlState", "setpointTemperature")
        | ("climateControlState", "setpointTemperatureForLevelEco")
        | ("climateControlState", "setpointTemperatureForLevelComfort") => "level.temperature",
        ("climateControlState", "low") => "indicator",
        ("climateControlState", "boostMode") => "switch.boost",
        ("climateControlState", "operationMode") => "text",
        ("climateControlState", "showSetpointTemperature") => "switch",
        ("climateControlState", "summerMode") => "switch",
        ("climateControlState", "supportsBoostMode") => "indicator",
        ("climateControlState", "ventilationMode") => "indicator",

        ("colorTemperatureState", "colorTemperature") => "level.color.temperature",
        ("multiLevelSwitchState", "level") => "level.dimmer",
        ("temperatureOffsetState", "offset" | "stepSize" | "minOffset" | "maxOffset") => "level",
        ("childLockState", "childLock") => "text",
        ("valveTappetState", "position") => "level.valve",
        ("valveTappetState", "value") => "text",
        ("shutterContactState", "value") => "text",
        ("smokeSensitivityState", "smokeSensitivity") => "text",
        ("smokeSensitivityState", "preAlarmEnabled") => "indicator",
        ("twinguardNightlyPromiseState", "nightlyPromiseEnabled") => "indicator",
        ("communicationQualityState", "quality") => "text",

        (
            "airQualityLevelState",
            "combinedRating" | "description" | "temperatureRating" | "humidityRating"
            | "purityRating",
        ) => "text",
        ("airQualityLevelState", "temperature") => "value.temperature",
        ("airQualityLevelState", "humidity") => "value.humidity",
        ("airQualityLevelState", "purity") => "value",

        ("smokeDetectorCheckState", "value") => "text",
        ("surveillanceAlarmState", "value") => "text",
        ("surveillanceAlarmState", "incidents") => "list",

        ("intrusionDetectionControlState", "value") => "text",
        ("intrusionDetectionControlState", "triggers" | "actuators") => "list",
        (
            "intrusionDetectionControlState",
            "armActivationDelayTime" | "alarmActivationDelayTime",
        ) => "level",
        ("intrusionDetectionControlState", "remainingTimeUntilArmed") => "value",

        ("hueBridgeSearcherState", "searcherState" | "value") => "text",
        (
            "armDisarmPushNotificationState" | "remoteAccessState" | "remotePushNotificationState",
            "state",
        ) => "text",
        (
            "softwareUpdateState",
            "swUpdateState" | "swUpdateLastResult" | "swUpdateAvailableVersion"
            | "swInstalledVersion",
        ) => "text",
        ("ventilationDelayState", "devices") => "list",
        ("ventilationDelayState", "delay") => "level",
        ("powerMeterState", "powerConsumption" | "energyConsumption") => {
            "value.power.consumption"
        }
        ("powerSwitchState", "switchState") => "text",
        ("powerSwitchState", "automaticPowerOffTime") => "value",
        ("powerSwitchProgramState", "operationMode") => "text",
        ("powerSwitchProgramState", "schedule") => "state",
        ("routingState", "value") => "text",
        ("multiswitchConfigurationState", "pages" | "supportedPages") => "list",
        ("multiswitchConfigurationState", "locale" | "updateState") => "text",
        ("latestMotionState", "latestMotionDetected") => "date",
        ("walkTestState", "petImmunityState" | "walkState") => "text",
        ("presenceSimulationConfigurationState", "enabled") => "switch",
        ("presenceSimulationConfigurationState", "runningStartTime" | "runningEndTime") => "date",
        ("presenceSimulationSchedulingState", "schedule") => "list",
        ("doorSensor", "doorState") => "text",
        ("lockActuator", "lockState") => "text",
        ("airPurityGuardian", "enabled") => "switch",

        ("motionlight", "enabled") => "switch",
        ("motionlight", "brightness") => "level.dimmer",
        ("motionlight", "darknessThresholdLux" | "illuminanceLux") => "level.color.luminance",
        ("motionlight", "lightsOffDelay") => "level.timer",
        ("motionlight", "lightIds") => "list",

        ("waterAlarmSystemState", "available" | "deleted") => "indicator",
        ("waterAlarmSystemState", "visualActuatorsAvailable" | "videoActuatorsAvailable") => {
            "switch"
        }
        ("roomExtProperties", "humidity") => "value.humidity",
        ("systemAvailability", "available") => "switch",
        ("armingState", "remainingTimeUntilArmed") => "value",
        ("armingState", "state") => "text",
        ("alarmState", "value") => "text",
        ("alarmState", "incidents") => "list",
        ("activeConfigurationProfile", "profileId") => "text",
        ("securityGapState", "securityGaps") => "list",
        _ => return None,
    })
}

// ── Units ────────────────────────────────────────────────────────────

#[allow(clippy::match_same_arms)]
fn unit(kind: &str, key: &str) -> Option<&'static str> {
    Some(match (kind, key) {
        ("temperatureLevelState", "temperature") => "°C",
        (
            "climateControlState",
            "setpointTemperature" | "setpointTemperatureForLevelEco"
            | "setpointTemperatureForLevelComfort",
        ) => "°C",
        ("colorTemperatureState", "colorTemperature") => "K",
        ("multiLevelSwitchState", "level") => "%",
        ("temperatureOffsetState", "offset") => "°C",
        ("valveTappetState", "position") => "%",
        ("airQualityLevelState", "temperature") => "°C",
        ("airQualityLevelState", "humidity") => "%",
        ("airQualityLevelState", "purity") => "ppm",
        (
            "intrusionDetectionControlState",
            "armActivationDelayTime" | "alarmActivationDelayTime",
        ) => "s",
        ("ventilationDelayState", "delay") => "s",
        ("powerMeterState", "powerConsumption") => "W",
        ("powerMeterState", "energyConsumption") => "Wh",
        ("powerSwitchState", "automaticPowerOffTime") => "s",
        _ => return None,
    })
}

// ── Write deny-list ──────────────────────────────────────────────────

fn read_only(kind: &str, key: &str) -> bool {
    matches!(
        (kind, key),
        ("intrusionDetectionControlState", "remainingTimeUntilArmed")
            | ("doorSensor", "doorState")
            | ("lockActuator", "canUnlatch")
            | ("waterAlarmSystemState", "available" | "state" | "deleted")
            | ("roomExtProperties", "humidity")
    )
}

// ── Enumerated states ────────────────────────────────────────────────

const ENABLED_DISABLED: &[&str] = &["ENABLED", "DISABLED"];
const ON_OFF: &[&str] = &["ON", "OFF"];
const RATING: &[&str] = &["GOOD", "MEDIUM", "BAD", "UNKNOWN"];
const BRIDGE_SEARCH: &[&str] = &[
    "BRIDGE_SEARCH_REQUESTED",
    "BRIDGE_SEARCH_STARTED",
    "BRIDGES_FOUND",
    "NO_BRIDGE_FOUND",
    "ERROR",
    "UNKNOWN",
];
const WALK_TEST: &[&str] = &["WALK_TEST_STARTED", "WALK_TEST_STOPPED", "WALK_TEST_UNKNOWN"];
const AIR_DESCRIPTION: &[&str] = &[
    "OK",
    "COLD",
    "COLD_DRY",
    "COLD_HUMID",
    "COLD_STUFFY",
    "COLD_DRY_STUFFY",
    "COLD_HUMID_STUFFY",
    "LITTLE_COLD",
    "LITTLE_DRY",
    "LITTLE_HUMID",
    "LITTLE_STUFFY",
    "LITTLE_WARM",
    "DRY",
    "DRY_STUFFY",
    "HUMID",
    "HUMID_STUFFY",
    "STUFFY",
    "WARM",
    "WARM_DRY",
    "WARM_HUMID",
    "WARM_STUFFY",
    "WARM_HUMID_STUFFY",
    "WARM_DRY_STUFFY",
    "UNKNOWN",
];
const VALVE_TAPPET: &[&str] = &[
    "NOT_AVAILABLE",
    "RUN_TO_START_POSITION",
    "START_POSITION_REQUESTED",
    "IN_START_POSITION",
    "VALVE_ADAPTION_REQUESTED",
    "VALVE_ADAPTION_IN_PROGRESS",
    "VALVE_ADAPTION_SUCCESSFUL",
    "VALVE_TOO_TIGHT",
    "RANGE_TOO_BIG",
    "RANGE_TOO_SMALL",
    "ERROR",
    "UNKNOWN",
];
const SMOKE_CHECK: &[&str] = &[
    "NONE",
    "SMOKE_TEST_OK",
    "SMOKE_TEST_FAILED",
    "SMOKE_TEST_REQUESTED",
    "COMMUNICATION_TEST_SENT",
    "COMMUNICATION_TEST_OK",
    "COMMUNICATION_TEST_REQUESTED",
];

#[allow(clippy::match_same_arms)]
fn states(kind: &str, key: &str) -> Option<&'static [&'static str]> {
    let states: &'static [&'static str] = match (kind, key) {
        (
            "armDisarmPushNotificationState" | "remoteAccessState" | "remotePushNotificationState",
            "state",
        )
        | ("cameraNotificationState" | "privacyModeState" | "routingState", "value") => {
            ENABLED_DISABLED
        }
        ("softwareUpdateState", "swUpdateState") => &[
            "NO_UPDATE_AVAILABLE",
            "DOWNLOADING",
            "UPDATE_AVAILABLE",
            "UPDATE_IN_PROGRESS",
        ],
        ("softwareUpdateState", "swUpdateLastResult") => {
            &["UPDATE_SUCCESS", "UPDATE_FAIL", "DOWNLOAD_FAILED"]
        }
        ("childLockState", "childLock") | ("powerSwitchState", "switchState") => ON_OFF,
        ("valveTappetState", "value") => VALVE_TAPPET,
        ("shutterContactState", "value") => &["OPEN", "CLOSED"],
        ("powerSwitchProgramState", "operationMode") => &["MANUAL", "SCHEDULE"],
        ("hueBlinkingState", "blinkingState") => &["OFF", "ON", "UNKNOWN"],
        ("hueBridgeSearcherState", "searcherState" | "value") => BRIDGE_SEARCH,
        ("communicationQualityState", "quality") => {
            &["GOOD", "BAD", "NORMAL", "UNKNOWN", "FETCHING"]
        }
        ("communicationQualityState", "requestState") => &["REQUEST"],
        ("multiswitchConfigurationState", "updateState") => &["UPDATING", "UP_TO_DATE", "UNKNOWN"],
        (
            "airQualityLevelState",
            "combinedRating" | "temperatureRating" | "humidityRating" | "purityRating",
        ) => RATING,
        ("airQualityLevelState", "description") => AIR_DESCRIPTION,
        ("smokeDetectorCheckState", "value") => SMOKE_CHECK,
        ("smokeSensitivityState", "smokeSensitivity") => &["HIGH", "MIDDLE", "LOW", "UNKNOWN"],
        ("walkTestState", "walkState" | "petImmunityState") => WALK_TEST,
        ("intrusionDetectionControlState", "value") => {
            &["SYSTEM_ARMING", "SYSTEM_ARMED", "SYSTEM_DISARMED", "MUTE_ALARM"]
        }
        ("surveillanceAlarmState", "value") => {
            &["ALARM_ON", "ALARM_OFF", "ALARM_MUTED", "PRE_ALARM", "UNKNOWN"]
        }
        ("climateControlState", "operationMode") => &["MANUAL", "AUTOMATIC", "OFF", "UNKNOWN"],
        ("climateControlState", "roomControlMode") => &["OFF", "HEATING", "COOLING", "UNKNOWN"],
        ("doorSensor", "doorState") => &["DOOR_CLOSED", "DOOR_OPEN", "DOOR_UNKNOWN"],
        ("lockActuator", "lockState") => &["UNLOCKED", "LOCKED", "LOCKING", "UNLOCKING"],
        ("waterAlarmSystemState", "state") => &["WATER_ALARM", "ALARM_OFF", "ALARM_MUTED"],
        ("armingState", "state") => &["SYSTEM_ARMING", "SYSTEM_ARMED", "SYSTEM_DISARMED"],
        ("alarmState", "value") => &["ALARM_OFF", "PRE_ALARM", "ALARM_ON", "ALARM_MUTED", "UNKNOWN"],
        _ => return None,
    };
    Some(states)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn temperature_level_has_role_and_unit() {
        let meta = resolve(Some("temperatureLevelState"), "temperature", Some(&json!(20.0)));
        assert_eq!(meta.role, "value.temperature");
        assert_eq!(meta.unit, Some("°C"));
        assert_eq!(meta.value_type, ValueType::Number);
        assert!(meta.writable);
    }

    #[test]
    fn faults_are_always_lists() {
        let meta = resolve(Some("temperatureLevelState"), "faults", Some(&json!([])));
        assert_eq!(meta.role, "list");
        let meta = resolve(None, "faults", None);
        assert_eq!(meta.role, "list");
        assert_eq!(meta.value_type, ValueType::Mixed);
    }

    #[test]
    fn role_falls_back_by_shape() {
        assert_eq!(resolve(Some("unknownState"), "things", Some(&json!([1]))).role, "list");
        assert_eq!(resolve(Some("unknownState"), "thing", Some(&json!(1))).role, "state");
        assert_eq!(resolve(None, "thing", None).role, "state");
        // Table entries win over the array fallback.
        assert_eq!(
            resolve(Some("powerSwitchProgramState"), "schedule", Some(&json!([]))).role,
            "state"
        );
    }

    #[test]
    fn deny_list_marks_read_only() {
        assert!(!resolve(Some("doorSensor"), "doorState", None).writable);
        assert!(
            !resolve(
                Some("intrusionDetectionControlState"),
                "remainingTimeUntilArmed",
                Some(&json!(0))
            )
            .writable
        );
        assert!(resolve(Some("doorSensor"), "somethingElse", None).writable);
    }

    #[test]
    fn enumerated_states_are_attached() {
        let meta = resolve(Some("shutterContactState"), "value", Some(&json!("OPEN")));
        assert_eq!(meta.states, Some(&["OPEN", "CLOSED"][..]));
        let meta = resolve(Some("routingState"), "value", Some(&json!("ENABLED")));
        assert_eq!(meta.states, Some(ENABLED_DISABLED));
        assert_eq!(resolve(Some("routingState"), "other", None).states, None);
    }

    #[test]
    fn functions_by_service_id() {
        assert_eq!(function_for("ValveTappet"), Some("heating"));
        assert_eq!(function_for("SurveillanceAlarm"), Some("security"));
        assert_eq!(function_for("BatteryLevel"), Some("battery"));
        assert_eq!(function_for("airPurityGuardian"), Some("airQuality"));
        assert_eq!(function_for("PowerSwitch"), None);
    }

    #[test]
    fn virtual_devices_get_short_names() {
        assert_eq!(
            device_name(Some("ROOM_CLIMATE_CONTROL"), Some("-RoomClimateControl-"), Some("Bedroom")),
            Some("RCC.Bedroom".into())
        );
        assert_eq!(device_name(Some("INTRUSION_DETECTION_SYSTEM"), None, None), Some("IDS".into()));
        assert_eq!(device_name(Some("BWTH"), Some("Wall thermostat"), None), Some("Wall thermostat".into()));
        assert_eq!(device_name(Some("BWTH"), None, None), None);
    }
}
