use crate::logging::{Fields, Record};

use super::{
    health::{ErrorEvent, GpsHealth},
    state::{FlightState, NUM_BATTERIES, NUM_MOTORS, SensorHealth},
};

/// Snapshot of the aircraft published once per tick
#[derive(Debug, Clone, PartialEq)]
pub struct DroneSample {
    pub motor_rpms: [i32; NUM_MOTORS],
    pub motor_temps: [f64; NUM_MOTORS],

    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,

    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,

    pub battery_levels: [f64; NUM_BATTERIES],
    pub battery_temps: [f64; NUM_BATTERIES],

    pub armed: bool,
    pub gps: GpsHealth,
    pub sensors: SensorHealth,
    pub error: Option<ErrorEvent>,
}

impl DroneSample {
    pub fn new(state: &FlightState, gps: GpsHealth, error: Option<ErrorEvent>) -> Self {
        Self {
            motor_rpms: state.motor_rpms,
            motor_temps: state.motor_temps,
            latitude: state.latitude,
            longitude: state.longitude,
            altitude: state.altitude,
            roll: state.roll,
            pitch: state.pitch,
            yaw: state.yaw,
            battery_levels: state.battery_levels,
            battery_temps: state.battery_temps,
            armed: state.armed,
            gps,
            sensors: state.sensors,
            error,
        }
    }
}

impl Record for DroneSample {
    fn fields(&self) -> Vec<(String, String)> {
        let mut f = Fields::new();

        f.push_list("motor_rpms", &self.motor_rpms)
            .push_list("motor_temps", &self.motor_temps)
            .push("latitude", self.latitude)
            .push("longitude", self.longitude)
            .push("altitude", self.altitude)
            .push("roll", self.roll)
            .push("pitch", self.pitch)
            .push("yaw", self.yaw)
            .push_list("battery_levels", &self.battery_levels)
            .push_list("battery_temps", &self.battery_temps)
            .push("arm_status", self.armed)
            .push("gps_health_HDOP", self.gps.hdop)
            .push("gps_health_PDOP", self.gps.pdop)
            .push("gps_health_satellites", self.gps.satellites);

        for (sensor, status) in self.sensors.iter() {
            f.push(
                format!("sensor_health_{}", sensor.as_ref()),
                u8::from(status.is_healthy()),
            );
        }

        match &self.error {
            Some(e) => f
                .push("errors_code", e.code_str())
                .push("errors_desc", &e.description)
                .push("errors_source", e.source.as_ref()),
            None => f
                .push("errors_code", "")
                .push("errors_desc", "")
                .push("errors_source", ""),
        };

        f.into_vec()
    }

    fn summary(&self) -> String {
        let battery = self.battery_levels.iter().sum::<f64>() / NUM_BATTERIES as f64;

        format!(
            "pos ({:.5}, {:.5}) alt {:.1} m, yaw {:.1}, {}, battery {:.1} %, {} sats",
            self.latitude,
            self.longitude,
            self.altitude,
            self.yaw,
            if self.armed { "armed" } else { "disarmed" },
            battery,
            self.gps.satellites
        )
    }

    fn alert(&self) -> Option<String> {
        self.error.as_ref().map(|e| {
            format!(
                "{} {} ({})",
                e.code_str(),
                e.description,
                e.source.as_ref()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::sim::{
        drone::{
            health::ErrorSource,
            state::{DroneParams, Sensor, SensorStatus},
        },
        testing::always,
    };

    use super::*;

    fn sample(error: Option<ErrorEvent>) -> DroneSample {
        let mut state = FlightState::new(&DroneParams::default(), &mut always());
        state.sensors.set(Sensor::Altimeter, SensorStatus::Failed);

        let gps = GpsHealth {
            hdop: 1.5,
            pdop: 1.75,
            satellites: 10,
        };

        DroneSample::new(&state, gps, error)
    }

    #[test]
    fn test_columns() {
        let cols: Vec<_> = sample(None).fields().into_iter().map(|(k, _)| k).collect();

        let mut expected = vec![];
        expected.extend((0..7).map(|i| format!("motor_rpms_{i}")));
        expected.extend((0..7).map(|i| format!("motor_temps_{i}")));
        expected.extend(
            ["latitude", "longitude", "altitude", "roll", "pitch", "yaw"].map(String::from),
        );
        expected.extend((0..4).map(|i| format!("battery_levels_{i}")));
        expected.extend((0..4).map(|i| format!("battery_temps_{i}")));
        expected.extend(
            [
                "arm_status",
                "gps_health_HDOP",
                "gps_health_PDOP",
                "gps_health_satellites",
                "sensor_health_IMU",
                "sensor_health_Altimeter",
                "sensor_health_Magnetometer",
                "sensor_health_PitotTube",
                "errors_code",
                "errors_desc",
                "errors_source",
            ]
            .map(String::from),
        );

        assert_eq!(cols, expected);
    }

    #[test]
    fn test_values() {
        let fields = sample(None).fields();
        let get = |k: &str| {
            fields
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("latitude"), "13");
        assert_eq!(get("battery_levels_2"), "100");
        assert_eq!(get("arm_status"), "false");
        assert_eq!(get("gps_health_PDOP"), "1.75");
        assert_eq!(get("sensor_health_IMU"), "1");
        assert_eq!(get("sensor_health_Altimeter"), "0");
        assert_eq!(get("errors_code"), "");
        assert_eq!(get("errors_source"), "");
    }

    #[test]
    fn test_error_fields_and_alert() {
        let s = sample(Some(ErrorEvent {
            code: 104,
            description: "Altimeter Failure".to_string(),
            source: ErrorSource::FlightController,
        }));

        let fields = s.fields();
        let tail: Vec<_> = fields[fields.len() - 3..].to_vec();
        assert_eq!(
            tail,
            vec![
                ("errors_code".to_string(), "E104".to_string()),
                ("errors_desc".to_string(), "Altimeter Failure".to_string()),
                ("errors_source".to_string(), "Flight Controller".to_string()),
            ]
        );

        assert_eq!(
            s.alert().as_deref(),
            Some("E104 Altimeter Failure (Flight Controller)")
        );
        assert_eq!(sample(None).alert(), None);
    }
}
