use crate::logging::{Fields, Record};

/// Rig readings published once per tick
#[derive(Debug, Clone, PartialEq)]
pub struct RigSample {
    pub rpm: i64,
    /// A
    pub current: f64,
    /// N·m
    pub torque: f64,
    /// °C
    pub temp: f64,
    /// V
    pub voltage: f64,
    /// W
    pub power: f64,
}

impl Record for RigSample {
    fn fields(&self) -> Vec<(String, String)> {
        let mut f = Fields::new();

        f.push("rpm", self.rpm)
            .push("current", self.current)
            .push("torque", self.torque)
            .push("temp", self.temp)
            .push("voltage", self.voltage)
            .push("power", self.power);

        f.into_vec()
    }

    fn summary(&self) -> String {
        format!(
            "{} RPM, {:.2} A, {:.2} Nm, {:.2} V, {:.1} °C, {:.2} W",
            self.rpm, self.current, self.torque, self.voltage, self.temp, self.power
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fields() {
        let s = RigSample {
            rpm: 5012,
            current: 3.1,
            torque: 0.93,
            temp: 25.4,
            voltage: 23.0,
            power: 71.3,
        };

        let fields = s.fields();
        let keys: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["rpm", "current", "torque", "temp", "voltage", "power"]);

        assert_eq!(fields[0].1, "5012");
        assert_eq!(fields[4].1, "23");
        assert_eq!(s.alert(), None);
    }
}
