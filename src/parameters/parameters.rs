use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Error deserializing parameters")]
    Deserialize(#[from] toml::de::Error),

    #[error("Parameter toml does not have the right structure (error in '{0}')")]
    BadToml(String),

    #[error("Element '{path}' not found")]
    NotFound { path: String },

    #[error("Cannot cast parameter '{path}' to {dtype}")]
    BadCast { path: String, dtype: String },

    #[error("Element '{path}' is not a parameter")]
    NotAParameter { path: String },

    #[error("Element '{path}' is not a map")]
    NotAMap { path: String },

    #[error("Parameter '{path}' is out of range: {reason}")]
    OutOfRange { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ParameterValue {
    #[serde(rename = "bool")]
    Bool { val: bool },
    #[serde(rename = "int")]
    Int { val: i64 },
    #[serde(rename = "float")]
    Float { val: f64 },
    #[serde(rename = "str")]
    String { val: String },

    #[serde(rename = "int[]")]
    IntArray { val: Vec<i64> },
    #[serde(rename = "float[]")]
    FloatArray { val: Vec<f64> },
    #[serde(rename = "str[]")]
    StringArray { val: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    path: String,
    value: ParameterValue,
}

macro_rules! bad_cast {
    ($self:ident, $dtype:literal) => {
        Error::BadCast {
            path: $self.path.clone(),
            dtype: $dtype.to_string(),
        }
    };
}

impl Parameter {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn value_bool(&self) -> Result<bool, Error> {
        match self.value {
            ParameterValue::Bool { val } => Ok(val),
            _ => Err(bad_cast!(self, "bool")),
        }
    }

    pub fn value_int(&self) -> Result<i64, Error> {
        match self.value {
            ParameterValue::Int { val } => Ok(val),
            _ => Err(bad_cast!(self, "int")),
        }
    }

    /// Integers are accepted where a float is expected
    pub fn value_float(&self) -> Result<f64, Error> {
        match self.value {
            ParameterValue::Float { val } => Ok(val),
            ParameterValue::Int { val } => Ok(val as f64),
            _ => Err(bad_cast!(self, "float")),
        }
    }

    pub fn value_string(&self) -> Result<&str, Error> {
        match &self.value {
            ParameterValue::String { val } => Ok(val),
            _ => Err(bad_cast!(self, "str")),
        }
    }

    pub fn value_float_arr(&self) -> Result<&[f64], Error> {
        match &self.value {
            ParameterValue::FloatArray { val } => Ok(val),
            _ => Err(bad_cast!(self, "float[]")),
        }
    }

    pub fn value_string_arr(&self) -> Result<&[String], Error> {
        match &self.value {
            ParameterValue::StringArray { val } => Ok(val),
            _ => Err(bad_cast!(self, "str[]")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterMap {
    path: String,
    map: BTreeMap<String, ParameterTree>,
}

impl ParameterMap {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Looks up an element by its dot-separated path relative to this map
    pub fn get(&self, rel_path: &str) -> Result<&ParameterTree, Error> {
        let not_found = || Error::NotFound {
            path: append_path(&self.path, rel_path),
        };

        let mut parts = rel_path.split('.');
        let mut elem = self
            .map
            .get(parts.next().unwrap_or_default())
            .ok_or_else(not_found)?;

        for part in parts {
            match elem {
                ParameterTree::Node(n) => {
                    elem = n.map.get(part).ok_or_else(not_found)?;
                }
                ParameterTree::Leaf(_) => return Err(not_found()),
            }
        }

        Ok(elem)
    }

    pub fn get_param(&self, rel_path: &str) -> Result<&Parameter, Error> {
        self.get(rel_path)?.as_param()
    }

    pub fn get_map(&self, rel_path: &str) -> Result<&ParameterMap, Error> {
        self.get(rel_path)?.as_map()
    }

    /// Returns the subtree at `rel_path`, or an empty map rooted there if it
    /// does not exist
    pub fn get_map_or_empty(&self, rel_path: &str) -> Result<ParameterMap, Error> {
        match self.get_map(rel_path) {
            Ok(map) => Ok(map.clone()),
            Err(Error::NotFound { path }) => Ok(ParameterMap {
                path,
                map: BTreeMap::new(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn float_or(&self, rel_path: &str, default: f64) -> Result<f64, Error> {
        self.optional(rel_path, Parameter::value_float)
            .map(|v| v.unwrap_or(default))
    }

    pub fn int_or(&self, rel_path: &str, default: i64) -> Result<i64, Error> {
        self.optional(rel_path, Parameter::value_int)
            .map(|v| v.unwrap_or(default))
    }

    pub fn bool_or(&self, rel_path: &str, default: bool) -> Result<bool, Error> {
        self.optional(rel_path, Parameter::value_bool)
            .map(|v| v.unwrap_or(default))
    }

    pub fn string_or(&self, rel_path: &str, default: &str) -> Result<String, Error> {
        self.optional(rel_path, |p| p.value_string().map(str::to_string))
            .map(|v| v.unwrap_or_else(|| default.to_string()))
    }

    fn optional<'a, T, F>(&'a self, rel_path: &str, cast: F) -> Result<Option<T>, Error>
    where
        F: FnOnce(&'a Parameter) -> Result<T, Error>,
    {
        match self.get_param(rel_path) {
            Ok(p) => cast(p).map(Some),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterTree {
    Node(ParameterMap),
    Leaf(Parameter),
}

impl ParameterTree {
    fn as_param(&self) -> Result<&Parameter, Error> {
        match self {
            Self::Leaf(p) => Ok(p),
            Self::Node(m) => Err(Error::NotAParameter {
                path: m.path.clone(),
            }),
        }
    }

    fn as_map(&self) -> Result<&ParameterMap, Error> {
        match self {
            Self::Node(m) => Ok(m),
            Self::Leaf(p) => Err(Error::NotAMap {
                path: p.path.clone(),
            }),
        }
    }
}

pub fn parse_string(toml_str: &str) -> Result<ParameterMap, Error> {
    let table = toml::from_str::<Table>(toml_str)?;

    parse_table(table, String::new())
}

/// A table with a `type` key is a parameter, any other table is a subtree
fn parse_table(table: Table, root: String) -> Result<ParameterMap, Error> {
    let mut nodes = BTreeMap::new();

    for (key, val) in table.into_iter() {
        let path = append_path(&root, &key);

        let Value::Table(val) = val else {
            return Err(Error::BadToml(path));
        };

        if val.contains_key("type") {
            let value = val
                .try_into::<ParameterValue>()
                .map_err(|_| Error::BadToml(path.clone()))?;
            nodes.insert(key, ParameterTree::Leaf(Parameter { path, value }));
        } else {
            nodes.insert(key, ParameterTree::Node(parse_table(val, path)?));
        }
    }

    Ok(ParameterMap {
        path: root,
        map: nodes,
    })
}

fn append_path(root: &str, key: &str) -> String {
    if root.is_empty() {
        key.to_string()
    } else {
        format!("{root}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PARAMS: &str = r#"
        [sim]
        dt = { type = "float", val = 0.01 }

        [drone]
        tick = { type = "float", val = 1 }
        motors = { type = "int", val = 7 }
        origin = { type = "float[]", val = [13.0, 77.6, 150.0] }

        [drone.battery]
        armed = { type = "bool", val = false }
        sensors = { type = "str[]", val = ["IMU", "Altimeter"] }
    "#;

    #[test]
    fn test_empty() {
        assert_eq!(parse_string(""), Ok(ParameterMap::default()));
    }

    #[test]
    fn test_lookup() -> Result<(), Error> {
        let params = parse_string(PARAMS)?;

        assert_eq!(params.get_param("sim.dt")?.value_float()?, 0.01);
        assert_eq!(params.get_param("drone.tick")?.value_float()?, 1.0);
        assert_eq!(params.get_param("drone.motors")?.value_int()?, 7);
        assert_eq!(
            params.get_param("drone.origin")?.value_float_arr()?,
            &[13.0, 77.6, 150.0]
        );
        assert!(!params.get_param("drone.battery.armed")?.value_bool()?);

        let drone = params.get_map("drone")?;
        assert_eq!(drone.path(), "drone");
        assert_eq!(drone.get_param("battery.sensors")?.path(), "drone.battery.sensors");
        assert_eq!(
            drone.get_param("battery.sensors")?.value_string_arr()?,
            &["IMU".to_string(), "Altimeter".to_string()]
        );

        Ok(())
    }

    #[test]
    fn test_lookup_errors() -> Result<(), Error> {
        let params = parse_string(PARAMS)?;

        assert_eq!(
            params.get_param("drone.max_speed"),
            Err(Error::NotFound {
                path: "drone.max_speed".to_string()
            })
        );
        assert_eq!(
            params.get_param("drone.tick.x"),
            Err(Error::NotFound {
                path: "drone.tick.x".to_string()
            })
        );
        assert_eq!(
            params.get_param("drone.battery"),
            Err(Error::NotAParameter {
                path: "drone.battery".to_string()
            })
        );
        assert_eq!(
            params.get_map("sim.dt"),
            Err(Error::NotAMap {
                path: "sim.dt".to_string()
            })
        );
        assert_eq!(
            params.get_param("drone.motors")?.value_bool(),
            Err(Error::BadCast {
                path: "drone.motors".to_string(),
                dtype: "bool".to_string()
            })
        );

        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<(), Error> {
        let params = parse_string(PARAMS)?;
        let drone = params.get_map("drone")?;

        assert_eq!(drone.float_or("tick", 5.0)?, 1.0);
        assert_eq!(drone.float_or("max_speed", 15.0)?, 15.0);
        assert_eq!(drone.int_or("motors", 4)?, 7);
        assert_eq!(drone.string_or("name", "gcs")?, "gcs");
        assert!(drone.bool_or("battery.armed", true).is_ok_and(|v| !v));

        // Present but with the wrong type is still an error
        assert!(drone.bool_or("motors", false).is_err());

        let rig = params.get_map_or_empty("rig")?;
        assert_eq!(rig.path(), "rig");
        assert_eq!(rig.float_or("max_rpm", 12000.0)?, 12000.0);

        Ok(())
    }

    #[test]
    fn test_bad_structure() {
        assert_eq!(
            parse_string("val = 1.0"),
            Err(Error::BadToml("val".to_string()))
        );
        assert_eq!(
            parse_string("val = { val = 1.0, type = \"badtype\" }"),
            Err(Error::BadToml("val".to_string()))
        );
        assert_eq!(
            parse_string("[a]\nval = { val = true, type = \"float\" }"),
            Err(Error::BadToml("a.val".to_string()))
        );
        assert_eq!(
            parse_string("val = { val = [1.0, \"x\"], type = \"float[]\" }"),
            Err(Error::BadToml("val".to_string()))
        );
        assert!(matches!(
            parse_string("val = {"),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_int_as_float() -> Result<(), Error> {
        let params = parse_string("x = { val = 3, type = \"float\" }")?;
        assert_eq!(params.get_param("x")?.value(), &ParameterValue::Float { val: 3.0 });

        Ok(())
    }
}
