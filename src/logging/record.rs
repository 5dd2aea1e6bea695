use std::fmt::Display;

/// A sample that can be written as one row of a flat table
pub trait Record {
    /// Column name and formatted value pairs, in column order
    fn fields(&self) -> Vec<(String, String)>;

    /// One line description for console monitoring
    fn summary(&self) -> String;

    /// Something in this sample worth a warning
    fn alert(&self) -> Option<String> {
        None
    }
}

/// Builder for the flattened columns of a record
#[derive(Debug, Default)]
pub struct Fields {
    fields: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Display) -> &mut Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Writes `key_0`, `key_1`, ... for each element of `values`
    pub fn push_list<T: Display>(&mut self, key: &str, values: &[T]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.push(format!("{key}_{i}"), v);
        }
        self
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_fields_flatten_lists() {
        let mut f = Fields::new();
        f.push("a", 1.5).push_list("b", &[1, 2]).push("c", "x");

        let cols: Vec<_> = f.into_vec();
        assert_eq!(
            cols,
            vec![
                ("a".to_string(), "1.5".to_string()),
                ("b_0".to_string(), "1".to_string()),
                ("b_1".to_string(), "2".to_string()),
                ("c".to_string(), "x".to_string()),
            ]
        );
    }
}
