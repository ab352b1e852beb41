use serde_json::Value;

/// The accepted JSON type for one field, mirroring the reference schemas'
/// per-key typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// One field's shape: type, optional enum restriction, optional numeric
/// bounds. `required` absence is a schema error; presence with the wrong
/// type or an out-of-range value is also a schema error.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldType,
    pub required: bool,
    pub enum_values: Option<&'static [&'static str]>,
    pub min: Option<f64>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            kind,
            required: true,
            enum_values: None,
            min: None,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            kind,
            required: false,
            enum_values: None,
            min: None,
        }
    }

    pub const fn with_enum(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub const fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }
}

/// A declarative record schema: a fixed field list plus a closed-world
/// `additionalProperties=false` check. Validation never short-circuits —
/// every field is checked and every violation reported.
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    /// Validates `value`'s top-level structure against this schema.
    /// Errors are prefixed with the offending field path
    /// (`"<schema-name>.<field>: ..."`).
    pub fn validate(&self, value: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(obj) = value.as_object() else {
            errors.push(format!("{}: expected a JSON object", self.name));
            return errors;
        };

        let known: std::collections::HashSet<&str> = self.fields.iter().map(|f| f.name).collect();
        for key in obj.keys() {
            if !known.contains(key.as_str()) {
                errors.push(format!("{}.{key}: unexpected field (additionalProperties=false)", self.name));
            }
        }

        for field in self.fields {
            let path = format!("{}.{}", self.name, field.name);
            match obj.get(field.name) {
                None => {
                    if field.required {
                        errors.push(format!("{path}: required field missing"));
                    }
                }
                Some(val) => {
                    if !field.kind.matches(val) {
                        errors.push(format!("{path}: expected {}, got {val}", field.kind.name()));
                        continue;
                    }
                    if let Some(allowed) = field.enum_values {
                        if let Some(s) = val.as_str() {
                            if !allowed.contains(&s) {
                                errors.push(format!("{path}: '{s}' is not one of {allowed:?}"));
                            }
                        }
                    }
                    if let Some(min) = field.min {
                        if let Some(n) = val.as_f64() {
                            if n < min {
                                errors.push(format!("{path}: {n} is below minimum {min}"));
                            }
                        }
                    }
                }
            }
        }

        errors
    }
}
