//! Descriptor vocabulary and the metadata document.
//!
//! The ASL-visible type vocabulary is fixed: `string`, `number`,
//! `boolean`, `null`, `array of X`, `object as T`, each optionally
//! suffixed with ` or null`. Temporal values always carry the
//! `yyyy-MM-ddTHH:mm:ssZ` format; enums carry `enum:<TypeName>`.

use serde_json::{json, Map, Value};

use super::Method;

/// Temporal format string, fixed for every timestamp-shaped member.
pub const TIMESTAMP_FORMAT: &str = "yyyy-MM-ddTHH:mm:ssZ";

/// The ASL-visible kind of a parameter, return, or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AslKind {
    String,
    Number,
    Boolean,
    Null,
    /// Sequence of a single element kind; the element's format is carried
    /// by the owning [`Descriptor`].
    Array(Box<AslKind>),
    /// Composite referenced by name in the `Types` table. The name
    /// `Object` is the untyped escape hatch for raw payloads.
    Object(String),
}

impl AslKind {
    fn render(&self) -> String {
        match self {
            AslKind::String => "string".to_string(),
            AslKind::Number => "number".to_string(),
            AslKind::Boolean => "boolean".to_string(),
            AslKind::Null => "null".to_string(),
            AslKind::Array(element) => format!("array of {}", element.render()),
            AslKind::Object(name) => format!("object as {name}"),
        }
    }
}

/// Extra shape information alongside the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueFormat {
    /// ISO-8601 timestamp, normalised to UTC.
    Timestamp,
    /// Member of the named registered enum.
    Enum(String),
}

impl ValueFormat {
    fn render(&self) -> String {
        match self {
            ValueFormat::Timestamp => TIMESTAMP_FORMAT.to_string(),
            ValueFormat::Enum(name) => format!("enum:{name}"),
        }
    }
}

/// Declared shape of one parameter, return value, or object property.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub kind: AslKind,
    pub nullable: bool,
    pub format: Option<ValueFormat>,
    pub description: Option<String>,
}

impl Descriptor {
    fn of(kind: AslKind) -> Self {
        Self {
            kind,
            nullable: false,
            format: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(AslKind::String)
    }

    pub fn number() -> Self {
        Self::of(AslKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(AslKind::Boolean)
    }

    pub fn null() -> Self {
        Self::of(AslKind::Null)
    }

    /// ISO-8601 timestamp carried as a string.
    pub fn timestamp() -> Self {
        Self {
            format: Some(ValueFormat::Timestamp),
            ..Self::of(AslKind::String)
        }
    }

    /// Member of a registered enum, carried as a string.
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self {
            format: Some(ValueFormat::Enum(name.into())),
            ..Self::of(AslKind::String)
        }
    }

    /// Sequence of `element`; the element's format is inherited.
    pub fn array_of(element: Descriptor) -> Self {
        Self {
            kind: AslKind::Array(Box::new(element.kind)),
            nullable: false,
            format: element.format,
            description: None,
        }
    }

    /// Composite referenced by name in the `Types` table.
    pub fn object(name: impl Into<String>) -> Self {
        Self::of(AslKind::Object(name.into()))
    }

    /// Untyped raw payload, rendered as `object as Object` and passed
    /// through coercion untouched.
    pub fn any() -> Self {
        Self::object("Object")
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// The fixed vocabulary string, e.g. `array of number or null`.
    pub fn render_type(&self) -> String {
        let base = self.kind.render();
        if self.nullable {
            format!("{base} or null")
        } else {
            base
        }
    }

    pub(crate) fn enum_name(&self) -> Option<&str> {
        match &self.format {
            Some(ValueFormat::Enum(name)) => Some(name),
            _ => None,
        }
    }
}

/// A composite type emitted once into the `Types` table and referenced by
/// name from descriptors.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) properties: Vec<(String, Descriptor)>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Vec::new(),
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.properties.push((name.into(), descriptor));
        self
    }
}

fn descriptor_entry(descriptor: &Descriptor) -> Value {
    let mut entry = Map::new();
    entry.insert("Type".to_string(), json!(descriptor.render_type()));
    if let Some(description) = &descriptor.description {
        entry.insert("Description".to_string(), json!(description));
    }
    if let Some(format) = &descriptor.format {
        entry.insert("Format".to_string(), json!(format.render()));
    }
    Value::Object(entry)
}

fn return_entry(descriptor: &Descriptor) -> Value {
    match &descriptor.format {
        Some(format) => json!({
            "Type": descriptor.render_type(),
            "Format": format.render(),
        }),
        None => json!(descriptor.render_type()),
    }
}

/// Builds the `Methods` / `Types` / `Enums` document, in registration
/// order throughout.
pub(crate) fn metadata_document(
    methods: &[Method],
    types: &[ObjectType],
    enums: &[(String, Vec<String>)],
) -> Value {
    let mut methods_doc = Map::new();
    for method in methods {
        let mut entry = Map::new();
        if let Some(description) = &method.description {
            entry.insert("Description".to_string(), json!(description));
        }
        let mut params = Map::new();
        for param in &method.params {
            params.insert(param.name.clone(), descriptor_entry(&param.descriptor));
        }
        entry.insert("Parameters".to_string(), Value::Object(params));
        entry.insert("Return".to_string(), return_entry(&method.returns));
        methods_doc.insert(method.name.clone(), Value::Object(entry));
    }

    let mut types_doc = Map::new();
    for ty in types {
        let mut entry = Map::new();
        if let Some(description) = &ty.description {
            entry.insert("Description".to_string(), json!(description));
        }
        let mut properties = Map::new();
        for (name, descriptor) in &ty.properties {
            properties.insert(name.clone(), descriptor_entry(descriptor));
        }
        entry.insert("Properties".to_string(), Value::Object(properties));
        types_doc.insert(ty.name.clone(), Value::Object(entry));
    }

    let mut enums_doc = Map::new();
    for (name, members) in enums {
        enums_doc.insert(name.clone(), json!(members));
    }

    json!({
        "Methods": Value::Object(methods_doc),
        "Types": Value::Object(types_doc),
        "Enums": Value::Object(enums_doc),
    })
}
