use serde::Deserialize;
use std::hash::{Hash, Hasher};

/// The set of SCIM 1.0 attribute data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    Integer,
    Binary,
    Complex,
}

impl DataType {
    /// Parse a data type name, case-insensitively. Returns `None` for
    /// unsupported types.
    pub fn parse(s: &str) -> Option<DataType> {
        match s.to_lowercase().as_str() {
            "string" => Some(DataType::String),
            "boolean" => Some(DataType::Boolean),
            "datetime" => Some(DataType::DateTime),
            "integer" => Some(DataType::Integer),
            "binary" => Some(DataType::Binary),
            "complex" => Some(DataType::Complex),
            _ => None,
        }
    }
}

/// Schema metadata for a single SCIM attribute.
///
/// Descriptors drive both the external XML/JSON representation of an
/// attribute and its conversion to and from LDAP attributes. They are
/// immutable once built; equality and hashing are over `(schema,
/// lowercased name)`.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    schema: String,
    name: String,
    data_type: DataType,
    plural: bool,
    read_only: bool,
    required: bool,
    case_exact: bool,
    plural_types: Option<Vec<String>>,
    sub_attributes: Option<Vec<AttributeDescriptor>>,
}

impl AttributeDescriptor {
    /// A singular simple attribute.
    pub fn singular_simple(
        name: &str,
        data_type: DataType,
        schema: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
    ) -> Self {
        AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type,
            plural: false,
            read_only,
            required,
            case_exact,
            plural_types: None,
            sub_attributes: None,
        }
    }

    /// A singular complex attribute with the given sub-attributes.
    pub fn singular_complex(
        name: &str,
        schema: &str,
        read_only: bool,
        required: bool,
        sub_attributes: Vec<AttributeDescriptor>,
    ) -> Self {
        AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type: DataType::Complex,
            plural: false,
            read_only,
            required,
            case_exact: false,
            plural_types: None,
            sub_attributes: Some(sub_attributes),
        }
    }

    /// A plural attribute whose elements are complex values over the
    /// canonical sub-attribute set (`value`, `type`, `primary`, `display`,
    /// `operation`), with `value` carrying the given data type.
    pub fn plural(
        name: &str,
        value_type: DataType,
        schema: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
        plural_types: &[&str],
    ) -> Self {
        AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type: value_type,
            plural: true,
            read_only,
            required,
            case_exact,
            plural_types: if plural_types.is_empty() {
                None
            } else {
                Some(plural_types.iter().map(|s| s.to_string()).collect())
            },
            sub_attributes: Some(canonical_plural_sub_attributes(value_type, schema)),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_plural(&self) -> bool {
        self.plural
    }

    pub fn is_complex(&self) -> bool {
        self.data_type == DataType::Complex
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_case_exact(&self) -> bool {
        self.case_exact
    }

    /// Canonical type values for a plural attribute, if declared.
    pub fn plural_types(&self) -> Option<&[String]> {
        self.plural_types.as_deref()
    }

    pub fn sub_attributes(&self) -> Option<&[AttributeDescriptor]> {
        self.sub_attributes.as_deref()
    }

    /// Look up a sub-attribute descriptor by name, case-insensitively.
    pub fn sub_attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.sub_attributes
            .as_ref()?
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

impl PartialEq for AttributeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for AttributeDescriptor {}

impl Hash for AttributeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.hash(state);
        self.name.to_lowercase().hash(state);
    }
}

/// The canonical sub-attribute set shared by every plural element.
fn canonical_plural_sub_attributes(
    value_type: DataType,
    schema: &str,
) -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::singular_simple("value", value_type, schema, false, false, false),
        AttributeDescriptor::singular_simple("type", DataType::String, schema, false, false, false),
        AttributeDescriptor::singular_simple(
            "primary",
            DataType::Boolean,
            schema,
            false,
            false,
            false,
        ),
        AttributeDescriptor::singular_simple(
            "display",
            DataType::String,
            schema,
            false,
            false,
            false,
        ),
        AttributeDescriptor::singular_simple(
            "operation",
            DataType::String,
            schema,
            false,
            false,
            false,
        ),
    ]
}

/// Schema metadata for a resource: its schema URI, external name, REST
/// endpoint, and attribute descriptors in declaration order.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    schema: String,
    name: String,
    endpoint: String,
    attributes: Vec<AttributeDescriptor>,
}

impl ResourceDescriptor {
    pub fn new(
        schema: &str,
        name: &str,
        endpoint: &str,
        attributes: Vec<AttributeDescriptor>,
    ) -> Self {
        ResourceDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            attributes,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Look up an attribute descriptor by name, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}
