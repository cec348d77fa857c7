use crate::error::{ScimError, ScimResult};
use crate::schema::AttributeDescriptor;

use super::value::ScimValue;

/// A SCIM attribute: a descriptor paired with its values. Singular
/// attributes hold exactly one value, plural attributes zero or more
/// complex values. The constructors enforce those invariants at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScimAttribute {
    descriptor: AttributeDescriptor,
    values: Vec<ScimValue>,
}

impl ScimAttribute {
    /// A singular attribute with the given value. Rejects plural
    /// descriptors and values that do not match the declared data type.
    pub fn singular(descriptor: &AttributeDescriptor, value: ScimValue) -> ScimResult<Self> {
        if descriptor.is_plural() {
            return Err(ScimError::SchemaViolation(format!(
                "attribute '{}' is plural",
                descriptor.name()
            )));
        }
        check_value(descriptor, &value)?;
        Ok(ScimAttribute {
            descriptor: descriptor.clone(),
            values: vec![value],
        })
    }

    /// A singular simple attribute parsed from text per the descriptor's
    /// data type.
    pub fn simple(descriptor: &AttributeDescriptor, text: &str) -> ScimResult<Self> {
        let value = ScimValue::parse_str(descriptor.data_type(), text)?;
        ScimAttribute::singular(descriptor, value)
    }

    /// A plural attribute. Requires a plural descriptor; every element must
    /// be a complex value over the plural's canonical sub-attribute set, and
    /// at most one element may carry `primary=true`.
    pub fn plural(descriptor: &AttributeDescriptor, values: Vec<ScimValue>) -> ScimResult<Self> {
        if !descriptor.is_plural() {
            return Err(ScimError::SchemaViolation(format!(
                "attribute '{}' is singular",
                descriptor.name()
            )));
        }
        let mut primaries = 0;
        for value in &values {
            check_complex(descriptor, value)?;
            if let Some(primary) = value.sub_attribute("primary") {
                if primary.value().as_boolean().unwrap_or(false) {
                    primaries += 1;
                }
            }
        }
        if primaries > 1 {
            return Err(ScimError::SchemaViolation(format!(
                "attribute '{}' has more than one primary element",
                descriptor.name()
            )));
        }
        Ok(ScimAttribute {
            descriptor: descriptor.clone(),
            values,
        })
    }

    /// Build a complex value for this descriptor from sub-attributes,
    /// checking each name against the descriptor's sub-attribute set.
    pub fn complex_value(
        descriptor: &AttributeDescriptor,
        sub_attributes: Vec<ScimAttribute>,
    ) -> ScimResult<ScimValue> {
        let value = ScimValue::Complex(sub_attributes);
        check_complex(descriptor, &value)?;
        Ok(value)
    }

    pub fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn schema(&self) -> &str {
        self.descriptor.schema()
    }

    /// The single value of a singular attribute.
    ///
    /// Singular attributes always hold exactly one value, so this never
    /// panics for attributes built through the constructors.
    pub fn value(&self) -> &ScimValue {
        &self.values[0]
    }

    pub fn values(&self) -> &[ScimValue] {
        &self.values
    }

    /// The element marked `primary=true`, if any.
    pub fn primary_value(&self) -> Option<&ScimValue> {
        self.values.iter().find(|v| {
            v.sub_attribute("primary")
                .map(|p| p.value().as_boolean().unwrap_or(false))
                .unwrap_or(false)
        })
    }
}

fn check_value(descriptor: &AttributeDescriptor, value: &ScimValue) -> ScimResult<()> {
    if descriptor.is_complex() {
        return check_complex(descriptor, value);
    }
    if value.data_type() != descriptor.data_type() {
        return Err(ScimError::SchemaViolation(format!(
            "attribute '{}' expects {:?}, got {:?}",
            descriptor.name(),
            descriptor.data_type(),
            value.data_type()
        )));
    }
    Ok(())
}

fn check_complex(descriptor: &AttributeDescriptor, value: &ScimValue) -> ScimResult<()> {
    let sub_attributes = value.as_complex().map_err(|_| {
        ScimError::SchemaViolation(format!(
            "attribute '{}' expects a complex value",
            descriptor.name()
        ))
    })?;
    for sub in sub_attributes {
        if descriptor.sub_attribute(sub.name()).is_none() {
            return Err(ScimError::SchemaViolation(format!(
                "'{}' is not a sub-attribute of '{}'",
                sub.name(),
                descriptor.name()
            )));
        }
        if sub.descriptor().is_plural() || sub.descriptor().is_complex() {
            return Err(ScimError::SchemaViolation(format!(
                "sub-attribute '{}' of '{}' must be singular and simple",
                sub.name(),
                descriptor.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::core::SCHEMA_URI_CORE;
    use crate::schema::DataType;

    fn user_name_desc() -> AttributeDescriptor {
        AttributeDescriptor::singular_simple(
            "userName",
            DataType::String,
            SCHEMA_URI_CORE,
            false,
            true,
            false,
        )
    }

    fn emails_desc() -> AttributeDescriptor {
        AttributeDescriptor::plural(
            "emails",
            DataType::String,
            SCHEMA_URI_CORE,
            false,
            false,
            false,
            &["work", "home"],
        )
    }

    fn email(desc: &AttributeDescriptor, value: &str, primary: bool) -> ScimValue {
        let value_desc = desc.sub_attribute("value").unwrap().clone();
        let primary_desc = desc.sub_attribute("primary").unwrap().clone();
        ScimAttribute::complex_value(
            desc,
            vec![
                ScimAttribute::singular(&value_desc, ScimValue::Str(value.to_string())).unwrap(),
                ScimAttribute::singular(&primary_desc, ScimValue::Bool(primary)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_singular_rejects_plural_descriptor() {
        let err =
            ScimAttribute::singular(&emails_desc(), ScimValue::Str("x".to_string())).unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_singular_rejects_type_mismatch() {
        let err = ScimAttribute::singular(&user_name_desc(), ScimValue::Bool(true)).unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_plural_rejects_singular_descriptor() {
        let err = ScimAttribute::plural(&user_name_desc(), vec![]).unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_plural_accepts_canonical_elements() {
        let desc = emails_desc();
        let attr = ScimAttribute::plural(
            &desc,
            vec![email(&desc, "a@example.com", true), email(&desc, "b@example.com", false)],
        )
        .unwrap();
        assert_eq!(attr.values().len(), 2);
        let primary = attr.primary_value().unwrap();
        assert_eq!(
            primary.sub_attribute("value").unwrap().value().as_string().unwrap(),
            "a@example.com"
        );
    }

    #[test]
    fn test_plural_rejects_two_primaries() {
        let desc = emails_desc();
        let err = ScimAttribute::plural(
            &desc,
            vec![email(&desc, "a@example.com", true), email(&desc, "b@example.com", true)],
        )
        .unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }

    #[test]
    fn test_complex_value_rejects_unknown_sub_attribute() {
        let desc = emails_desc();
        let stray = ScimAttribute::singular(
            &AttributeDescriptor::singular_simple(
                "color",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                false,
                false,
            ),
            ScimValue::Str("red".to_string()),
        )
        .unwrap();
        let err = ScimAttribute::complex_value(&desc, vec![stray]).unwrap_err();
        assert!(matches!(err, ScimError::SchemaViolation(_)));
    }
}
