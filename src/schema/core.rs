//! SCIM 1.0 core schema, built in code.
//!
//! This module centralizes the core schema knowledge in one place. Any
//! customization of the built-in User and Group resources happens here.

use lazy_static::lazy_static;

use super::descriptor::{AttributeDescriptor, DataType, ResourceDescriptor};

/// The SCIM 1.0 core schema URI.
pub const SCHEMA_URI_CORE: &str = "urn:scim:schemas:core:1.0";

pub const RESOURCE_NAME_USER: &str = "User";
pub const RESOURCE_NAME_GROUP: &str = "Group";

pub const ATTR_ID: &str = "id";
pub const ATTR_META: &str = "meta";
pub const ATTR_SCHEMAS: &str = "schemas";

fn meta_attribute() -> AttributeDescriptor {
    AttributeDescriptor::singular_complex(
        "meta",
        SCHEMA_URI_CORE,
        true,
        false,
        vec![
            AttributeDescriptor::singular_simple(
                "created",
                DataType::DateTime,
                SCHEMA_URI_CORE,
                true,
                false,
                false,
            ),
            AttributeDescriptor::singular_simple(
                "lastModified",
                DataType::DateTime,
                SCHEMA_URI_CORE,
                true,
                false,
                false,
            ),
            AttributeDescriptor::singular_simple(
                "location",
                DataType::String,
                SCHEMA_URI_CORE,
                true,
                false,
                true,
            ),
            AttributeDescriptor::singular_simple(
                "version",
                DataType::String,
                SCHEMA_URI_CORE,
                true,
                false,
                true,
            ),
        ],
    )
}

fn id_attribute() -> AttributeDescriptor {
    AttributeDescriptor::singular_simple("id", DataType::String, SCHEMA_URI_CORE, true, false, true)
}

fn external_id_attribute() -> AttributeDescriptor {
    AttributeDescriptor::singular_simple(
        "externalId",
        DataType::String,
        SCHEMA_URI_CORE,
        false,
        false,
        true,
    )
}

fn simple(name: &str) -> AttributeDescriptor {
    AttributeDescriptor::singular_simple(name, DataType::String, SCHEMA_URI_CORE, false, false, false)
}

lazy_static! {
    /// The core User resource.
    pub static ref USER: ResourceDescriptor = ResourceDescriptor::new(
        SCHEMA_URI_CORE,
        RESOURCE_NAME_USER,
        "Users",
        vec![
            id_attribute(),
            external_id_attribute(),
            AttributeDescriptor::singular_simple(
                "userName",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                true,
                false,
            ),
            AttributeDescriptor::singular_complex(
                "name",
                SCHEMA_URI_CORE,
                false,
                false,
                vec![
                    simple("formatted"),
                    simple("familyName"),
                    simple("givenName"),
                    simple("middleName"),
                    simple("honorificPrefix"),
                    simple("honorificSuffix"),
                ],
            ),
            simple("displayName"),
            simple("nickName"),
            simple("title"),
            simple("userType"),
            simple("preferredLanguage"),
            simple("locale"),
            simple("timezone"),
            AttributeDescriptor::singular_simple(
                "active",
                DataType::Boolean,
                SCHEMA_URI_CORE,
                false,
                false,
                false,
            ),
            AttributeDescriptor::singular_simple(
                "password",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                false,
                true,
            ),
            AttributeDescriptor::plural(
                "emails",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                false,
                false,
                &["work", "home", "other"],
            ),
            AttributeDescriptor::plural(
                "phoneNumbers",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                false,
                false,
                &["work", "home", "mobile", "fax", "other"],
            ),
            AttributeDescriptor::plural(
                "groups",
                DataType::String,
                SCHEMA_URI_CORE,
                true,
                false,
                false,
                &["direct", "indirect"],
            ),
            meta_attribute(),
        ],
    );

    /// The core Group resource.
    pub static ref GROUP: ResourceDescriptor = ResourceDescriptor::new(
        SCHEMA_URI_CORE,
        RESOURCE_NAME_GROUP,
        "Groups",
        vec![
            id_attribute(),
            external_id_attribute(),
            AttributeDescriptor::singular_simple(
                "displayName",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                true,
                false,
            ),
            AttributeDescriptor::plural(
                "members",
                DataType::String,
                SCHEMA_URI_CORE,
                false,
                false,
                false,
                &["User", "Group"],
            ),
            meta_attribute(),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_resource_shape() {
        assert_eq!(USER.name(), "User");
        assert_eq!(USER.endpoint(), "Users");
        assert_eq!(USER.schema(), SCHEMA_URI_CORE);
        assert!(USER.attribute("userName").unwrap().is_required());
        assert!(USER.attribute("id").unwrap().is_read_only());
        assert!(USER.attribute("groups").unwrap().is_read_only());
        assert!(USER.attribute("emails").unwrap().is_plural());
        let name = USER.attribute("name").unwrap();
        assert!(name.is_complex());
        assert!(name.sub_attribute("familyName").is_some());
    }

    #[test]
    fn test_group_resource_shape() {
        assert_eq!(GROUP.endpoint(), "Groups");
        assert!(GROUP.attribute("displayName").unwrap().is_required());
        assert!(GROUP.attribute("members").unwrap().is_plural());
    }

    #[test]
    fn test_attribute_lookup_is_case_insensitive() {
        assert!(USER.attribute("username").is_some());
        assert!(USER.attribute("USERNAME").is_some());
        assert!(USER.attribute("no-such-attribute").is_none());
    }
}
