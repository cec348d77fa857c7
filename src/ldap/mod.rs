pub mod filter;
pub mod mapper;
pub mod mapping;

pub use filter::{escape_ldap_value, translate};
pub use mapper::{EntryAttributes, LdapMapper};
pub use mapping::{AttributeMapping, ResourceMapping, ValueTransform};
