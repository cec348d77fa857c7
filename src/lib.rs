pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod ldap;
pub mod logging;
pub mod marshal;
pub mod model;
pub mod parser;
pub mod schema;
pub mod server;
pub mod uri;

pub use error::{ScimError, ScimResult};
pub use model::{ScimAttribute, ScimObject, ScimValue};
pub use schema::SchemaRegistry;
