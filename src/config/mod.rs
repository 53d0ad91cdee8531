//! Everything involved in turning the relational model into a validated
//! config document: ACL/WAF/advanced-config compilation, generation, and
//! validation.

pub mod acl;
pub mod advanced;
pub mod document;
pub mod generator;
pub mod handlers;
pub mod validator;
pub mod waf;

pub use document::Config;
pub use generator::{generate, GenerateInput};
pub use validator::validate;
