//! Scope lists and token models shared by the credential state machine.

pub mod scope;
pub mod token;

pub use scope::*;
pub use token::{record::*, secret::*};
