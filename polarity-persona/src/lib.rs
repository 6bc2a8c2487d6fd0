//! Stance personas and the temperament strategies that shape how an agent
//! speaks.

mod persona;
mod registry;

pub use persona::{Base, Detox, Persona, PersonaError, Result, Temperament};
pub use registry::PersonaRegistry;
