use crate::{Base, Detox, Persona, PersonaError, Temperament};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for personas and temperaments.
///
/// The registry is responsible for:
/// - Registering personas, rejecting ones without fallback lines
/// - Looking up personas by stance
/// - Looking up temperaments by model type
pub struct PersonaRegistry {
    personas: HashMap<String, Persona>,
    temperaments: HashMap<String, Arc<dyn Temperament>>,
}

impl PersonaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            personas: HashMap::new(),
            temperaments: HashMap::new(),
        }
    }

    /// Registry with the left/right/neutral personas and the base/detox temperaments.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for persona in [Persona::left(), Persona::right(), Persona::neutral()] {
            registry.personas.insert(persona.stance.clone(), persona);
        }
        registry.register_temperament(Arc::new(Base));
        registry.register_temperament(Arc::new(Detox::default()));
        registry
    }

    /// Register a persona, replacing any previous one with the same stance.
    pub fn register_persona(&mut self, persona: Persona) -> Result<(), PersonaError> {
        if persona.fallback.is_empty() {
            return Err(PersonaError::EmptyFallback(persona.stance));
        }
        self.personas.insert(persona.stance.clone(), persona);
        Ok(())
    }

    pub fn register_temperament(&mut self, temperament: Arc<dyn Temperament>) {
        self.temperaments
            .insert(temperament.model_type().to_string(), temperament);
    }

    /// Get a persona by stance.
    pub fn persona(&self, stance: &str) -> Result<&Persona, PersonaError> {
        self.personas
            .get(stance)
            .ok_or_else(|| PersonaError::UnknownStance(stance.to_string()))
    }

    /// Get a temperament by model type.
    pub fn temperament(&self, model_type: &str) -> Result<Arc<dyn Temperament>, PersonaError> {
        self.temperaments
            .get(model_type)
            .cloned()
            .ok_or_else(|| PersonaError::UnknownModelType(model_type.to_string()))
    }

    /// Registered stances, sorted.
    pub fn stances(&self) -> Vec<&str> {
        let mut stances: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        stances.sort_unstable();
        stances
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
