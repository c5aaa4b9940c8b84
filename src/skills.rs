//! Skill loading - named instruction text injected on demand
//!
//! Skills arrive pre-loaded as name/text pairs; discovery and parsing of
//! on-disk skill files happens outside this crate.

use std::collections::HashMap;
use tracing::debug;

/// A loaded skill
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub text: String,
}

/// Source of skill content, looked up by name
pub trait SkillLoader: Send + Sync {
    fn load_by_name(&self, name: &str) -> Option<Skill>;
}

/// Loader over a fixed in-memory set of skills
#[derive(Debug, Default)]
pub struct PreloadedSkills {
    skills: HashMap<String, String>,
}

impl PreloadedSkills {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill under a name, replacing any previous text
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        debug!(%name, "PreloadedSkills::insert: called");
        self.skills.insert(name, text.into());
    }
}

impl SkillLoader for PreloadedSkills {
    fn load_by_name(&self, name: &str) -> Option<Skill> {
        debug!(%name, "PreloadedSkills::load_by_name: called");
        self.skills.get(name).map(|text| Skill {
            name: name.to_string(),
            text: text.clone(),
        })
    }
}
