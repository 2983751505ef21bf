//! Rubric catalog data model.
//!
//! A [`RubricCatalog`] is the read-only configuration every evaluation task
//! shares: the subjects to score, the criteria to score them on, and the
//! personas doing the scoring.

use serde::{Deserialize, Serialize};

/// A named scoring dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Column name, also the JSON key the model must use.
    pub name: String,
    /// Human-readable description shown in the prompt.
    #[serde(default)]
    pub description: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A simulated evaluator with a biasing worldview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Short identifier (e.g. "metalhead").
    pub id: String,
    /// Worldview text injected into the prompt.
    pub description: String,
}

impl Persona {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Everything a panel run evaluates, and who evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricCatalog {
    /// What a subject is called in prose (e.g. "band").
    pub subject_label: String,
    /// Role every persona plays (e.g. "music critic").
    pub persona_role: String,
    /// Background instruction shared by all personas.
    pub instruction: String,
    /// Ordered, unique subject names.
    pub subjects: Vec<String>,
    /// Ordered, unique criteria.
    pub criteria: Vec<Criterion>,
    /// Ordered, unique personas.
    pub personas: Vec<Persona>,
}

impl RubricCatalog {
    /// Criterion names in catalog order.
    pub fn criterion_names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// Look up a persona by id.
    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Resolve a subject name as written by a model to the catalog spelling.
    ///
    /// Matching ignores surrounding whitespace and ASCII case.
    pub fn resolve_subject(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.subjects
            .iter()
            .find(|s| s.as_str() == name)
            .or_else(|| self.subjects.iter().find(|s| s.eq_ignore_ascii_case(name)))
            .map(String::as_str)
    }

    /// The band panel critic-panel ships with.
    pub fn builtin() -> Self {
        let subjects = [
            "The Beatles",
            "Led Zeppelin",
            "Pink Floyd",
            "Queen",
            "The Rolling Stones",
            "Metallica",
            "Megadeth",
            "Black Sabbath",
            "Iron Maiden",
            "Tool",
        ];

        Self {
            subject_label: "band".into(),
            persona_role: "music critic".into(),
            instruction: "You have been asked to evaluate the greatness of historically significant bands across genres including rock, metal, pop, and progressive.".into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            criteria: vec![
                Criterion::new(
                    "Musical Innovation",
                    "Pioneering ideas, new sounds, genre blending.",
                ),
                Criterion::new(
                    "Cultural Impact",
                    "Broader societal influence, pop culture penetration.",
                ),
                Criterion::new(
                    "Lyrical or Thematic Depth",
                    "Narrative richness, philosophical weight, relatability.",
                ),
                Criterion::new(
                    "Technical Proficiency",
                    "Musical complexity, virtuosity, performance execution.",
                ),
                Criterion::new(
                    "Live Performance Strength",
                    "Energy, presence, crowd connection on stage.",
                ),
                Criterion::new(
                    "Legacy & Longevity",
                    "Enduring influence across generations and artists.",
                ),
            ],
            personas: vec![
                Persona::new(
                    "metalhead",
                    "You're in your 30s, a lifelong metal fan. You value power, aggression, instrumental mastery, and complexity. You dismiss pop and overproduced music as shallow.",
                ),
                Persona::new(
                    "popstar",
                    "You're in your 20s, immersed in social media culture. You love global accessibility, emotional resonance, and catchy choruses. You believe great bands bring joy and unity.",
                ),
                Persona::new(
                    "boomer",
                    "You're in your 70s. You grew up during the golden age of rock and believe greatness is rooted in legacy, songwriting, and timeless appeal. Newer music feels synthetic to you.",
                ),
                Persona::new(
                    "genz",
                    "You're a teenager, online-native, and value diversity, identity, and innovation in music. You're drawn to bands that say something real or break genre rules.",
                ),
                Persona::new(
                    "indie",
                    "You're in your 30s, an art-school type who craves authenticity, emotion, and underground cool. You dislike commercial polish and love expressive weirdness.",
                ),
            ],
        }
    }
}
