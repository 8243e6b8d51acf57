//! Minecraft modding taxonomy expansion

use crate::expansion::{
    ExpansionError, ExpansionRequest, ExpansionStrategy, ExpansionTerm, QueryExpander,
};
use crate::text;
use std::collections::HashSet;

const RELATED_CONFIDENCE: f32 = 0.8;
const RELATED_WEIGHT: f32 = 0.7;
const CONCEPT_CONFIDENCE: f32 = 0.7;
const CONCEPT_WEIGHT: f32 = 0.6;
const VERSION_CONFIDENCE: f32 = 0.9;
const VERSION_WEIGHT: f32 = 0.8;
const PARENT_CONFIDENCE: f32 = 0.6;
const PARENT_WEIGHT: f32 = 0.5;

struct DomainConcept {
    name: &'static str,
    synonyms: &'static [&'static str],
    related: &'static [&'static str],
    concepts: &'static [&'static str],
}

const TAXONOMY: &[DomainConcept] = &[
    DomainConcept {
        name: "blocks",
        synonyms: &["block", "cube", "tile", "brick"],
        related: &["material", "hardness", "placement", "block state"],
        concepts: &["block entity", "block model", "light level"],
    },
    DomainConcept {
        name: "items",
        synonyms: &["item", "tool", "weapon", "armor", "itemstack"],
        related: &["stack size", "durability", "item group"],
        concepts: &["inventory", "creative tab", "item model"],
    },
    DomainConcept {
        name: "entities",
        synonyms: &["entity", "mob", "creature", "npc", "boss"],
        related: &["spawn", "hitbox", "attributes", "ai goals"],
        concepts: &["entity renderer", "pathfinding", "behavior"],
    },
    DomainConcept {
        name: "recipes",
        synonyms: &["recipe", "crafting", "craft", "smelting", "shaped", "shapeless"],
        related: &["ingredients", "crafting table", "result"],
        concepts: &["recipe json", "data pack", "furnace"],
    },
    DomainConcept {
        name: "world_generation",
        synonyms: &["worldgen", "world generation", "biome", "structure", "terrain", "ore"],
        related: &["feature", "noise", "dimension", "placement modifier"],
        concepts: &["chunk", "seed", "biome modifier"],
    },
    DomainConcept {
        name: "redstone",
        synonyms: &["redstone", "circuit", "signal", "piston", "comparator", "repeater"],
        related: &["power level", "signal strength", "logic gate"],
        concepts: &["game tick", "update order", "redstone dust"],
    },
    DomainConcept {
        name: "modding",
        synonyms: &["mod", "modding", "forge", "fabric", "neoforge", "addon", "plugin"],
        related: &["mod loader", "registry", "event bus"],
        concepts: &["mixin", "mod metadata", "api"],
    },
];

/// Two-level concept hierarchy: (child, parent)
const HIERARCHY: &[(&str, &str)] = &[
    ("blocks", "game objects"),
    ("items", "game objects"),
    ("entities", "game objects"),
    ("recipes", "game mechanics"),
    ("redstone", "game mechanics"),
    ("world_generation", "world"),
    ("modding", "development"),
    ("game objects", "content"),
    ("world", "content"),
    ("game mechanics", "gameplay"),
    ("development", "mod development"),
];

const LOADER_TERMS: &[(&str, &[&str])] = &[
    ("forge", &["deferredregister", "mod event bus", "mods.toml"]),
    ("neoforge", &["deferredregister", "neoforge events", "neoforge.mods.toml"]),
    ("fabric", &["fabric api", "registry.register", "fabric.mod.json"]),
    ("quilt", &["quilt standard libraries", "quilt.mod.json"]),
    ("bukkit", &["bukkit api", "plugin.yml"]),
    ("spigot", &["spigot api", "plugin.yml"]),
    ("paper", &["paper api", "plugin.yml"]),
];

const EDITION_TERMS: &[(&str, &[&str])] = &[
    ("java", &["java edition"]),
    ("bedrock", &["behavior pack", "resource pack", "bedrock addon"]),
];

/// Taxonomy concepts referenced by the query, in taxonomy order
///
/// Single-word synonyms match on stemmed tokens, multi-word synonyms on the
/// lowercased text.
pub fn detect_concepts(query_text: &str) -> Vec<&'static str> {
    let lower = query_text.to_lowercase();
    let stems: HashSet<String> = text::stemmed_tokens(query_text).into_iter().collect();

    TAXONOMY
        .iter()
        .filter(|concept| {
            std::iter::once(&concept.name)
                .chain(concept.synonyms.iter())
                .any(|syn| {
                    if syn.contains(' ') {
                        lower.contains(syn)
                    } else {
                        stems.contains(&text::stem(syn))
                    }
                })
        })
        .map(|concept| concept.name)
        .collect()
}

fn parent_of(child: &str) -> Option<&'static str> {
    HIERARCHY
        .iter()
        .find(|(c, _)| *c == child)
        .map(|(_, parent)| *parent)
}

/// Domain vocabulary expander
pub struct DomainExpander {
    max_query_words: usize,
}

impl DomainExpander {
    pub fn new(max_query_words: usize) -> Self {
        Self { max_query_words }
    }

    fn version_terms(&self, req: &ExpansionRequest<'_>) -> Vec<(String, String)> {
        let Some(ctx) = req.context else {
            return Vec::new();
        };
        let mut terms = Vec::new();

        if let Some(version) = &ctx.minecraft_version {
            terms.push((format!("minecraft {}", version), format!("version:{}", version)));
        }

        if let Some(loader) = &ctx.mod_loader {
            let loader = loader.to_lowercase();
            if let Some((_, loader_terms)) = LOADER_TERMS.iter().find(|(l, _)| *l == loader) {
                for term in loader_terms.iter() {
                    terms.push((term.to_string(), format!("loader:{}", loader)));
                }
            }
            if let Some(version) = &ctx.minecraft_version {
                terms.push((format!("{} {}", loader, version), format!("loader:{}", loader)));
            }
        }

        if let Some(edition) = &ctx.edition {
            let edition = edition.to_lowercase();
            if let Some((_, edition_terms)) = EDITION_TERMS.iter().find(|(e, _)| *e == edition) {
                for term in edition_terms.iter() {
                    terms.push((term.to_string(), format!("edition:{}", edition)));
                }
            }
        }

        terms
    }
}

impl QueryExpander for DomainExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Domain
    }

    fn expand(&self, req: &ExpansionRequest<'_>) -> Result<Vec<ExpansionTerm>, ExpansionError> {
        let words = req.word_count();
        if words > self.max_query_words {
            return Err(ExpansionError::QueryTooLong {
                words,
                max: self.max_query_words,
            });
        }

        let mut terms = Vec::new();
        let mut push = |term: &str,
                        confidence: f32,
                        weight: f32,
                        source: String|
         -> Result<(), ExpansionError> {
            if !req.mentions(term) {
                terms.push(ExpansionTerm::new(
                    term,
                    ExpansionStrategy::Domain,
                    confidence,
                    weight,
                    source,
                )?);
            }
            Ok(())
        };

        let detected = detect_concepts(req.query_text);
        for name in &detected {
            let Some(concept) = TAXONOMY.iter().find(|c| c.name == *name) else {
                continue;
            };
            for &term in concept.related {
                push(term, RELATED_CONFIDENCE, RELATED_WEIGHT, format!("related:{}", name))?;
            }
            for &term in concept.concepts {
                push(term, CONCEPT_CONFIDENCE, CONCEPT_WEIGHT, format!("concept:{}", name))?;
            }
        }

        for (term, source) in self.version_terms(req) {
            push(term.as_str(), VERSION_CONFIDENCE, VERSION_WEIGHT, source)?;
        }

        for name in &detected {
            let mut current = *name;
            for _ in 0..2 {
                let Some(parent) = parent_of(current) else {
                    break;
                };
                push(parent, PARENT_CONFIDENCE, PARENT_WEIGHT, format!("parent:{}", name))?;
                current = parent;
            }
        }

        Ok(terms)
    }
}
