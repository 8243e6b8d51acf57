use crate::documents::MultiModalDocument;
use crate::rerank::{RerankContext, RerankError, ReRanker};
use crate::search::SearchResult;
use crate::text;

const TAG_WEIGHT: f32 = 0.35;
const TYPE_WEIGHT: f32 = 0.2;
const PROJECT_WEIGHT: f32 = 0.15;
const PATH_WEIGHT: f32 = 0.15;
const LENGTH_WEIGHT: f32 = 0.15;

/// Tags beyond this count do not dilute the tag score
const TAG_SATURATION: usize = 4;
const PATH_SATURATION: usize = 2;
const MIN_IDEAL_WORDS: usize = 50;
const MAX_IDEAL_WORDS: usize = 2000;
const NEUTRAL: f32 = 0.5;

/// Stateless document-feature overlap with the query
///
/// Blends tag overlap, content-type match, project match, source path overlap
/// and a document length prior.
#[derive(Debug, Default)]
pub struct FeatureBasedReRanker;

impl FeatureBasedReRanker {
    pub fn new() -> Self {
        Self
    }

    fn score(&self, ctx: &RerankContext<'_>, doc: &MultiModalDocument) -> f32 {
        let tag = tag_overlap(ctx, doc);
        let content_type = match ctx.content_types {
            Some(types) if types.contains(&doc.content_type) => 1.0,
            Some(_) => 0.0,
            None => NEUTRAL,
        };
        let project = match (ctx.project_context, doc.project_context.as_deref()) {
            (Some(wanted), Some(actual)) if wanted.eq_ignore_ascii_case(actual) => 1.0,
            (Some(_), Some(_)) => 0.0,
            _ => NEUTRAL,
        };
        let path = path_overlap(ctx, doc);
        let length = length_prior(doc);

        TAG_WEIGHT * tag
            + TYPE_WEIGHT * content_type
            + PROJECT_WEIGHT * project
            + PATH_WEIGHT * path
            + LENGTH_WEIGHT * length
    }
}

fn tag_overlap(ctx: &RerankContext<'_>, doc: &MultiModalDocument) -> f32 {
    if doc.tags.is_empty() {
        return 0.0;
    }
    let matched = doc
        .tags
        .iter()
        .filter(|tag| {
            text::stemmed_tokens(&tag.replace(['_', '-'], " "))
                .iter()
                .any(|t| ctx.query_terms.contains(t))
        })
        .count();
    (matched as f32 / doc.tags.len().min(TAG_SATURATION) as f32).min(1.0)
}

fn path_overlap(ctx: &RerankContext<'_>, doc: &MultiModalDocument) -> f32 {
    let segments = doc.source_path.replace(['/', '\\', '.', '_', '-'], " ");
    let matched = text::stemmed_tokens(&segments)
        .iter()
        .filter(|t| ctx.query_terms.contains(*t))
        .count();
    (matched as f32 / PATH_SATURATION as f32).min(1.0)
}

fn length_prior(doc: &MultiModalDocument) -> f32 {
    let words = doc.content.split_whitespace().count();
    if words == 0 {
        0.0
    } else if words < MIN_IDEAL_WORDS {
        words as f32 / MIN_IDEAL_WORDS as f32
    } else if words > MAX_IDEAL_WORDS {
        MAX_IDEAL_WORDS as f32 / words as f32
    } else {
        1.0
    }
}

impl ReRanker for FeatureBasedReRanker {
    fn name(&self) -> &'static str {
        "feature"
    }

    fn signals(
        &self,
        ctx: &RerankContext<'_>,
        results: &[SearchResult],
    ) -> Result<Vec<f32>, RerankError> {
        Ok(results
            .iter()
            .map(|r| self.score(ctx, &r.document).clamp(0.0, 1.0))
            .collect())
    }
}
