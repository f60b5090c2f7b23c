/*!
 * Continuity gate: local repair of asset bundles plus a holistic review.
 *
 * The repair pass rewrites broken fields of each bundle with their fallback.
 * The review pass sends a compact summary (never full content) to the
 * validator collaborator and turns its verdict into point fixes and, when a
 * scene needs redesigning, revision feedback.
 */

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::pipeline::fallback;
use crate::pipeline::records::{AssetBundle, RevisionFeedback, RevisionItem, ScriptRecord};

/// Lower bound of the duration band enforced by timing fixes, in seconds.
pub const MIN_SCENE_DURATION: f64 = 15.0;

/// Upper bound of the duration band enforced by timing fixes, in seconds.
pub const MAX_SCENE_DURATION: f64 = 60.0;

const KEY_THEMES_MAX_CHARS: usize = 100;

/// Rewrite the missing or invalid fields of `bundle` with their fallbacks.
///
/// Returns whether anything changed. The scene id and every other field are
/// left untouched, so repairing twice is the same as repairing once.
pub fn repair_bundle(bundle: &mut AssetBundle, placeholder_image: &str) -> bool {
    let mut changed = false;

    if bundle.image_url.trim().is_empty() {
        bundle.image_url = placeholder_image.to_string();
        changed = true;
    }

    if !fallback::is_valid_animation(&bundle.animation_markup) {
        bundle.animation_markup = fallback::minimal_fade(&bundle.scene_id);
        changed = true;
    }

    changed
}

/// Repair every bundle in place. Returns how many were rewritten.
pub fn repair_all(assets: &mut HashMap<String, AssetBundle>, placeholder_image: &str) -> usize {
    assets
        .values_mut()
        .map(|bundle| repair_bundle(bundle, placeholder_image))
        .filter(|changed| *changed)
        .count()
}

/// Per-chapter entry of the review summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub title: String,
    pub scene_count: usize,
    pub key_themes: String,
}

/// Per-scene entry of the review summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub scene_index: usize,
    pub scene_id: String,
    pub has_image: bool,
    pub has_audio: bool,
    pub has_animation: bool,
    pub complete: bool,
}

/// What the validator collaborator gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuitySummary {
    pub chapters: Vec<ChapterSummary>,
    pub assets: Vec<AssetSummary>,
}

impl ContinuitySummary {
    /// Build the summary in flat scene order. Scenes without a bundle are
    /// reported with every flag cleared.
    pub fn build(scripts: &[ScriptRecord], assets: &HashMap<String, AssetBundle>) -> Self {
        let chapters = scripts
            .iter()
            .map(|script| ChapterSummary {
                title: script.title.clone(),
                scene_count: script.scenes.len(),
                key_themes: script.summary.chars().take(KEY_THEMES_MAX_CHARS).collect(),
            })
            .collect();

        let assets = scripts
            .iter()
            .flat_map(|script| script.scenes.iter())
            .enumerate()
            .map(|(scene_index, scene)| match assets.get(&scene.id) {
                Some(bundle) => AssetSummary {
                    scene_index,
                    scene_id: scene.id.clone(),
                    has_image: !bundle.image_url.is_empty(),
                    has_audio: !bundle.audio_url.is_empty(),
                    has_animation: !bundle.animation_markup.is_empty(),
                    complete: bundle.complete,
                },
                None => AssetSummary {
                    scene_index,
                    scene_id: scene.id.clone(),
                    has_image: false,
                    has_audio: false,
                    has_animation: false,
                    complete: false,
                },
            })
            .collect();

        Self { chapters, assets }
    }
}

/// A single point fix proposed by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityFix {
    #[serde(default)]
    pub scene_index: usize,
    #[serde(default, alias = "type")]
    pub fix_type: String,
    #[serde(default)]
    pub description: String,
}

/// Structured verdict returned by the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuityVerdict {
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub missing_scenes: Vec<String>,
    #[serde(default)]
    pub fixes: Vec<ContinuityFix>,
}

/// Recognized fix kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    /// Append a transition block to the scene's markup
    AddTransition,
    /// Clamp the scene's planned duration into the allowed band. Scenes with
    /// narration audio are displayed for the audio length, so the clamp only
    /// shows for silent scenes.
    FixTiming,
    /// Send the scene back to design
    Redesign,
    /// Anything else; ignored
    Unknown,
}

impl FixKind {
    pub fn parse(fix_type: &str) -> Self {
        match fix_type.trim().to_lowercase().as_str() {
            "add_transition" => Self::AddTransition,
            "fix_timing" => Self::FixTiming,
            "redesign" | "redesign_scene" => Self::Redesign,
            _ => Self::Unknown,
        }
    }
}

/// Result of applying a verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    /// Whether the gate passed
    pub passed: bool,

    /// Corrections for the next design pass, present only when the gate failed
    pub feedback: Option<RevisionFeedback>,

    /// Local fixes applied to bundles
    pub applied_fixes: usize,
}

fn transition_block(scene_id: &str) -> String {
    let ident = fallback::css_ident(scene_id);
    format!(
        "\n@keyframes transition_{ident} {{ 0% {{ opacity: 0; transform: translateX(-20px); }} 100% {{ opacity: 1; transform: translateX(0); }} }}\n\
         .scene-transition {{ animation: transition_{ident} 1s ease-out; }}"
    )
}

/// Apply a verdict to the bundles of the scenes listed in `scene_order`
/// (flat index order).
///
/// Local fixes are applied in place. The gate fails iff at least one redesign
/// fix targets an existing scene; the outcome is a pure function of the
/// verdict and the bundles.
pub fn apply_verdict(
    verdict: &ContinuityVerdict,
    scene_order: &[String],
    assets: &mut HashMap<String, AssetBundle>,
) -> GateOutcome {
    let mut outcome = GateOutcome::default();
    let mut redesigns = Vec::new();

    for fix in &verdict.fixes {
        let Some(scene_id) = scene_order.get(fix.scene_index) else {
            debug!("Ignoring fix for unknown scene index {}", fix.scene_index);
            continue;
        };

        match FixKind::parse(&fix.fix_type) {
            FixKind::AddTransition => {
                if let Some(bundle) = assets.get_mut(scene_id) {
                    if !bundle.animation_markup.contains(".scene-transition") {
                        bundle.animation_markup.push_str(&transition_block(scene_id));
                        outcome.applied_fixes += 1;
                    }
                }
            }
            FixKind::FixTiming => {
                if let Some(bundle) = assets.get_mut(scene_id) {
                    let clamped = bundle.duration.clamp(MIN_SCENE_DURATION, MAX_SCENE_DURATION);
                    if clamped != bundle.duration {
                        bundle.duration = clamped;
                        outcome.applied_fixes += 1;
                    }
                }
            }
            FixKind::Redesign => redesigns.push(RevisionItem {
                scene_index: fix.scene_index,
                kind: fix.fix_type.clone(),
                description: fix.description.clone(),
            }),
            FixKind::Unknown => debug!("Ignoring unrecognized fix kind '{}'", fix.fix_type),
        }
    }

    if !verdict.issues.is_empty() {
        info!("Continuity review raised {} issue(s)", verdict.issues.len());
    }

    outcome.passed = redesigns.is_empty();
    if !outcome.passed {
        outcome.feedback = Some(RevisionFeedback::new(redesigns));
    }
    outcome
}
