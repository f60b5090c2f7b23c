/*!
 * The pipeline driven by the LLM agents over a mock provider.
 */

use std::sync::Arc;
use std::time::Duration;

use scenecraft::agents::{AgentModel, AnimationAgent, DirectorAgent, EditorAgent, ScriptAgent};
use scenecraft::errors::PipelineError;
use scenecraft::media::SceneProducer;
use scenecraft::media::image::CommandImageSynthesizer;
use scenecraft::media::speech::CommandSpeechSynthesizer;
use scenecraft::pipeline::fallback::PLACEHOLDER_IMAGE_URL;
use scenecraft::pipeline::stages::Collaborators;
use scenecraft::pipeline::{Pipeline, PipelineStage};
use scenecraft::providers::Provider;
use scenecraft::providers::CompletionRequest;
use scenecraft::providers::mock::MockProvider;
use scenecraft::segmenter::ChapterSegmenter;

use crate::common::{create_temp_dir, init_logging, novel, test_settings};

/// Answers each agent the way a well-behaved model would
fn storyboard_model(request: &CompletionRequest) -> String {
    let system = request.system.clone().unwrap_or_default();
    if system.contains("screenwriter") {
        r#"Here is the script:
```json
{"chapter_title": "The Return", "chapter_summary": "Boats come home",
 "scenes": [
   {"title": "Dusk", "description": "Boats drift into the harbor", "dialogue": "They are back.", "emotion": "peaceful", "setting": "harbor"},
   {"title": "Night", "description": "Lanterns along the pier", "emotion": "mysterious", "setting": "pier", "duration": 20}
 ]}
```"#
            .to_string()
    } else if system.contains("director") {
        r##"<think>keep it calm</think>{"visual_description": "Wide harbor at dusk", "image_prompt": "harbor at dusk, fishing boats, warm light",
 "dialogue_text": "The boats return.", "animation_effects": "slow pan", "camera_angle": "wide shot", "mood": "calm",
 "color_palette": "#1E3A5F, #F4A261", "duration": 25}"##
            .to_string()
    } else if system.contains("editor") {
        r#"{"issues": [], "suggestions": ["Add a transition"], "missing_scenes": [],
 "fixes": [{"scene_index": 0, "type": "add_transition", "description": "fade between scenes"}]}"#
            .to_string()
    } else {
        "@keyframes drift { from { opacity: 0.6; } to { opacity: 1; } }\n.scene-animation { animation: drift 4s ease-in-out infinite alternate; }"
            .to_string()
    }
}

fn agent_collaborators(provider: Arc<dyn Provider>, assets_dir: &std::path::Path) -> Collaborators {
    let model = |name: &str| AgentModel::new(name, 0.7);
    let timeout = Duration::from_secs(5);
    let animator = Arc::new(AnimationAgent::new(provider.clone(), model("animator")));
    let image = Arc::new(CommandImageSynthesizer::new("", assets_dir, timeout));
    let speech = Arc::new(CommandSpeechSynthesizer::new("", "ffmpeg", "ffprobe", assets_dir, timeout));

    Collaborators {
        segmenter: Arc::new(ChapterSegmenter::new()),
        scripter: Arc::new(ScriptAgent::new(provider.clone(), model("script"))),
        designer: Arc::new(DirectorAgent::new(provider.clone(), model("director"))),
        producer: Arc::new(SceneProducer::new(image, speech, animator, PLACEHOLDER_IMAGE_URL)),
        validator: Arc::new(EditorAgent::new(provider, model("editor"))),
    }
}

#[tokio::test]
async fn test_agentPipeline_wellBehavedModel_shouldBuildStoryboard() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let provider = MockProvider::working().with_custom_response(storyboard_model);
    let counter = provider.clone();
    let pipeline = Pipeline::new(agent_collaborators(Arc::new(provider), dir.path()), test_settings(2));

    let summary = pipeline.run(novel(2)).await.unwrap();

    assert_eq!(summary.chapters.len(), 2);
    assert_eq!(summary.chapters[0].title, "The Return");
    assert_eq!(summary.scene_count(), 4);

    let first = &summary.chapters[0].scenes[0];
    assert_eq!(first.title, "Dusk");
    assert_eq!(first.audio_script, "The boats return.");
    // No image or speech command is configured, so those parts degrade.
    assert_eq!(first.image_url, PLACEHOLDER_IMAGE_URL);
    assert_eq!(first.audio_url, "");
    assert!(first.animation_code.contains("@keyframes drift"));
    assert!(first.animation_code.contains(".scene-transition"));

    let second = &summary.chapters[0].scenes[1];
    assert!(!second.animation_code.contains(".scene-transition"));
    assert_eq!(summary.stats.script_fallbacks, 0);
    assert_eq!(summary.stats.design_fallbacks, 0);

    // 2 scripts, 4 designs, 4 animations, 1 review
    assert_eq!(counter.request_count(), 11);
}

#[tokio::test]
async fn test_agentPipeline_garbageReplies_shouldDegradeToFallbacks() {
    let dir = create_temp_dir().unwrap();
    let provider = MockProvider::working().with_custom_response(|_| "I am not sure what you mean.".to_string());
    let pipeline = Pipeline::new(agent_collaborators(Arc::new(provider), dir.path()), test_settings(2));

    let summary = pipeline.run(novel(1)).await.unwrap();

    assert_eq!(summary.chapters.len(), 1);
    assert_eq!(summary.stats.script_fallbacks, 1);
    assert!(summary.scene_count() >= 1);
    assert_eq!(summary.stats.design_fallbacks, summary.scene_count());
    for scene in &summary.chapters[0].scenes {
        assert_eq!(scene.image_url, PLACEHOLDER_IMAGE_URL);
        assert!(scene.animation_code.contains("@keyframes"));
    }
}

#[tokio::test]
async fn test_agentPipeline_unreachableModel_shouldFailAtScripting() {
    let dir = create_temp_dir().unwrap();
    let pipeline = Pipeline::new(
        agent_collaborators(Arc::new(MockProvider::unreachable()), dir.path()),
        test_settings(2),
    );

    let result = pipeline.run(novel(2)).await;

    assert!(matches!(
        result,
        Err(PipelineError::Unreachable { stage: PipelineStage::Scripting, .. })
    ));
}

#[tokio::test]
async fn test_agentPipeline_serverErrors_shouldDegradeNotFail() {
    let dir = create_temp_dir().unwrap();
    let provider = MockProvider::failing();
    let counter = provider.clone();
    let pipeline = Pipeline::new(agent_collaborators(Arc::new(provider), dir.path()), test_settings(2));

    let summary = pipeline.run(novel(2)).await.unwrap();

    assert_eq!(summary.chapters.len(), 2);
    assert_eq!(summary.stats.script_fallbacks, 2);
    assert_eq!(summary.stats.design_fallbacks, summary.scene_count());
    assert!(summary.chapters.iter().all(|c| !c.scenes.is_empty()));
    assert!(counter.request_count() > 0);
}
