/*!
 * End-to-end runs of the pipeline with scripted collaborators.
 */

use std::time::Duration;

use scenecraft::errors::PipelineError;
use scenecraft::pipeline::fallback::PLACEHOLDER_IMAGE_URL;
use scenecraft::pipeline::{Pipeline, PipelineSettings, PipelineStage};

use crate::common::{
    FailingSegmenter, Scripted, ScriptedDesigner, ScriptedProducer, ScriptedScripter, ScriptedValidator,
    collect_events, init_logging, novel, redesign_verdict, scene_id, test_settings,
};

#[tokio::test]
async fn test_pipeline_oneChapterThreeScenes_shouldFinalizeInOrder() {
    init_logging();
    let scripted = Scripted::new(3);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(1));
    let events = collect_events(handle.events()).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.chapters.len(), 1);
    let ids: Vec<&str> = summary.chapters[0].scenes.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["ch0_sc0", "ch0_sc1", "ch0_sc2"]);
    let positions: Vec<usize> = summary.chapters[0].scenes.iter().map(|s| s.scene_index).collect();
    assert_eq!(positions, vec![0, 1, 2]);

    let terminal: Vec<_> = events.iter().filter(|e| e.terminal).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].stage, PipelineStage::Finalized);
    assert_eq!(terminal[0].percent, 100.0);
    assert!(terminal[0].is_success());

    assert_eq!(summary.stats.script_fallbacks, 0);
    assert_eq!(summary.stats.design_fallbacks, 0);
    assert_eq!(summary.stats.asset_fallbacks, 0);
    assert_eq!(summary.stats.revision_passes, 0);
    assert_eq!(scripted.validator.call_count(), 1);
}

#[tokio::test]
async fn test_pipeline_finalScene_shouldCarryNarrationAndAudioDuration() {
    let scripted = Scripted::new(1);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(1)).await.unwrap();
    let scene = &summary.chapters[0].scenes[0];

    assert_eq!(scene.audio_script, "Line 1 of chapter 1");
    assert_eq!(scene.duration, 21.5);
    assert_eq!(scene.image_url, "/assets/images/ch0_sc0.png");
    assert!(scene.animation_code.contains("@keyframes"));
}

#[tokio::test]
async fn test_pipeline_assetFailure_shouldUseFallbackBundle() {
    init_logging();
    let failing = scene_id(0, 1);
    let scripted = Scripted::new(3).with_producer(ScriptedProducer::failing(&[failing.as_str()]));
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(1)).await.unwrap();
    let scenes = &summary.chapters[0].scenes;

    assert_eq!(scenes.len(), 3);
    assert_eq!(scenes[1].image_url, PLACEHOLDER_IMAGE_URL);
    assert_eq!(scenes[1].audio_url, "");
    assert!(scenes[1].animation_code.contains("@keyframes"));
    assert_eq!(scenes[0].image_url, "/assets/images/ch0_sc0.png");
    assert_eq!(scenes[2].image_url, "/assets/images/ch0_sc2.png");
    assert_eq!(summary.stats.asset_fallbacks, 1);
}

#[tokio::test]
async fn test_pipeline_scriptFailure_shouldUseFallbackScript() {
    let mut scripter = ScriptedScripter::new(2);
    scripter.failing_chapters.insert(1);
    let scripted = Scripted::new(2).with_scripter(scripter);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(2)).await.unwrap();

    assert_eq!(summary.chapters.len(), 2);
    assert_eq!(summary.chapters[0].scenes.len(), 2);
    assert!(!summary.chapters[1].scenes.is_empty());
    assert_eq!(summary.chapters[1].title, "Chapter 2");
    assert_eq!(summary.stats.script_fallbacks, 1);

    let mut ids: Vec<&str> = summary
        .chapters
        .iter()
        .flat_map(|c| c.scenes.iter().map(|s| s.id.as_str()))
        .collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
}

#[tokio::test]
async fn test_pipeline_gateFailsTwiceThenPasses_shouldRedesignTwice() {
    init_logging();
    let validator = ScriptedValidator::sequence(vec![redesign_verdict(&[1]), redesign_verdict(&[1])]);
    let scripted = Scripted::new(3).with_validator(validator);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(1));
    let events = collect_events(handle.events()).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(scripted.validator.call_count(), 3);
    assert_eq!(summary.stats.revision_passes, 2);
    assert!(!summary.stats.accepted_best_effort);

    let calls = scripted.designer.calls();
    assert_eq!(calls.len(), 5);
    let redesigns: Vec<_> = calls.iter().filter(|c| c.feedback.is_some()).collect();
    assert_eq!(redesigns.len(), 2);
    for call in redesigns {
        assert_eq!(call.scene_id, "ch0_sc1");
        let feedback = call.feedback.as_ref().unwrap();
        assert_eq!(feedback.target_indices(), vec![1]);
    }

    assert_eq!(scripted.producer.calls_for("ch0_sc1"), 3);
    assert_eq!(scripted.producer.calls_for("ch0_sc0"), 1);
    assert_eq!(scripted.producer.calls_for("ch0_sc2"), 1);

    // The accepted bundle of the redesigned scene comes from the last design pass.
    let scenes = &summary.chapters[0].scenes;
    assert!(scenes[1].animation_code.contains("pan_ch0_sc1_2"));
    assert!(!scenes[1].animation_code.contains("pan_ch0_sc1_1"));
    assert!(scenes[0].animation_code.contains("pan_ch0_sc0_0"));
    assert!(scenes[2].animation_code.contains("pan_ch0_sc2_0"));

    let rewinds: Vec<_> = events
        .iter()
        .filter(|e| e.message.starts_with("Continuity check failed"))
        .collect();
    assert_eq!(rewinds.len(), 2);
    assert!(rewinds.iter().all(|e| e.label() == "redesigning"));
    assert_eq!(rewinds[0].revision, Some(1));
    assert_eq!(rewinds[1].revision, Some(2));
}

#[tokio::test]
async fn test_pipeline_gateAlwaysFails_shouldStopAtBoundAndFinalize() {
    let scripted = Scripted::new(2).with_validator(ScriptedValidator::always(redesign_verdict(&[0])));
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(1));
    let events = collect_events(handle.events()).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(scripted.validator.call_count(), 3);
    assert_eq!(summary.stats.revision_passes, 2);
    assert!(summary.stats.accepted_best_effort);
    assert_eq!(summary.scene_count(), 2);
    assert!(events.last().unwrap().is_success());
}

#[tokio::test]
async fn test_pipeline_zeroRevisions_shouldAcceptFirstVerdict() {
    let scripted = Scripted::new(2).with_validator(ScriptedValidator::always(redesign_verdict(&[0])));
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(0));

    let summary = pipeline.run(novel(1)).await.unwrap();

    assert_eq!(scripted.validator.call_count(), 1);
    assert_eq!(summary.stats.revision_passes, 0);
    assert!(summary.stats.accepted_best_effort);
    assert_eq!(scripted.designer.calls().len(), 2);
}

#[tokio::test]
async fn test_pipeline_designerDropsDuringRedesign_shouldKeepPreviousDesign() {
    init_logging();
    let designer = ScriptedDesigner {
        unreachable_after: Some(3),
        ..ScriptedDesigner::default()
    };
    let scripted = Scripted::new(3)
        .with_designer(designer)
        .with_validator(ScriptedValidator::sequence(vec![redesign_verdict(&[1])]));
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(1)).await.unwrap();

    assert_eq!(summary.scene_count(), 3);
    assert_eq!(summary.stats.revision_passes, 1);
    assert_eq!(summary.stats.kept_designs, 1);
    assert_eq!(summary.stats.design_fallbacks, 0);
    assert_eq!(scripted.designer.calls().len(), 4);
    assert_eq!(scripted.validator.call_count(), 2);

    // The scene keeps its first design and the bundle made from it.
    assert_eq!(scripted.producer.calls_for("ch0_sc1"), 1);
    let scene = &summary.chapters[0].scenes[1];
    assert_eq!(scene.image_url, "/assets/images/ch0_sc1.png");
    assert!(scene.animation_code.contains("pan_ch0_sc1_0"));
}

#[tokio::test]
async fn test_pipeline_slowDesigner_shouldTimeOutToFallbacks() {
    let designer = ScriptedDesigner {
        delay: Some(Duration::from_secs(10)),
        ..ScriptedDesigner::default()
    };
    let scripted = Scripted::new(2).with_designer(designer);
    let settings = PipelineSettings {
        item_timeout: Duration::from_millis(200),
        ..test_settings(2)
    };
    let pipeline = Pipeline::new(scripted.collaborators(), settings);

    let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run(novel(1)))
        .await
        .expect("timed-out items should not stall the run")
        .unwrap();

    assert_eq!(summary.scene_count(), 2);
    assert_eq!(summary.stats.design_fallbacks, 2);
    for scene in &summary.chapters[0].scenes {
        assert!(scene.animation_code.contains("@keyframes"));
        assert!(!scene.animation_code.contains("pan_"));
    }
}

#[tokio::test]
async fn test_pipeline_validatorError_shouldBeContained() {
    let validator = ScriptedValidator {
        failing: true,
        ..ScriptedValidator::default()
    };
    let scripted = Scripted::new(2).with_validator(validator);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(1)).await.unwrap();

    assert_eq!(scripted.validator.call_count(), 1);
    assert_eq!(summary.stats.revision_passes, 0);
    assert_eq!(summary.scene_count(), 2);
}

#[tokio::test]
async fn test_pipeline_segmenterFailure_shouldFailWithoutData() {
    init_logging();
    let scripted = Scripted::new(3).with_segmenter(FailingSegmenter);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(1));
    let events = collect_events(handle.events()).await;
    let result = handle.wait().await;

    assert!(matches!(result, Err(PipelineError::Segmentation(_))));
    let terminal: Vec<_> = events.iter().filter(|e| e.terminal).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].stage, PipelineStage::Failed);
    assert!(terminal[0].message.contains("segmenting"));
    assert!(!terminal[0].is_success());

    assert_eq!(scripted.scripter.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(scripted.designer.calls().is_empty());
}

#[tokio::test]
async fn test_pipeline_blankSource_shouldFailSegmentation() {
    let scripted = Scripted::new(3);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let result = pipeline.run(scenecraft::SourceText::new("blank.txt", "  \n\n ")).await;
    assert!(matches!(result, Err(PipelineError::Segmentation(_))));
}

#[tokio::test]
async fn test_pipeline_progress_shouldOnlyGoBackOnRewind() {
    let validator = ScriptedValidator::sequence(vec![redesign_verdict(&[0, 2])]);
    let scripted = Scripted::new(3).with_validator(validator);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(2));
    let events = collect_events(handle.events()).await;
    handle.wait().await.unwrap();

    for pair in events.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if next.percent < previous.percent {
            assert_eq!(next.label(), "redesigning", "unexpected drop at '{}'", next.message);
            assert!(next.message.starts_with("Continuity check failed"));
            assert_eq!(next.percent, PipelineStage::Designing.progress_range().0);
        }
    }
    assert!(events.iter().all(|e| (0.0..=100.0).contains(&e.percent)));
    assert!(events.iter().any(|e| e.message.contains("redesigning 2 scene(s)")));
}

#[tokio::test]
async fn test_pipeline_cancel_shouldFailWithCancellation() {
    init_logging();
    let designer = ScriptedDesigner {
        delay: Some(Duration::from_secs(10)),
        ..ScriptedDesigner::default()
    };
    let scripted = Scripted::new(2).with_designer(designer);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut handle = pipeline.submit(novel(1));
    let mut events = handle.events();
    loop {
        let event = events.recv().await.unwrap();
        if event.stage == PipelineStage::Designing {
            break;
        }
    }
    handle.cancel();

    let result = tokio::time::timeout(Duration::from_secs(3), handle.wait())
        .await
        .expect("cancellation should end the run promptly");

    assert!(matches!(result, Err(PipelineError::Cancelled(PipelineStage::Designing))));
    let terminal = collect_events(events).await;
    let last = terminal.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.stage, PipelineStage::Failed);
}

#[tokio::test]
async fn test_pipeline_scripterUnreachable_shouldFailRun() {
    let scripter = ScriptedScripter {
        unreachable: true,
        ..ScriptedScripter::new(2)
    };
    let scripted = Scripted::new(2).with_scripter(scripter);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let result = pipeline.run(novel(2)).await;

    match result {
        Err(PipelineError::Unreachable { stage, .. }) => assert_eq!(stage, PipelineStage::Scripting),
        other => panic!("expected an unreachable failure, got {:?}", other.map(|s| s.scene_count())),
    }
    assert!(scripted.designer.calls().is_empty());
}

#[tokio::test]
async fn test_pipeline_designerUnreachable_shouldFailRun() {
    let designer = ScriptedDesigner {
        unreachable: true,
        ..ScriptedDesigner::default()
    };
    let scripted = Scripted::new(2).with_designer(designer);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let result = pipeline.run(novel(1)).await;

    assert!(matches!(
        result,
        Err(PipelineError::Unreachable { stage: PipelineStage::Designing, .. })
    ));
    assert!(scripted.producer.calls.lock().is_empty());
}

#[tokio::test]
async fn test_pipeline_concurrentRuns_shouldNotShareState() {
    let scripted = Scripted::new(2);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let mut first = pipeline.submit(novel(1));
    let mut second = pipeline.submit(novel(3));
    assert_ne!(first.id(), second.id());

    let first_id = first.id().to_string();
    let second_id = second.id().to_string();
    let (first_events, second_events) = tokio::join!(collect_events(first.events()), collect_events(second.events()));
    let (first_summary, second_summary) = tokio::join!(first.wait(), second.wait());

    assert!(first_events.iter().all(|e| e.run_id == first_id));
    assert!(second_events.iter().all(|e| e.run_id == second_id));
    assert_eq!(first_summary.unwrap().chapters.len(), 1);
    assert_eq!(second_summary.unwrap().chapters.len(), 3);
}

#[tokio::test]
async fn test_runHandle_lateSubscriber_shouldSeeTerminalEvent() {
    let scripted = Scripted::new(1);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let handle = pipeline.submit(novel(1));
    let events = collect_events(handle.subscribe()).await;

    assert!(events.last().unwrap().is_success());
    let latest = handle.latest().unwrap();
    assert!(latest.terminal);
    assert_eq!(latest.run_id, handle.id());

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.scene_count(), 1);
}
