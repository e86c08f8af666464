//! End-to-end session behavior over a synthetic clip and a scripted backend.

use pedwatch::detect::ScriptedBackend;
use pedwatch::session::TickOutcome;
use pedwatch::{
    BoundingBox, Detection, ModelHandle, SessionController, SessionState, SyntheticClipSource,
};

fn person(x: f32, y: f32, score: f32) -> Detection {
    Detection::person(BoundingBox::new(x, y, 44.0, 96.0), score)
}

fn vehicle(x: f32) -> Detection {
    Detection {
        bbox: BoundingBox::new(x, 200.0, 120.0, 60.0),
        class: pedwatch::ObjectClass::Vehicle,
        score: 0.95,
    }
}

fn session_over(frames: u64, backend: ScriptedBackend) -> SessionController {
    let source = SyntheticClipSource::new("stub://walkway", 640, 480, 30.0, frames)
        .expect("synthetic clip");
    let mut controller = SessionController::new(Box::new(source), ModelHandle::new(Box::new(backend)));
    controller.load_model(|_| {}).expect("model load");
    controller
}

fn run_to_completion(controller: &mut SessionController) {
    while controller.tick().expect("tick") != TickOutcome::Completed {}
}

/// A subject drifting a few pixels per frame keeps one identity across the
/// whole clip, and a late arrival gets the next number.
#[test]
fn identities_are_stable_under_drift() {
    let mut script = Vec::new();
    for n in 0..8 {
        let t = n as f32;
        let mut frame = vec![person(100.0 + t * 3.0, 120.0, 0.9)];
        if n >= 4 {
            frame.push(person(500.0, 140.0, 0.8));
        }
        script.push(frame);
    }
    let mut controller = session_over(8, ScriptedBackend::new(script));
    controller.start().expect("start");
    run_to_completion(&mut controller);

    let entries = controller.results().entries();
    assert_eq!(entries.len(), 8);
    for entry in entries {
        assert_eq!(entry.detections[0].identity, Some(1));
    }
    assert_eq!(entries[4].detections[1].identity, Some(2));
    assert_eq!(controller.stats().max_count, 2);
}

#[test]
fn non_person_detections_never_reach_the_log() {
    let script = (0..5)
        .map(|n| vec![person(50.0, 100.0, 0.9), vehicle(300.0 + n as f32)])
        .collect();
    let mut controller = session_over(5, ScriptedBackend::new(script));
    controller.start().expect("start");
    run_to_completion(&mut controller);

    for entry in controller.results().entries() {
        assert_eq!(entry.person_count, 1);
        assert!(entry.detections.iter().all(|d| d.detection.is_person()));
    }
}

/// An inference failure mid-clip skips that frame but keeps numbering; the
/// export still carries one line per logged frame plus the header.
#[test]
fn failed_frame_leaves_a_numbering_gap_and_export_matches() {
    let backend = ScriptedBackend::new((0..10).map(|_| vec![person(80.0, 110.0, 0.88)]).collect())
        .with_failures_on([5]);
    let mut controller = session_over(10, backend);
    controller.start().expect("start");
    run_to_completion(&mut controller);

    assert_eq!(controller.results().len(), 9);
    let numbers: Vec<u64> = controller
        .results()
        .entries()
        .iter()
        .map(|r| r.frame_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.csv");
    controller.results().export_to_path(&path).expect("export");
    let text = std::fs::read_to_string(&path).expect("read export");
    assert_eq!(text.lines().count(), 10);
    assert!(text.starts_with("Frame,Timestamp(s),PersonCount,TrackIDs,AvgConfidence\n"));
    assert!(text.lines().nth(1).expect("first row").starts_with("1,"));
    // The skipped frame number never appears.
    assert!(!text.lines().any(|l| l.starts_with("5,")));
}

#[test]
fn pause_and_resume_keep_the_log_contiguous() {
    let mut controller = session_over(6, ScriptedBackend::empty(6));
    controller.start().expect("start");
    controller.tick().expect("tick");
    controller.tick().expect("tick");

    controller.pause();
    assert_eq!(controller.state(), SessionState::Paused);
    for _ in 0..5 {
        assert_eq!(controller.tick().expect("tick"), TickOutcome::Inactive);
    }

    controller.resume();
    run_to_completion(&mut controller);
    let numbers: Vec<u64> = controller
        .results()
        .entries()
        .iter()
        .map(|r| r.frame_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn reset_then_rerun_reproduces_the_first_run() {
    let script = (0..6).map(|n| vec![person(60.0 + n as f32, 90.0, 0.85)]).collect();
    let mut controller = session_over(6, ScriptedBackend::new(script));
    controller.start().expect("start");
    for _ in 0..3 {
        controller.tick().expect("tick");
    }
    controller.reset().expect("reset");
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.results().is_empty());
    assert_eq!(controller.stats().max_count, 0);
    assert_eq!(controller.stats().avg_count, None);

    // The scripted backend keeps consuming calls, so the rerun sees the tail
    // of the script followed by quiet frames. Identity numbering still
    // restarts at 1.
    controller.start().expect("start");
    run_to_completion(&mut controller);
    let first = &controller.results().entries()[0];
    assert_eq!(first.frame_number, 1);
    assert_eq!(first.detections[0].identity, Some(1));
}

#[test]
fn raising_the_threshold_mid_session_filters_later_frames() {
    let script = (0..6).map(|_| vec![person(90.0, 100.0, 0.6)]).collect();
    let mut controller = session_over(6, ScriptedBackend::new(script));
    controller.set_confidence_threshold(0.5);
    controller.start().expect("start");

    for _ in 0..3 {
        controller.tick().expect("tick");
    }
    assert_eq!(controller.stats().current_count, 1);

    controller.set_confidence_threshold(0.9);
    run_to_completion(&mut controller);

    let counts: Vec<usize> = controller.results().count_series(6);
    assert_eq!(counts, vec![1, 1, 1, 0, 0, 0]);
    // Average folds both phases at completion.
    assert_eq!(controller.stats().avg_count, Some(0.5));
}
