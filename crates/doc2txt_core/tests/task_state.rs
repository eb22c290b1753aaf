use std::path::PathBuf;
use std::time::Duration;

use doc2txt_core::{ConversionOutcome, TaskReport, TaskResult, TaskState};

fn completed() -> TaskResult {
    TaskResult::Completed(TaskReport {
        relative_path: PathBuf::from("a.txt"),
        outcome: ConversionOutcome::Copied { bytes: 1 },
        warnings: Vec::new(),
    })
}

#[test]
fn queued_task_runs_then_completes() {
    let running = TaskState::default().start().unwrap();
    assert_eq!(running, TaskState::Running);
    let done = running.finish(&completed()).unwrap();
    assert_eq!(done, TaskState::Completed);
    assert!(done.is_terminal());
}

#[test]
fn running_task_can_time_out_or_crash() {
    let timed_out = TaskState::Running
        .finish(&TaskResult::TimedOut {
            after: Duration::from_secs(1),
        })
        .unwrap();
    assert_eq!(timed_out, TaskState::TimedOut);

    let crashed = TaskState::Running
        .finish(&TaskResult::CrashedWorker {
            detail: "gone".into(),
        })
        .unwrap();
    assert_eq!(crashed, TaskState::CrashedWorker);
}

#[test]
fn terminal_states_do_not_move() {
    assert_eq!(TaskState::Completed.start(), None);
    assert_eq!(TaskState::TimedOut.finish(&completed()), None);
    assert_eq!(TaskState::Queued.finish(&completed()), None);
}

#[test]
fn unspawnable_worker_crashes_task_from_queue() {
    let state = TaskState::Queued.finish(&TaskResult::CrashedWorker {
        detail: "spawn failed".into(),
    });
    assert_eq!(state, Some(TaskState::CrashedWorker));
}

#[test]
fn outcome_round_trips_through_json() {
    let report = TaskReport {
        relative_path: PathBuf::from("dir/book.epub"),
        outcome: ConversionOutcome::Converted {
            source_bytes: 10,
            text_bytes: 4,
        },
        warnings: Vec::new(),
    };
    let json = serde_json::to_string(&report).unwrap();
    let back: TaskReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}
