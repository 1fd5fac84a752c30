//! Lease behaviour across threads sharing one database file.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{ok_step, TestHarness};
use us_core::{Error, StepStatus};
use us_pipeline::{Executor, NewStep, StepContext};

/// Parks inside `run` until the test releases it.
struct Gate {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl Executor for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn description(&self) -> &str {
        "Wait for the test"
    }

    fn run(&self, _ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        self.entered.wait();
        self.release.wait();
        Ok(())
    }
}

fn gated() -> (TestHarness, Arc<Barrier>, Arc<Barrier>) {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let gate = Gate {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    };
    let harness = TestHarness::with_file_db(move |b| {
        b.register(gate).unwrap();
    });
    (harness, entered, release)
}

#[test]
fn project_is_locked_while_a_step_runs() {
    let (harness, entered, release) = gated();
    let id = harness.create(&[NewStep::bare("gate"), ok_step()]);

    let runner = harness.runner();
    let handle = thread::spawn(move || runner.run_all(id));
    entered.wait();

    let studio = harness.studio();
    let second = harness.runner();
    let attempts = [
        second.run_one(id).map(|_| ()),
        second.run_all(id).map(|_| ()),
        studio.reset(id, 0).map(|_| ()),
        studio.append_step(id, &ok_step()).map(|_| ()),
        studio.remove_step(id, 1).map(|_| ()),
        studio.finish_project(id).map(|_| ()),
        studio.delete_project(id).map(|_| ()),
    ];
    for result in attempts {
        assert!(
            matches!(result, Err(Error::Conflict(ref m)) if m.contains("test-worker")),
            "expected Conflict, got {result:?}"
        );
    }
    assert_eq!(harness.statuses(id), vec![StepStatus::Running, StepStatus::Pending]);

    release.wait();
    let ran = handle.join().unwrap().unwrap();
    assert_eq!(ran.len(), 2);

    let view = harness.view(id);
    assert_eq!(view.status, StepStatus::Complete);
    assert!(view.project.locked_by.is_none());
    assert_eq!(view.steps.len(), 2);
}

#[test]
fn other_projects_run_while_one_is_locked() {
    let (harness, entered, release) = gated();
    let blocked = harness.create(&[NewStep::bare("gate")]);
    let free = harness.create(&[ok_step(), ok_step()]);

    let runner = harness.runner();
    let handle = thread::spawn(move || runner.run_one(blocked));
    entered.wait();

    let ran = harness.runner().run_all(free).unwrap();
    assert_eq!(ran.len(), 2);
    assert_eq!(harness.view(free).status, StepStatus::Complete);

    release.wait();
    let step = handle.join().unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Complete);
}

#[test]
fn recovery_leaves_live_runs_of_other_workers_alone() {
    let (harness, entered, release) = gated();
    let id = harness.create(&[NewStep::bare("gate")]);

    let runner = harness.runner();
    let handle = thread::spawn(move || runner.run_one(id));
    entered.wait();

    // same database, different process identity
    let mut config = harness.app.config.clone();
    config.runner.worker_id = "other-host".into();
    let other = us_pipeline::Studio::new(
        harness.db.clone(),
        Arc::clone(&harness.app.registry),
        harness.studio().layout().clone(),
    )
    .with_runner_config(&config.runner);
    assert!(other.recover_interrupted().unwrap().is_empty());
    assert_eq!(harness.statuses(id), vec![StepStatus::Running]);

    release.wait();
    assert_eq!(handle.join().unwrap().unwrap().status, StepStatus::Complete);
}

#[test]
fn recovery_under_the_same_worker_id_spares_a_live_run() {
    let (harness, entered, release) = gated();
    let id = harness.create(&[NewStep::bare("gate"), ok_step()]);

    let runner = harness.runner();
    let handle = thread::spawn(move || runner.run_all(id));
    entered.wait();

    // a second process reading the same config file
    let twin = us_pipeline::Studio::new(
        harness.db.clone(),
        Arc::clone(&harness.app.registry),
        harness.studio().layout().clone(),
    )
    .with_runner_config(&harness.app.config.runner);

    assert!(twin.recover_interrupted().unwrap().is_empty());
    assert!(harness.studio().recover_interrupted().unwrap().is_empty());
    assert_eq!(harness.app.recover().unwrap(), 0);
    assert_eq!(harness.statuses(id), vec![StepStatus::Running, StepStatus::Pending]);
    assert!(harness.view(id).steps[0].errors.is_empty());

    assert!(matches!(twin.reset(id, 0), Err(Error::Conflict(_))));
    assert!(matches!(twin.delete_project(id), Err(Error::Conflict(_))));
    assert!(matches!(twin.runner().run_one(id), Err(Error::Conflict(_))));

    release.wait();
    let ran = handle.join().unwrap().unwrap();
    assert_eq!(ran.len(), 2);
    assert_eq!(
        harness.statuses(id),
        vec![StepStatus::Complete, StepStatus::Complete]
    );
    assert!(harness.view(id).project.locked_by.is_none());
}
