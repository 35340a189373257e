//! Tests for the periodic render loop.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use trainwatch::render::{
    RenderError, RenderExit, RenderLoop, RenderStatus, TickOutcome, DEFAULT_VALUE_BOUNDS,
};
use trainwatch::supervisor::{ProgressSample, ProgressStore, Snapshot};
use trainwatch::trainer::StreamReader;

use crate::common::RecordingRenderer;

const TICK: Duration = Duration::from_millis(10);

#[test]
fn tick_autoscales_value_axis_only() {
    let mut render = RenderLoop::new(100, TICK);
    let snapshot = Snapshot {
        samples: vec![ProgressSample::new(1, 2.0), ProgressSample::new(2, 1.0)],
        finished: false,
    };

    assert_eq!(render.tick(&snapshot), TickOutcome::Updated);

    let view = render.view();
    assert_eq!(view.epoch_bounds, [0.0, 101.0]);
    assert!(view.value_bounds[0] < 1.0 && view.value_bounds[1] > 2.0);
    assert_eq!(view.points, vec![(1.0, 2.0), (2.0, 1.0)]);
}

#[test]
fn tick_empty_finished_goes_straight_to_finished() {
    let mut render = RenderLoop::new(100, TICK);
    let snapshot = Snapshot {
        samples: Vec::new(),
        finished: true,
    };

    assert_eq!(render.tick(&snapshot), TickOutcome::Finished);
    assert_eq!(render.status(), RenderStatus::Finished);
    assert!(render.view().points.is_empty());
    assert_eq!(render.view().value_bounds, DEFAULT_VALUE_BOUNDS);
    assert_eq!(render.view().title(), "Loss (MSE) - Finished");
}

#[test]
fn tick_finishing_snapshot_draws_its_samples() {
    let mut render = RenderLoop::new(100, TICK);
    let snapshot = Snapshot {
        samples: vec![ProgressSample::new(0, 0.5), ProgressSample::new(1, 0.25)],
        finished: true,
    };

    assert_eq!(render.tick(&snapshot), TickOutcome::Finished);
    assert_eq!(render.view().points.len(), 2);
}

#[tokio::test]
async fn run_with_empty_finished_store_draws_no_points() {
    let store = ProgressStore::new();
    store.mark_finished();
    let mut renderer = RecordingRenderer::new();
    let mut render = RenderLoop::new(10, TICK);

    let exit = render
        .run(&store, &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(exit, RenderExit::Finished);
    assert!(renderer.frames.iter().all(|f| f.points.is_empty()));
    assert!(renderer.last().is_finished());
}

#[tokio::test]
async fn run_without_completion_polls_until_cancelled() {
    let store = ProgressStore::new();
    store.append(ProgressSample::new(1, 0.3));
    let cancel = CancellationToken::new();
    let mut renderer = RecordingRenderer::new();
    let mut render = RenderLoop::new(10, TICK);

    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        })
    };
    let exit = render.run(&store, &mut renderer, &cancel).await;
    stopper.await.unwrap();

    assert_eq!(exit, RenderExit::Cancelled);
    assert_eq!(render.status(), RenderStatus::Running);
    assert!(render.ticks() > 1);
}

#[tokio::test]
async fn run_follows_a_live_reader() {
    let store = ProgressStore::new();
    let (source, mut writer) = tokio::io::duplex(256);
    let reader = StreamReader::new(store.clone()).spawn(source);

    let feeder = tokio::spawn(async move {
        for epoch in 1..=5 {
            let line = format!("LOSS:{epoch},{}\n", 1.0 / f64::from(epoch));
            writer.write_all(line.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        writer.write_all(b"TRAINING_DONE\n").await.unwrap();
    });

    let mut renderer = RecordingRenderer::new();
    let mut render = RenderLoop::new(5, TICK);
    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        render.run(&store, &mut renderer, &CancellationToken::new()),
    )
    .await
    .expect("render loop never finished");

    feeder.await.unwrap();
    reader.await.unwrap();

    assert_eq!(exit, RenderExit::Finished);
    assert_eq!(renderer.last().points.len(), 5);
    let counts: Vec<usize> = renderer.frames.iter().map(|f| f.points.len()).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn transient_draw_errors_are_not_fatal() {
    let store = ProgressStore::new();
    store.append(ProgressSample::new(1, 0.5));
    store.mark_finished();
    let mut renderer = RecordingRenderer::new();
    renderer.failures.push_back(RenderError::Transient(std::io::Error::new(
        std::io::ErrorKind::Other,
        "resize in progress",
    )));
    let mut render = RenderLoop::new(10, TICK);

    let exit = render
        .run(&store, &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(exit, RenderExit::Finished);
    assert_eq!(render.draw_errors(), 1);
    assert!(renderer.last().is_finished());
}

#[tokio::test]
async fn closed_surface_stops_the_loop() {
    let store = ProgressStore::new();
    let mut renderer = RecordingRenderer::new();
    renderer.failures.push_back(RenderError::SurfaceClosed);
    let mut render = RenderLoop::new(10, TICK);

    let exit = render
        .run(&store, &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(exit, RenderExit::SurfaceLost);
    assert!(renderer.frames.is_empty());
}
