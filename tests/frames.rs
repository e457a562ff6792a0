mod support;

use glam::Vec3;
use openxr_placement::config::ClipPlanes;
use openxr_placement::device::Viewport;
use openxr_placement::error::Error;
use openxr_placement::input::Hand;
use openxr_placement::math::{self, Pose};
use openxr_placement::session::{LoopControl, SessionState};
use openxr_placement::session::SessionState::*;
use openxr_placement::{App, Config};

use support::{
    FIRST_DISPLAY_TIME, FakeDevice, FakeRuntime, changed, config, fakes, time, tracked,
};

type TestApp = App<FakeRuntime, FakeDevice>;

fn focused_app(runtime: FakeRuntime, device: FakeDevice) -> TestApp {
    app_in(runtime, device, &[Ready, Synchronized, Visible, Focused], config())
}

fn app_in(
    mut runtime: FakeRuntime,
    device: FakeDevice,
    states: &[SessionState],
    settings: Config,
) -> TestApp {
    runtime.deliver_now(changed(states)).script(vec![vec![]; 8]);
    let mut app = App::new(settings, runtime, device).unwrap();
    assert_eq!(app.pump_events().unwrap(), LoopControl::Continue);
    app
}

#[test]
fn every_eye_gets_its_own_image_viewport_and_matrices() {
    let (journal, runtime, device) = fakes();
    let mut app = focused_app(runtime, device);

    let outcome = app.tick().unwrap();
    assert_eq!(outcome.display_time, time(FIRST_DISPLAY_TIME));
    assert_eq!(outcome.rendered_views, 2);
    assert_eq!(outcome.drawn_cubes, 4);

    let journal = journal.borrow();
    let full = Viewport::full((1000, 800));
    assert_eq!(
        journal.bound_targets,
        [(0, 0, full, [0.0, 0.0, 0.0, 1.0]), (1, 0, full, [0.0, 0.0, 0.0, 1.0])]
    );
    assert_eq!(journal.view_projections.len(), 2);
    assert_ne!(journal.view_projections[0], journal.view_projections[1]);

    // Hands are inactive, so both hand cubes sit at the origin.
    let origin = math::shader_layout(math::model_matrix(&Pose::IDENTITY, 0.05));
    assert!(journal.models.iter().all(|model| *model == origin));

    let calls = &journal.calls;
    let frame = calls
        .iter()
        .skip_while(|c| c.as_str() != "wait_frame")
        .map(String::as_str)
        .collect::<Vec<_>>();
    assert_eq!(
        frame,
        [
            "wait_frame",
            "begin_frame",
            "acquire 0 -> 0",
            "wait 0",
            "release 0",
            "acquire 1 -> 0",
            "wait 1",
            "release 1",
            "end_frame 2",
        ]
    );
}

#[test]
fn targets_follow_the_runtime_image_index() {
    let (journal, mut runtime, device) = fakes();
    runtime.acquire_script.extend([2, 0, 1, 2]);
    let mut app = focused_app(runtime, device);

    app.tick().unwrap();
    app.tick().unwrap();

    let bound = journal
        .borrow()
        .bound_targets
        .iter()
        .map(|(swapchain, index, ..)| (*swapchain, *index))
        .collect::<Vec<_>>();
    assert_eq!(bound, [(0, 2), (1, 0), (0, 1), (1, 2)]);
}

#[test]
fn image_index_beyond_the_chain_is_an_error() {
    let (_journal, mut runtime, device) = fakes();
    runtime.acquire_script.push_back(7);
    let mut app = focused_app(runtime, device);

    match app.tick() {
        Err(Error::ImageIndexOutOfRange { view, index, count }) => {
            assert_eq!((view, index, count), (0, 7, 3));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn more_views_than_swapchains_is_fatal() {
    let (_journal, mut runtime, device) = fakes();
    runtime.views.push(runtime.views[0]);
    let mut app = focused_app(runtime, device);

    match app.tick() {
        Err(Error::ViewCountMismatch { views, swapchains }) => {
            assert_eq!((views, swapchains), (3, 2));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn invisible_sessions_still_pace_frames_with_no_layers() {
    let (journal, runtime, device) = fakes();
    let mut app = app_in(runtime, device, &[Ready, Synchronized], config());

    let first = app.tick().unwrap();
    let second = app.tick().unwrap();
    assert_eq!(first.rendered_views, 0);
    assert_eq!(second.drawn_cubes, 0);
    assert!(second.display_time.as_nanos() > first.display_time.as_nanos());

    let journal = journal.borrow();
    assert_eq!(journal.count("begin_frame"), 2);
    assert_eq!(journal.count("end_frame 0"), 2);
    assert!(journal.first_position("acquire").is_none());
    assert_eq!(journal.count("sync_actions"), 0);
}

#[test]
fn frames_the_runtime_skips_are_submitted_empty() {
    let (journal, mut runtime, device) = fakes();
    runtime.should_render = false;
    let mut app = focused_app(runtime, device);

    assert_eq!(app.tick().unwrap().rendered_views, 0);
    assert_eq!(journal.borrow().count("end_frame 0"), 1);
}

#[test]
fn configured_clip_planes_and_cube_scale_reach_the_matrices() {
    let (journal, runtime, device) = fakes();
    let settings = Config {
        cube_scale: 0.2,
        clip: ClipPlanes {
            near: 0.5,
            far: 10.0,
        },
        ..config()
    };
    let eye = runtime.views[0];
    let mut app = app_in(runtime, device, &[Ready, Visible], settings);

    app.tick().unwrap();

    let journal = journal.borrow();
    let projection = math::projection_matrix(&eye.fov, 0.5, 10.0);
    let expected = math::shader_layout(projection * math::view_matrix(&eye.pose));
    assert_eq!(journal.view_projections[0], expected);
    assert_eq!(
        journal.models[0],
        math::shader_layout(math::model_matrix(&Pose::IDENTITY, 0.2))
    );
}

#[test]
fn hand_cubes_move_while_placed_cubes_stay_put() {
    let (_journal, mut runtime, device) = fakes();
    runtime.pose_active = [true, false];
    runtime.locations[Hand::Left.index()] = tracked(Vec3::new(-0.2, 1.0, -0.3));
    runtime.press(Hand::Left, time(10));
    let mut app = focused_app(runtime, device);

    app.tick().unwrap();
    let placed = app.scene().placed().to_vec();
    assert_eq!(placed.len(), 1);
    assert_eq!(app.scene().hand_cube(Hand::Left), placed[0]);

    let moved = tracked(Vec3::new(0.4, 1.1, -0.6));
    app.runtime_mut().locations[Hand::Left.index()] = moved;
    app.tick().unwrap();

    assert_eq!(app.scene().placed(), placed.as_slice());
    assert_eq!(app.scene().hand_cube(Hand::Left), moved.pose);
    assert_eq!(app.scene().hand_cube(Hand::Right), Pose::IDENTITY);
}

#[test]
fn draw_failures_are_not_reported_as_startup_errors() {
    let (_journal, runtime, mut device) = fakes();
    device.fail_draw = true;
    let mut app = focused_app(runtime, device);

    let err = app.tick().unwrap_err();
    assert!(matches!(err, Error::Draw(_)));
    assert!(!err.is_startup());
}
