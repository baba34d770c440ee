use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::*;
use crate::config::{SurfaceOptions, WindowOptions};
use crate::platform::fake::{FakeGraphics, FakeWindowBackend, GraphicsCall};
use crate::platform::BackendError;
use crate::surface::Brush;
use crate::types::{Color, Rect, RectF};

#[derive(Default)]
struct Journal {
    setups: Vec<SetupKind>,
    draws: usize,
    destroys: usize,
    deltas: Vec<Duration>,
    draw_errors: usize,
}

struct RecordingHandler {
    journal: Arc<Mutex<Journal>>,
    draw_delay: Option<Duration>,
    fail_setup: bool,
    failing_draws: usize,
    brush: Option<Brush<FakeGraphics>>,
}

impl RecordingHandler {
    fn new() -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let handler = Self {
            journal: journal.clone(),
            draw_delay: None,
            fail_setup: false,
            failing_draws: 0,
            brush: None,
        };
        (handler, journal)
    }
}

impl FrameHandler<FakeGraphics> for RecordingHandler {
    fn setup(&mut self, surface: &mut RenderSurface<FakeGraphics>, kind: SetupKind) -> OverlayResult<()> {
        self.journal.lock().setups.push(kind);
        if self.fail_setup {
            return Err(OverlayError::Other("setup refused".to_string()));
        }
        self.brush = Some(surface.create_brush(Color::WHITE)?);
        Ok(())
    }

    fn draw(&mut self, surface: &mut RenderSurface<FakeGraphics>, frame: &FrameInfo) -> OverlayResult<()> {
        {
            let mut journal = self.journal.lock();
            journal.draws += 1;
            if frame.index > 0 {
                journal.deltas.push(frame.delta);
            }
        }
        if let Some(delay) = self.draw_delay {
            thread::sleep(delay);
        }
        if self.failing_draws > 0 {
            self.failing_draws -= 1;
            self.journal.lock().draw_errors += 1;
            return Err(OverlayError::Other("bad frame".to_string()));
        }

        let painted = surface.clear(Color::TRANSPARENT).and_then(|_| match &self.brush {
            Some(brush) => surface.fill_rectangle(RectF::from_xywh(0.0, 0.0, 10.0, 10.0), brush),
            None => Ok(()),
        });
        if painted.is_err() {
            self.journal.lock().draw_errors += 1;
        }
        painted
    }

    fn destroy(&mut self, _surface: &mut RenderSurface<FakeGraphics>) {
        self.journal.lock().destroys += 1;
        self.brush = None;
    }
}

struct Rig {
    backend: Arc<FakeWindowBackend>,
    window: Arc<WindowController>,
    graphics: FakeGraphics,
}

fn rig() -> Rig {
    let backend = Arc::new(FakeWindowBackend::new());
    let window = Arc::new(WindowController::new(
        backend.clone(),
        WindowOptions::with_bounds(Rect::from_xywh(0, 0, 800, 600)),
    ));
    Rig {
        backend,
        window,
        graphics: FakeGraphics::new(),
    }
}

fn pump_options(frame_rate: u32) -> PumpOptions {
    PumpOptions {
        frame_rate,
        surface: SurfaceOptions::default(),
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ----------------------------------------------------------------------------
// Timing helpers
// ----------------------------------------------------------------------------

#[test]
fn interval_follows_rate() {
    assert_eq!(frame_interval(0), None);
    assert_eq!(frame_interval(100), Some(Duration::from_millis(10)));
    assert_eq!(frame_interval(1000), Some(Duration::from_millis(1)));
}

#[test]
fn sleep_covers_remaining_interval() {
    let interval = frame_interval(50);
    assert_eq!(
        remaining_sleep(interval, Duration::from_millis(5)),
        Some(Duration::from_millis(15))
    );
}

#[test]
fn slow_frame_never_sleeps() {
    let interval = frame_interval(100);
    assert_eq!(remaining_sleep(interval, Duration::from_millis(20)), None);
    assert_eq!(remaining_sleep(interval, Duration::from_millis(10)), None);
    assert_eq!(remaining_sleep(None, Duration::ZERO), None);
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn start_creates_window_and_sets_up_once() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(120), handler);

    assert!(!rig.window.is_initialized());
    pump.start().unwrap();
    assert!(pump.is_running());
    assert!(rig.window.is_initialized());
    assert_eq!(journal.lock().setups, vec![SetupKind::Initial]);

    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws >= 3));
    pump.stop().unwrap();

    assert!(!pump.is_running());
    assert_eq!(journal.lock().destroys, 1);
    assert_eq!(rig.graphics.live_targets(), 0);
    let handle = rig.window.handle().unwrap();
    assert_eq!(rig.graphics.created_targets()[0].handle, handle);
    assert_eq!(rig.graphics.created_targets()[0].size, Size::new(800, 600));
}

#[test]
fn start_while_running_is_rejected() {
    let rig = rig();
    let (handler, _journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(60), handler);

    pump.start().unwrap();
    assert!(matches!(pump.start(), Err(OverlayError::AlreadyRunning)));
    pump.stop().unwrap();
}

#[test]
fn stop_without_start_is_misuse() {
    let rig = rig();
    let (handler, _journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(60), handler);
    assert!(matches!(pump.stop(), Err(OverlayError::NotRunning)));
}

#[test]
fn setup_failure_is_returned_by_start() {
    let rig = rig();
    let (mut handler, journal) = RecordingHandler::new();
    handler.fail_setup = true;
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(60), handler);

    assert!(matches!(pump.start(), Err(OverlayError::Other(_))));
    assert!(!pump.is_running());
    assert_eq!(journal.lock().draws, 0);

    // Handler is back in the pump and can be fixed up for another attempt
    pump.with_handler(|h| h.fail_setup = false).unwrap();
    pump.start().unwrap();
    pump.stop().unwrap();
    assert_eq!(journal.lock().destroys, 1);
}

#[test]
fn window_creation_failure_is_returned_by_start() {
    let rig = rig();
    rig.backend.fail_next_create("no desktop");
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(60), handler);

    assert!(matches!(pump.start(), Err(OverlayError::WindowCreation(_))));
    assert!(journal.lock().setups.is_empty());
    assert!(pump.with_handler(|_| ()).is_some());
}

#[test]
fn stop_async_then_restart() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(120), handler);

    pump.start().unwrap();
    pump.stop_async();
    assert!(!pump.is_running());

    pump.start().unwrap();
    pump.stop().unwrap();

    let journal = journal.lock();
    assert_eq!(journal.setups, vec![SetupKind::Initial, SetupKind::Initial]);
    assert_eq!(journal.destroys, 2);
}

// ----------------------------------------------------------------------------
// Pausing
// ----------------------------------------------------------------------------

#[test]
fn hidden_window_auto_pauses() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws >= 2));

    rig.window.hide().unwrap();
    assert!(pump.is_hidden());
    assert!(pump.is_paused());
    thread::sleep(Duration::from_millis(50));
    let frozen = journal.lock().draws;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(journal.lock().draws, frozen);

    rig.window.show().unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > frozen));
    pump.stop().unwrap();
}

#[test]
fn explicit_pause_composes_with_auto_pause() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    pump.pause();
    rig.window.hide().unwrap();
    rig.window.show().unwrap();
    assert!(pump.is_paused());

    thread::sleep(Duration::from_millis(50));
    let frozen = journal.lock().draws;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(journal.lock().draws, frozen);

    pump.unpause();
    assert!(!pump.is_paused());
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > frozen));
    pump.stop().unwrap();
}

#[test]
fn window_starting_hidden_is_paused() {
    let rig = rig();
    rig.window.set_options(WindowOptions {
        visible: false,
        ..rig.window.options()
    });
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    thread::sleep(Duration::from_millis(80));
    assert_eq!(journal.lock().draws, 0);
    pump.stop().unwrap();
}

// ----------------------------------------------------------------------------
// Window events and device loss
// ----------------------------------------------------------------------------

#[test]
fn window_resize_reaches_surface() {
    let rig = rig();
    let (handler, _journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    rig.window.resize(320, 240).unwrap();
    let graphics = rig.graphics.clone();
    assert!(wait_until(Duration::from_secs(2), || {
        graphics.count_calls(|c| matches!(c, GraphicsCall::ResizeTarget(_, s) if *s == Size::new(320, 240))) == 1
    }));
    pump.stop().unwrap();
}

#[test]
fn device_loss_on_resize_reruns_setup_before_drawing() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > 0));

    rig.graphics.fail_next_resize(BackendError::DeviceLost);
    rig.window.resize(400, 300).unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().setups.len() == 2));
    let draws = journal.lock().draws;
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > draws + 2));

    pump.stop().unwrap();
    let journal = journal.lock();
    assert_eq!(journal.setups, vec![SetupKind::Initial, SetupKind::Recreated]);
    assert_eq!(journal.draw_errors, 0);
    assert_eq!(rig.graphics.created_targets().last().unwrap().size, Size::new(400, 300));
}

#[test]
fn failed_resize_is_retried_without_stopping() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > 0));

    rig.graphics.fail_next_resize(BackendError::failed("busy"));
    rig.window.resize(400, 300).unwrap();
    let graphics = rig.graphics.clone();
    assert!(wait_until(Duration::from_secs(2), || {
        graphics.count_calls(|c| matches!(c, GraphicsCall::ResizeTarget(_, s) if *s == Size::new(400, 300))) == 2
    }));
    let draws = journal.lock().draws;
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > draws + 2));

    assert!(pump.is_running());
    pump.stop().unwrap();
    assert_eq!(journal.lock().setups, vec![SetupKind::Initial]);
    assert_eq!(rig.graphics.created_targets().len(), 1);
}

#[test]
fn window_recreation_rebinds_and_reruns_setup() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    let new_handle = rig.window.recreate().unwrap();
    assert!(wait_until(Duration::from_secs(2), || journal.lock().setups.len() == 2));

    assert_eq!(journal.lock().setups[1], SetupKind::Recreated);
    assert_eq!(rig.graphics.created_targets().last().unwrap().handle, new_handle);

    let draws = journal.lock().draws;
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > draws + 2));
    pump.stop().unwrap();
    assert_eq!(journal.lock().draw_errors, 0);
}

#[test]
fn device_loss_reruns_setup_and_keeps_drawing() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    rig.graphics.fail_next_present(BackendError::DeviceLost);
    assert!(wait_until(Duration::from_secs(2), || journal.lock().setups.len() == 2));
    let draws = journal.lock().draws;
    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws > draws + 2));

    pump.stop().unwrap();
    assert_eq!(journal.lock().setups, vec![SetupKind::Initial, SetupKind::Recreated]);
}

#[test]
fn failed_device_recreation_stops_pump() {
    let rig = rig();
    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    rig.graphics.fail_target_creations(1);
    rig.graphics.fail_next_present(BackendError::DeviceLost);
    assert!(wait_until(Duration::from_secs(2), || !pump.is_running()));

    assert!(matches!(pump.stop(), Err(OverlayError::DeviceRecreation(_))));
    assert_eq!(journal.lock().destroys, 1);
}

#[test]
fn draw_errors_do_not_stop_the_loop() {
    let rig = rig();
    let (mut handler, journal) = RecordingHandler::new();
    handler.failing_draws = 3;
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(200), handler);
    pump.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || journal.lock().draws >= 6));
    pump.stop().unwrap();
    assert_eq!(journal.lock().draw_errors, 3);
}

#[test]
fn slow_handler_sets_the_pace() {
    let rig = rig();
    let (mut handler, journal) = RecordingHandler::new();
    handler.draw_delay = Some(Duration::from_millis(20));
    // 10 ms interval, shorter than the 20 ms callback
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(100), handler);
    pump.start().unwrap();

    assert!(wait_until(Duration::from_secs(3), || journal.lock().deltas.len() >= 5));
    pump.stop().unwrap();

    let journal = journal.lock();
    for delta in &journal.deltas {
        assert!(*delta >= Duration::from_millis(20), "frame interval {:?}", delta);
    }
}

#[test]
fn frame_rate_changes_at_runtime() {
    let rig = rig();
    let (handler, _journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(60), handler);

    assert_eq!(pump.frame_rate(), 60);
    pump.set_frame_rate(5000);
    assert_eq!(pump.frame_rate(), MAX_FRAME_RATE);
    pump.set_frame_rate(0);
    assert_eq!(pump.frame_rate(), 0);
}

// ----------------------------------------------------------------------------
// End to end
// ----------------------------------------------------------------------------

#[test]
fn thirty_fps_for_one_second() {
    let rig = rig();
    rig.window.create().unwrap();
    assert!(rig.window.is_initialized());
    assert_eq!(rig.window.bounds(), Rect::from_xywh(0, 0, 800, 600));

    let (handler, journal) = RecordingHandler::new();
    let pump = FramePump::new(rig.window.clone(), rig.graphics.clone(), pump_options(30), handler);
    pump.start().unwrap();
    thread::sleep(Duration::from_millis(1000));
    pump.stop().unwrap();

    {
        let journal = journal.lock();
        assert_eq!(journal.setups, vec![SetupKind::Initial]);
        assert_eq!(journal.destroys, 1);
        assert_eq!(journal.draw_errors, 0);
        // Capped near 30; generous lower bound for loaded machines
        assert!(journal.draws >= 10 && journal.draws <= 32, "drew {} frames", journal.draws);
    }
    assert_eq!(pump.frames_drawn() as usize, journal.lock().draws);

    rig.window.destroy().unwrap();
    assert_eq!(rig.backend.live_windows(), 0);
}
