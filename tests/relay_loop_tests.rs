// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the relay loop state machine
//!
//! The relay worker is driven against scripted source/sink mocks so every
//! device behavior (open failures, read failures, consumer churn, send
//! faults) can be exercised deterministically without hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use vcm::ActivationState;
use vcm::backends::camera::FrameSource;
use vcm::backends::camera::types::{Frame, Framerate};
use vcm::backends::virtual_camera::FrameSink;
use vcm::errors::{RelayError, RelayResult};
use vcm::relay::{RelayConfig, RelayManager};

const W: u32 = 4;
const H: u32 = 4;

fn test_config(fps: u32) -> RelayConfig {
    RelayConfig {
        device_index: 0,
        width: W,
        height: H,
        framerate: Framerate::from_int(fps),
        loopback_path: None,
    }
}

/// Solid non-black frame; survives normalization as the same solid color
fn real_frame() -> Frame {
    Frame::from_rgb(W, H, vec![200, 40, 40].repeat((W * H) as usize)).unwrap()
}

/// Poll until `cond` holds or the timeout elapses
fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Shared observation log for a scripted capture source
#[derive(Clone, Default)]
struct SourceLog {
    opens: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
}

impl SourceLog {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Capture source following a script of open/read outcomes.
/// An exhausted script means "succeed".
struct ScriptedSource {
    log: SourceLog,
    open_outcomes: Mutex<Vec<bool>>,
    read_outcomes: Mutex<Vec<bool>>,
}

impl ScriptedSource {
    fn new(log: SourceLog, open_outcomes: Vec<bool>, read_outcomes: Vec<bool>) -> Self {
        Self {
            log,
            open_outcomes: Mutex::new(open_outcomes),
            read_outcomes: Mutex::new(read_outcomes),
        }
    }

    fn next_outcome(script: &Mutex<Vec<bool>>) -> bool {
        let mut outcomes = script.lock().unwrap();
        if outcomes.is_empty() {
            true
        } else {
            outcomes.remove(0)
        }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> RelayResult<()> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        if Self::next_outcome(&self.open_outcomes) {
            self.log.open.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(RelayError::DeviceUnavailable("scripted failure".into()))
        }
    }

    fn is_open(&self) -> bool {
        self.log.is_open()
    }

    fn read(&mut self) -> RelayResult<Frame> {
        self.log.reads.fetch_add(1, Ordering::SeqCst);
        if !self.log.is_open() {
            return Err(RelayError::ReadFailed("not open".into()));
        }
        if Self::next_outcome(&self.read_outcomes) {
            Ok(real_frame())
        } else {
            Err(RelayError::ReadFailed("scripted failure".into()))
        }
    }

    fn release(&mut self) {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        self.log.open.store(false, Ordering::SeqCst);
    }
}

/// Shared observation log for a mock sink
#[derive(Clone, Default)]
struct SinkLog {
    /// One entry per delivered frame: true = real video, false = placeholder
    sent: Arc<Mutex<Vec<bool>>>,
    connected: Arc<AtomicBool>,
}

impl SinkLog {
    fn sent(&self) -> Vec<bool> {
        self.sent.lock().unwrap().clone()
    }
    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

struct MockSink {
    log: SinkLog,
    fail_init: bool,
    /// Number of upcoming send calls that should fault
    send_faults: AtomicUsize,
}

impl MockSink {
    fn new(log: SinkLog) -> Self {
        Self {
            log,
            fail_init: false,
            send_faults: AtomicUsize::new(0),
        }
    }

    fn failing_init(log: SinkLog) -> Self {
        Self {
            log,
            fail_init: true,
            send_faults: AtomicUsize::new(0),
        }
    }

    fn with_send_faults(log: SinkLog, faults: usize) -> Self {
        Self {
            log,
            fail_init: false,
            send_faults: AtomicUsize::new(faults),
        }
    }
}

impl FrameSink for MockSink {
    fn initialize(&mut self) -> RelayResult<()> {
        if self.fail_init {
            Err(RelayError::FatalInit("scripted failure".into()))
        } else {
            Ok(())
        }
    }

    fn is_connected(&mut self) -> bool {
        self.log.connected.load(Ordering::SeqCst)
    }

    fn wait_for_connection(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.is_connected()
    }

    fn send_frame(&mut self, frame: &Frame) -> RelayResult<()> {
        // The loop must normalize before sending; geometry is a contract
        assert!(
            frame.matches_size(W, H),
            "sink received unnormalized {}x{} frame",
            frame.width,
            frame.height
        );

        let faults = self.send_faults.load(Ordering::SeqCst);
        if faults > 0 {
            self.send_faults.store(faults - 1, Ordering::SeqCst);
            return Err(RelayError::SendFault("scripted failure".into()));
        }

        let is_real = frame.data.iter().any(|&b| b != 0);
        self.log.sent.lock().unwrap().push(is_real);
        Ok(())
    }

    fn close(&mut self) {}
}

struct Harness {
    relay: RelayManager,
    state: ActivationState,
    source_log: SourceLog,
    sink_log: SinkLog,
}

fn start_harness(fps: u32, feature_enabled: bool, connected: bool) -> Harness {
    start_harness_with(fps, feature_enabled, connected, Vec::new(), Vec::new(), 0)
}

fn start_harness_with(
    fps: u32,
    feature_enabled: bool,
    connected: bool,
    open_outcomes: Vec<bool>,
    read_outcomes: Vec<bool>,
    send_faults: usize,
) -> Harness {
    let source_log = SourceLog::default();
    let sink_log = SinkLog::default();
    sink_log.set_connected(connected);

    let state = ActivationState::new(feature_enabled);
    let mut relay = RelayManager::new(test_config(fps), state.clone());
    relay.start_with_devices(
        Box::new(ScriptedSource::new(
            source_log.clone(),
            open_outcomes,
            read_outcomes,
        )),
        Box::new(MockSink::with_send_faults(sink_log.clone(), send_faults)),
    );

    Harness {
        relay,
        state,
        source_log,
        sink_log,
    }
}

// Feature disabled, consumer connected: placeholders flow at the
// configured cadence and the device is never opened.
#[test]
fn test_disabled_feed_sends_placeholders_at_cadence() {
    let mut h = start_harness(30, false, true);

    thread::sleep(Duration::from_millis(700));
    h.relay.stop();

    let sent = h.sink_log.sent();
    assert!(
        sent.iter().all(|&real| !real),
        "disabled feed must only emit placeholders"
    );
    // ~21 frames in 700ms at 30fps; leave headroom for scheduler jitter
    assert!(
        (10..=27).contains(&sent.len()),
        "expected ~21 frames at 30fps, got {}",
        sent.len()
    );
    assert_eq!(
        h.source_log.opens(),
        0,
        "device must never be opened while the feature is disabled"
    );
}

// With both activation flags set, only real video flows.
#[test]
fn test_enabled_feed_relays_real_video() {
    let mut h = start_harness(100, true, true);

    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() >= 5
    }));
    h.relay.stop();

    let sent = h.sink_log.sent();
    assert!(
        sent.iter().all(|&real| real),
        "with both flags set every frame must be real video"
    );
    assert!(h.source_log.opens() >= 1);
}

// Toggling the feature mid-run switches between real and placeholder
// output without restarting the worker.
#[test]
fn test_toggle_switches_output_live() {
    let mut h = start_harness(100, true, true);

    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() >= 3
    }));

    h.state.set_feature_enabled(false);
    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent().last() == Some(&false)
    }));
    assert!(
        wait_until(Duration::from_secs(2), || !h.source_log.is_open()),
        "device must be released once the feature is disabled"
    );

    h.state.set_feature_enabled(true);
    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent().last() == Some(&true)
    }));

    h.relay.stop();
}

// Device open fails twice then succeeds: two placeholder cycles, then
// real frames, with each attempt logged distinctly.
#[test]
fn test_open_failures_degrade_then_recover() {
    let mut h = start_harness_with(100, true, true, vec![false, false], Vec::new(), 0);

    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() >= 5
    }));
    h.relay.stop();

    let sent = h.sink_log.sent();
    assert_eq!(sent[0], false, "first cycle must degrade to placeholder");
    assert_eq!(sent[1], false, "second cycle must degrade to placeholder");
    assert!(
        sent[2..].iter().all(|&real| real),
        "third cycle onward must be real video"
    );
    assert!(h.source_log.opens() >= 3);
}

// A single read failure yields exactly one placeholder, and real video
// resumes on the next cycle without a stop/start.
#[test]
fn test_read_failure_recovers_next_cycle() {
    let mut h = start_harness_with(100, true, true, Vec::new(), vec![true, false], 0);

    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() >= 4
    }));
    h.relay.stop();

    let sent = h.sink_log.sent();
    assert_eq!(sent[0], true);
    assert_eq!(sent[1], false, "the failed read must emit one placeholder");
    assert!(
        sent[2..].iter().all(|&real| real),
        "real video must resume right after the failure"
    );
    assert_eq!(
        sent.iter().filter(|&&real| !real).count(),
        1,
        "exactly one placeholder for a single read failure"
    );
    // The failed read forces a release and a fresh open
    assert!(h.source_log.releases() >= 1);
    assert!(h.source_log.opens() >= 2);
}

// Consumer disconnects mid-stream: the device is released promptly, no
// further reads happen until reconnect, and the state is published for
// observers.
#[test]
fn test_disconnect_releases_device() {
    let mut h = start_harness(100, true, true);
    let view = h.state.view();

    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() >= 2
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        view.consumer_connected()
    }));

    h.sink_log.set_connected(false);
    assert!(
        wait_until(Duration::from_secs(2), || !h.source_log.is_open()),
        "device must be released after the consumer detaches"
    );
    assert!(wait_until(Duration::from_secs(2), || {
        !view.consumer_connected()
    }));

    let reads_after_release = h.source_log.reads();
    let sent_after_release = h.sink_log.sent_count();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(
        h.source_log.reads(),
        reads_after_release,
        "no reads may happen while disconnected"
    );
    assert_eq!(
        h.sink_log.sent_count(),
        sent_after_release,
        "no frames may be sent while disconnected"
    );

    // Reconnect resumes the stream
    h.sink_log.set_connected(true);
    assert!(wait_until(Duration::from_secs(2), || {
        h.sink_log.sent_count() > sent_after_release
    }));

    h.relay.stop();
}

// stop() terminates the worker within the documented timeout even while
// it sits in the longest suspension point (the consumer wait).
#[test]
fn test_bounded_shutdown_while_awaiting_consumer() {
    let mut h = start_harness(30, true, false);

    // Let the worker settle into the consumer wait
    thread::sleep(Duration::from_millis(200));
    assert!(h.relay.is_running());
    assert_eq!(h.sink_log.sent_count(), 0);

    let start = Instant::now();
    h.relay.stop();
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "shutdown took {:?}",
        start.elapsed()
    );
    assert!(!h.relay.is_running());
}

// A sink that cannot be created ends the worker; nothing is ever sent.
#[test]
fn test_fatal_sink_init_ends_worker() {
    let source_log = SourceLog::default();
    let sink_log = SinkLog::default();
    sink_log.set_connected(true);

    let state = ActivationState::new(true);
    let mut relay = RelayManager::new(test_config(100), state);
    relay.start_with_devices(
        Box::new(ScriptedSource::new(source_log.clone(), Vec::new(), Vec::new())),
        Box::new(MockSink::failing_init(sink_log.clone())),
    );

    assert!(
        wait_until(Duration::from_secs(2), || !relay.is_running()),
        "worker must exit when the sink cannot be created"
    );
    assert_eq!(sink_log.sent_count(), 0);
    assert_eq!(source_log.opens(), 0);
    relay.stop();
}

// A send fault is answered with one placeholder recovery send and the loop
// keeps running.
#[test]
fn test_send_fault_recovers_with_placeholder() {
    let mut h = start_harness_with(100, true, true, Vec::new(), Vec::new(), 1);

    assert!(wait_until(Duration::from_secs(3), || {
        h.sink_log.sent_count() >= 3
    }));
    assert!(h.relay.is_running());

    let sent = h.sink_log.sent();
    assert_eq!(
        sent[0], false,
        "the first delivered frame must be the recovery placeholder"
    );
    assert!(
        sent[1..].iter().all(|&real| real),
        "real video must continue after the fault backoff"
    );

    h.relay.stop();
}

// start() while running is a warned no-op; stop() is idempotent.
#[test]
fn test_start_stop_guards() {
    let mut h = start_harness(100, true, true);
    assert!(h.relay.is_running());

    // Second start must not spawn a second worker over the first
    let source_log = SourceLog::default();
    h.relay.start_with_devices(
        Box::new(ScriptedSource::new(source_log.clone(), Vec::new(), Vec::new())),
        Box::new(MockSink::new(SinkLog::default())),
    );
    assert!(h.relay.is_running());
    assert_eq!(
        source_log.opens(),
        0,
        "the ignored second start must not touch its devices"
    );

    h.relay.stop();
    assert!(!h.relay.is_running());
    h.relay.stop();
}
