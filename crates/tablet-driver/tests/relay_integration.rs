//! Integration tests for the relay pipeline.
//!
//! Each test wires a [`ScriptedShell`] (standing in for the SSH session) and a
//! [`RecordingBackend`] (standing in for `/dev/uinput`) into a [`RelayLoop`],
//! runs it to completion, and then inspects the shared [`CallJournal`] and
//! the bytes that reached the virtual pen.

use std::io;

use tablet_core::protocol::codes::{
    ABS_PRESSURE, ABS_X, ABS_Y, BTN_TOOL_PEN, BTN_TOUCH, EV_ABS, EV_KEY, EV_SYN, SYN_REPORT,
};
use tablet_core::{encode_frame, EventFrame, FrameLayout};
use tablet_driver::application::relay::{RelayErrorKind, RelayLoop, RelayStage};
use tablet_driver::application::resolve_path::{ResolutionError, RESOLVE_COMMAND};
use tablet_driver::application::stream_frames::FrameError;
use tablet_driver::application::virtual_device::{SetupStep, VirtualDeviceManager};
use tablet_driver::infrastructure::journal::CallJournal;
use tablet_driver::infrastructure::remote::mock::{ExecScript, ScriptedShell};
use tablet_driver::infrastructure::uinput::mock::{RecordingBackend, WrittenFrames};

const DEVICE_PATH: &str = "/dev/input/event1";
const STREAM_COMMAND: &str = "cat /dev/input/event1";

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A short pen stroke: hover in, touch down, move, lift.
fn pen_stroke() -> Vec<EventFrame> {
    let at = |usec: i64, event_type, code, value| EventFrame {
        seconds: 1_700_000_000,
        microseconds: usec,
        event_type,
        code,
        value,
    };
    vec![
        at(100, EV_KEY, BTN_TOOL_PEN, 1),
        at(100, EV_ABS, ABS_X, 11_344),
        at(100, EV_ABS, ABS_Y, 10_471),
        at(100, EV_SYN, SYN_REPORT, 0),
        at(8_100, EV_KEY, BTN_TOUCH, 1),
        at(8_100, EV_ABS, ABS_PRESSURE, 1_820),
        at(8_100, EV_SYN, SYN_REPORT, 0),
        at(16_100, EV_ABS, ABS_X, 11_402),
        at(16_100, EV_SYN, SYN_REPORT, 0),
        at(24_100, EV_KEY, BTN_TOUCH, 0),
        at(24_100, EV_ABS, ABS_PRESSURE, 0),
        at(24_100, EV_SYN, SYN_REPORT, 0),
    ]
}

fn encode_all(layout: FrameLayout, frames: &[EventFrame]) -> Vec<u8> {
    frames.iter().flat_map(|f| encode_frame(layout, f)).collect()
}

/// Shell that resolves the digitizer to [`DEVICE_PATH`] and streams `stream`.
fn tablet_shell(journal: &CallJournal, stream: ExecScript) -> ScriptedShell {
    ScriptedShell::new(journal.clone())
        .script(RESOLVE_COMMAND, ExecScript::output(b"/dev/input/event1\n"))
        .script(STREAM_COMMAND, stream)
}

/// Relay writing 64-bit frames locally, whatever the host is.
fn build_relay(
    shell: ScriptedShell,
    backend: RecordingBackend,
    remote_layout: FrameLayout,
) -> (RelayLoop<ScriptedShell, RecordingBackend>, WrittenFrames) {
    let written = backend.written();
    let device = VirtualDeviceManager::with_local_layout(backend, FrameLayout::Wide64);
    (RelayLoop::new(shell, device, remote_layout), written)
}

fn assert_in_order(journal: &CallJournal, prefixes: &[&str]) {
    let positions: Vec<usize> = prefixes
        .iter()
        .map(|p| {
            journal
                .position(p)
                .unwrap_or_else(|| panic!("journal has no entry starting with {p:?}"))
        })
        .collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "expected {prefixes:?} in order, journal was {:?}",
        journal.entries()
    );
}

// ── Normal operation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stroke_is_forwarded_byte_identical_and_in_order() {
    // Arrange
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke());
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    assert_eq!(relay.stage(), RelayStage::Init);

    // Act
    let summary = relay.run().await.unwrap();

    // Assert
    assert_eq!(summary.device_path, DEVICE_PATH);
    assert_eq!(summary.frames_forwarded, pen_stroke().len() as u64);
    assert_eq!(written.concatenated(), stream);
    assert!(written.buffers().iter().all(|b| b.len() == 24));
}

#[tokio::test]
async fn test_two_frames_in_one_read_are_both_forwarded() {
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke()[..2]);
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    relay.run().await.unwrap();

    assert_eq!(
        written.buffers(),
        vec![stream[..24].to_vec(), stream[24..].to_vec()]
    );
}

#[tokio::test]
async fn test_frames_split_across_reads_are_reassembled() {
    // Arrange: 5 + 30 + 13 bytes carry exactly two frames.
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke()[..2]);
    let chunks = vec![
        stream[..5].to_vec(),
        stream[5..35].to_vec(),
        stream[35..].to_vec(),
    ];
    let shell = tablet_shell(&journal, ExecScript::chunks(chunks));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    // Act
    let summary = relay.run().await.unwrap();

    // Assert
    assert_eq!(summary.frames_forwarded, 2);
    assert_eq!(written.concatenated(), stream);
}

#[tokio::test]
async fn test_narrow_remote_frames_are_widened_for_the_device() {
    // Arrange
    let journal = CallJournal::new();
    let stroke = pen_stroke();
    let shell = tablet_shell(
        &journal,
        ExecScript::output(&encode_all(FrameLayout::Narrow32, &stroke)),
    );
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Narrow32,
    );

    // Act
    relay.run().await.unwrap();

    // Assert
    assert_eq!(written.concatenated(), encode_all(FrameLayout::Wide64, &stroke));
}

#[tokio::test]
async fn test_clean_end_of_stream_tears_down_in_reverse_order() {
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke());
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, _) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    relay.run().await.unwrap();

    assert_in_order(
        &journal,
        &[
            "exec:readlink",
            "exec:cat",
            "uinput:create",
            "uinput:destroy",
            "close:cat",
            "disconnect",
        ],
    );
    assert_eq!(journal.entries().last().map(String::as_str), Some("disconnect"));
    assert_eq!(journal.count("uinput:destroy"), 1);
}

#[tokio::test]
async fn test_path_lookup_runs_once_per_session() {
    let journal = CallJournal::new();
    let shell = tablet_shell(&journal, ExecScript::silent());
    let (relay, _) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    relay.run().await.unwrap();

    assert_eq!(journal.count(&format!("exec:{RESOLVE_COMMAND}")), 1);
    assert_eq!(journal.count(&format!("exec:{STREAM_COMMAND}")), 1);
}

#[tokio::test]
async fn test_device_is_created_before_the_first_write() {
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke()[..1]);
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, _) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    relay.run().await.unwrap();

    assert_in_order(
        &journal,
        &[
            "uinput:open",
            "uinput:key:0x140",
            "uinput:abs:0x18:0..4095",
            "uinput:identity:reMarkableTablet-FakePen",
            "uinput:create",
            "uinput:write:24",
        ],
    );
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_truncated_stream_is_fatal_after_forwarding_whole_frames() {
    // Arrange: one complete frame followed by 10 stray bytes.
    let journal = CallJournal::new();
    let mut stream = encode_all(FrameLayout::Wide64, &pen_stroke()[..1]);
    stream.extend_from_slice(&[0xAA; 10]);
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    // Act
    let err = relay.run().await.unwrap_err();

    // Assert
    assert_eq!(err.stage, RelayStage::Stream);
    assert!(matches!(
        err.kind,
        RelayErrorKind::Frame(FrameError::Truncated {
            received: 10,
            expected: 24
        })
    ));
    assert_eq!(written.buffers().len(), 1);
    assert_in_order(&journal, &["uinput:destroy", "close:cat", "disconnect"]);
}

#[tokio::test]
async fn test_read_error_mid_stream_is_fatal() {
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke()[..3]);
    let shell = tablet_shell(
        &journal,
        ExecScript::output(&stream).then_fail(io::ErrorKind::ConnectionReset),
    );
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    let err = relay.run().await.unwrap_err();

    assert_eq!(err.stage, RelayStage::Stream);
    assert!(matches!(err.kind, RelayErrorKind::Frame(FrameError::Io(_))));
    assert_eq!(written.concatenated(), stream);
    assert_in_order(&journal, &["uinput:destroy", "close:cat", "disconnect"]);
}

#[tokio::test]
async fn test_stream_command_failing_without_output_is_fatal() {
    // Arrange: `cat` exits non-zero before printing anything.
    let journal = CallJournal::new();
    let shell = tablet_shell(
        &journal,
        ExecScript::silent().then_fail(io::ErrorKind::NotFound),
    );
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    // Act
    let err = relay.run().await.unwrap_err();

    // Assert
    assert_eq!(err.stage, RelayStage::Stream);
    assert!(matches!(err.kind, RelayErrorKind::Frame(FrameError::Io(_))));
    assert!(written.buffers().is_empty());
    assert_in_order(&journal, &["uinput:destroy", "close:cat", "disconnect"]);
}

#[tokio::test]
async fn test_failed_device_write_stops_the_relay() {
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke());
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()).fail_writes_after(2),
        FrameLayout::Wide64,
    );

    let err = relay.run().await.unwrap_err();

    assert_eq!(err.stage, RelayStage::Stream);
    assert!(matches!(err.kind, RelayErrorKind::Forward(_)));
    assert_eq!(written.buffers().len(), 2);
    assert_eq!(journal.count("uinput:write:failed"), 1);
    assert_in_order(&journal, &["uinput:destroy", "close:cat", "disconnect"]);
}

#[tokio::test]
async fn test_lookup_failure_releases_only_the_session() {
    // Arrange
    let journal = CallJournal::new();
    let shell = ScriptedShell::new(journal.clone()).script(RESOLVE_COMMAND, ExecScript::silent());
    let (relay, _) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    // Act
    let err = relay.run().await.unwrap_err();

    // Assert
    assert_eq!(err.stage, RelayStage::ResolvePath);
    assert!(matches!(
        err.kind,
        RelayErrorKind::Resolution(ResolutionError::EmptyOutput)
    ));
    assert_eq!(journal.count("exec:cat"), 0);
    assert_eq!(journal.count("uinput:"), 0);
    assert_eq!(journal.count("disconnect"), 1);
}

#[tokio::test]
async fn test_stream_channel_refusal_creates_no_device() {
    let journal = CallJournal::new();
    let shell = tablet_shell(&journal, ExecScript::refused());
    let (relay, _) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()),
        FrameLayout::Wide64,
    );

    let err = relay.run().await.unwrap_err();

    assert_eq!(err.stage, RelayStage::OpenChannel);
    assert!(matches!(err.kind, RelayErrorKind::Connection(_)));
    assert_eq!(journal.count("uinput:"), 0);
    assert_eq!(journal.entries().last().map(String::as_str), Some("disconnect"));
}

#[tokio::test]
async fn test_device_setup_failure_closes_the_channel() {
    // Arrange
    let journal = CallJournal::new();
    let stream = encode_all(FrameLayout::Wide64, &pen_stroke());
    let shell = tablet_shell(&journal, ExecScript::output(&stream));
    let (relay, written) = build_relay(
        shell,
        RecordingBackend::new(journal.clone()).fail_at(SetupStep::RegisterAxes),
        FrameLayout::Wide64,
    );

    // Act
    let err = relay.run().await.unwrap_err();

    // Assert
    assert_eq!(err.stage, RelayStage::CreateDevice);
    assert!(matches!(
        &err.kind,
        RelayErrorKind::DeviceSetup(e) if e.step == SetupStep::RegisterAxes
    ));
    assert_eq!(journal.count("uinput:create"), 0);
    assert_eq!(journal.count("uinput:destroy"), 1);
    assert!(written.buffers().is_empty());
    assert_in_order(&journal, &["uinput:destroy", "close:cat", "disconnect"]);
}
