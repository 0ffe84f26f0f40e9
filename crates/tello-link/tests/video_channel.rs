mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{wait_until, BlockingSource, ScriptedSource, Step, MOCK_DIMS};
use tello_link::{SessionState, VideoChannel};

#[test]
fn last_good_frame_survives_hiccups() {
    let src = ScriptedSource::new(vec![Step::Frame(1), Step::Fail, Step::Hiccup, Step::Fail, Step::Hiccup]);
    let mut ch = VideoChannel::with_source(Box::new(src));
    ch.start().unwrap();
    assert_eq!(ch.dimensions(), Some(MOCK_DIMS));

    assert!(wait_until(Duration::from_secs(1), || ch.hiccups() >= 4));
    let frame = ch.latest().expect("frame kept across hiccups");
    assert_eq!(frame.seq, 1);
    assert_eq!(frame.dimensions(), MOCK_DIMS);
    assert_eq!(frame.image.get_pixel(0, 0).0, [1, 1, 1]);
    assert_eq!(ch.frames_decoded(), 1);
}

#[test]
fn newest_frame_wins() {
    let src = ScriptedSource::new(vec![Step::Frame(1), Step::Fail, Step::Frame(2)]);
    let mut ch = VideoChannel::with_source(Box::new(src));
    ch.start().unwrap();

    assert!(wait_until(Duration::from_secs(1), || ch.frames_decoded() == 2));
    let frame = ch.latest().unwrap();
    assert_eq!(frame.seq, 2);
    assert_eq!(frame.image.get_pixel(3, 3).0, [2, 2, 2]);
}

#[test]
fn fresh_flag_clears_on_read() {
    let mut ch = VideoChannel::with_source(Box::new(ScriptedSource::new(vec![Step::Frame(9)])));
    assert!(ch.latest().is_none());
    ch.start().unwrap();

    assert!(wait_until(Duration::from_secs(1), || ch.has_unconsumed()));
    assert!(ch.latest().is_some());
    assert!(!ch.has_unconsumed());
    assert_eq!(ch.latest().unwrap().seq, 1);
}

#[test]
fn endless_stream_keeps_refreshing() {
    let mut ch = VideoChannel::with_source(Box::new(ScriptedSource::endless()));
    ch.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || ch.has_unconsumed()));
    let first = ch.latest().unwrap().seq;
    assert!(wait_until(Duration::from_secs(1), || ch.has_unconsumed()));
    assert!(ch.latest().unwrap().seq > first);
}

#[test]
fn close_interrupts_blocked_decoder() {
    let src = BlockingSource::new();
    let dropped = src.dropped.clone();
    let mut ch = VideoChannel::with_source(Box::new(src));
    ch.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let t0 = Instant::now();
    ch.close();
    assert!(t0.elapsed() < Duration::from_secs(1));
    assert!(dropped.load(Ordering::Acquire));
    assert_eq!(ch.state(), SessionState::Closed);
    assert!(ch.latest().is_none());

    ch.close();
    assert!(ch.start().is_err());
}

#[test]
fn source_pulled_until_close() {
    let src = ScriptedSource::new(Vec::new());
    let pulls = src.pulls.clone();
    let mut ch = VideoChannel::with_source(Box::new(src));
    ch.start().unwrap();

    assert!(wait_until(Duration::from_secs(1), || pulls.load(Ordering::Relaxed) >= 5));
    ch.close();
    let after = pulls.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(pulls.load(Ordering::Relaxed), after);
}
