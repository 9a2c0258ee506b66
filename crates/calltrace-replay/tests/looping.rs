//! Last-frame loop playback integration tests.

use calltrace_replay::{
    BufferedReplay, CallSource, DecodedCall, LastFrameLooper, LoopConfig, SliceSource,
    StreamDecoder, TraceError, TraceWriter,
};
use calltrace_test_utils::*;

fn looper(bytes: &[u8], config: LoopConfig) -> LastFrameLooper<SliceSource<'_>> {
    let dec = StreamDecoder::open(SliceSource::new(bytes)).unwrap();
    LastFrameLooper::new(dec, config).unwrap()
}

/// Frame index of each call: draws carry it, swaps inherit the
/// previous draw's.
fn frames_of(calls: &[DecodedCall]) -> Vec<u64> {
    let mut frame = 0;
    calls
        .iter()
        .map(|c| {
            if let Some((f, _)) = draw_tag(c) {
                frame = f;
            }
            frame
        })
        .collect()
}

#[test]
fn last_frame_replays_n_times_then_ends() {
    // F1, F2, F3 with 1, 2, 3 draws plus a swap each.
    let bytes = frame_trace(&[1, 2, 3]);
    let mut l = looper(&bytes, LoopConfig::iterations(3));
    let calls = drive(&mut l, 1000).unwrap();

    let live = 2 + 3 + 4;
    assert_eq!(calls.len(), live + 3 * 4);
    let f3: Vec<_> = calls[live - 4..live].iter().map(|c| (**c).clone()).collect();
    for i in 0..3 {
        let start = live + i * 4;
        let replayed: Vec<_> = calls[start..start + 4].iter().map(|c| (**c).clone()).collect();
        assert_eq!(replayed, f3, "iteration {i}");
    }
    assert!(frames_of(&calls[live..]).iter().all(|&f| f == 2));
    assert_eq!(l.iterations_completed(), 3);

    // End of stream is permanent.
    for _ in 0..3 {
        assert!(l.next_call().unwrap().is_none());
    }
}

#[test]
fn loop_forever_never_ends() {
    let bytes = frame_trace(&[1, 2, 3]);
    let mut l = looper(&bytes, LoopConfig::forever());
    let calls = drive(&mut l, 10_000).unwrap();
    assert_eq!(calls.len(), 10_000);
    assert!(l.is_looping());
    assert!(l.iterations_completed() > 2000);
    assert!(l.next_call().unwrap().is_some());
}

#[test]
fn buffered_and_replayed_calls_are_shared() {
    let bytes = frame_trace(&[1, 1]);
    let mut l = looper(&bytes, LoopConfig::iterations(1));
    let calls = drive(&mut l, 100).unwrap();
    assert_eq!(calls.len(), 4 + 2);
    assert!(calls.iter().all(|c| !c.is_owned()));
    // The replayed frame is the very same allocation as the live one.
    for (live, replayed) in calls[2..4].iter().zip(&calls[4..]) {
        let (DecodedCall::Shared(a), DecodedCall::Shared(b)) = (live, replayed) else {
            panic!("expected shared calls");
        };
        assert!(std::sync::Arc::ptr_eq(a, b));
    }
}

#[test]
fn single_frame_trace_loops() {
    let bytes = frame_trace(&[2]);
    let mut l = looper(&bytes, LoopConfig::iterations(3));
    let calls = drive(&mut l, 100).unwrap();
    assert_eq!(calls.len(), 3 + 3 * 3);
    let live: Vec<_> = calls[..3].iter().map(|c| (**c).clone()).collect();
    for pass in calls[3..].chunks(3) {
        let replayed: Vec<_> = pass.iter().map(|c| (**c).clone()).collect();
        assert_eq!(replayed, live);
    }
    assert!(l.next_call().unwrap().is_none());
}

#[test]
fn trailing_partial_frame_is_not_looped() {
    // The stream ends mid-frame: the retained frame is the last complete one.
    let mut w = TraceWriter::new(Vec::new()).unwrap();
    for (frame, draws) in [(0, 1), (1, 2)] {
        for i in 0..draws {
            w.write_call(&draw_call(frame, i)).unwrap();
        }
        w.write_call(&swap_call()).unwrap();
    }
    w.write_call(&draw_call(9, 0)).unwrap();
    w.write_call(&draw_call(9, 1)).unwrap();
    let bytes = w.into_inner();

    let mut l = looper(&bytes, LoopConfig::iterations(1));
    let calls = drive(&mut l, 100).unwrap();
    let live = 2 + 3 + 2;
    assert_eq!(calls.len(), live + 3);
    assert_eq!(draw_tag(&calls[live - 1]), Some((9, 1)));
    assert_eq!(frames_of(&calls[live..]), [1, 1, 1]);
}

#[test]
fn looper_without_loop_on_finish_is_transparent() {
    let bytes = frame_trace(&[2, 2, 2]);
    let mut l = looper(&bytes, LoopConfig::default());
    let calls = drive(&mut l, 100).unwrap();
    assert_eq!(calls.len(), 9);
    assert!(calls.iter().all(|c| c.is_owned()));
    assert!(!l.is_looping());
}

#[test]
fn bookmarks_delegate_to_the_decoder() {
    let bytes = frame_trace(&[1, 1, 1]);
    let mut l = looper(&bytes, LoopConfig::forever());
    drive(&mut l, 4).unwrap();
    let here = l.bookmark().unwrap();
    assert_eq!(here, l.decoder().bookmark().unwrap());
    assert_eq!(l.frame_start(), Some(here));
    assert_eq!(l.last_frame_start().map(|b| b.next_call_no.0), Some(2));
}

#[test]
fn buffered_replay_has_no_bookmarks() {
    let mut replay = BufferedReplay::new(Vec::new(), 6);
    assert!(matches!(replay.bookmark(), Err(TraceError::UnsupportedSeek)));
    assert!(replay.next_call().unwrap().is_none());
}

#[test]
fn closed_looper_reports_closed() {
    let bytes = frame_trace(&[1]);
    let mut l = looper(&bytes, LoopConfig::forever());
    l.close();
    assert!(matches!(l.next_call(), Err(TraceError::Closed)));
}
