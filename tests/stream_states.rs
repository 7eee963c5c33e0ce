//! Stream-state transitions driven by HEADERS, PRIORITY, RST_STREAM and
//! WINDOW_UPDATE dispatch.

mod helpers;

use helpers::*;
use shade::{Context, ErrorCode, StreamState};

#[test]
fn test_headers_create_and_open_stream() {
    init_tracing();
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(
        &mut decoder,
        &mut ctx,
        &[headers_frame(1, &[(":method", "GET"), (":path", "/")], false)],
    )
    .unwrap();

    assert_eq!(
        decoder.connection().stream(1).unwrap().state(),
        StreamState::Open
    );
    // Plain HEADERS report the default priority.
    assert_eq!(
        log.events(),
        vec![
            Event::Settings,
            Event::Headers {
                stream_id: 1,
                dependency: 0,
                weight: 16,
                exclusive: false,
                end_of_stream: false,
            }
        ]
    );
}

#[test]
fn test_headers_with_end_stream_half_close() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(
        &mut decoder,
        &mut ctx,
        &[headers_frame(1, &[(":method", "GET")], true)],
    )
    .unwrap();
    assert_eq!(
        decoder.connection().stream(1).unwrap().state(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_headers_priority_recorded_on_stream() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(
        &mut decoder,
        &mut ctx,
        &[
            headers_frame(1, &[(":method", "GET")], false),
            headers_frame_with_priority(3, &[(":method", "GET")], 1, 99, true),
        ],
    )
    .unwrap();

    let priority = decoder.connection().stream(3).unwrap().priority();
    assert_eq!(priority.dependency, 1);
    assert_eq!(priority.weight, 100);
    assert!(priority.exclusive);
    assert!(log.events().contains(&Event::Headers {
        stream_id: 3,
        dependency: 1,
        weight: 100,
        exclusive: true,
        end_of_stream: false,
    }));
}

#[test]
fn test_trailers_allowed_on_open_stream() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(
        &mut decoder,
        &mut ctx,
        &[
            headers_frame(1, &[(":method", "POST")], false),
            headers_frame(1, &[("x-trailer", "checksum")], true),
        ],
    )
    .unwrap();

    let headers_events = log
        .events()
        .iter()
        .filter(|e| matches!(e, Event::Headers { .. }))
        .count();
    assert_eq!(headers_events, 2);
    // Trailers carried END_STREAM, so the remote side is now done.
    assert_eq!(
        decoder.connection().stream(1).unwrap().state(),
        StreamState::HalfClosedRemote
    );
}

#[test]
fn test_headers_on_closed_stream_is_stream_error() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decode(&mut decoder, &mut ctx, &[rst_stream_frame(1, 0x8)]).unwrap();
    assert_eq!(
        decoder.connection().stream(1).unwrap().state(),
        StreamState::Closed
    );

    let err = decode(
        &mut decoder,
        &mut ctx,
        &[headers_frame(1, &[("late", "trailer")], false)],
    )
    .unwrap_err();
    assert_eq!(err.stream_id(), Some(1));
    assert_eq!(err.error_code(), ErrorCode::StreamClosed);
}

#[test]
fn test_priority_creates_idle_stream_and_notifies() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[priority_frame(5, 0, 15, false)]).unwrap();

    assert_eq!(
        decoder.connection().stream(5).unwrap().state(),
        StreamState::Idle
    );
    // Wire octet 15 is logical weight 16.
    assert!(log.events().contains(&Event::Priority {
        stream_id: 5,
        dependency: 0,
        weight: 16,
        exclusive: false,
    }));
}

#[test]
fn test_priority_implicitly_creates_parent() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[priority_frame(3, 5, 10, false)]).unwrap();
    assert_eq!(
        decoder.connection().stream(5).unwrap().state(),
        StreamState::Idle
    );
    assert_eq!(decoder.connection().stream(3).unwrap().priority().dependency, 5);
}

#[test]
fn test_priority_for_reclaimed_stream_id_is_swallowed() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    // Stream 3 moves the creation high-water mark past 1, so stream 1 can
    // never be created again.
    decode(&mut decoder, &mut ctx, &[headers_frame(3, &[(":method", "GET")], false)]).unwrap();

    decode(&mut decoder, &mut ctx, &[priority_frame(1, 0, 0, false)]).unwrap();

    // The creation failure is benign for PRIORITY; the listener still hears
    // about the frame.
    assert!(log.events().contains(&Event::Priority {
        stream_id: 1,
        dependency: 0,
        weight: 1,
        exclusive: false,
    }));
    assert!(decoder.connection().stream(1).is_none());
}

#[test]
fn test_priority_still_delivered_after_local_reset() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decoder
        .connection_mut()
        .stream_mut(1)
        .unwrap()
        .set_reset_sent();

    decode(&mut decoder, &mut ctx, &[priority_frame(1, 0, 200, false)]).unwrap();
    assert!(log.events().contains(&Event::Priority {
        stream_id: 1,
        dependency: 0,
        weight: 201,
        exclusive: false,
    }));
}

#[test]
fn test_rst_stream_closes_and_latches() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decode(&mut decoder, &mut ctx, &[rst_stream_frame(1, 0x8)]).unwrap();

    let stream = decoder.connection().stream(1).unwrap();
    assert_eq!(stream.state(), StreamState::Closed);
    assert!(stream.is_reset_received());
    assert!(log.events().contains(&Event::RstStream {
        stream_id: 1,
        error_code: ErrorCode::Cancel,
    }));
}

#[test]
fn test_rst_stream_on_closed_stream_is_noop() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decode(&mut decoder, &mut ctx, &[rst_stream_frame(1, 0x8)]).unwrap();
    decode(&mut decoder, &mut ctx, &[rst_stream_frame(1, 0x2)]).unwrap();

    let rst_events = log
        .events()
        .iter()
        .filter(|e| matches!(e, Event::RstStream { .. }))
        .count();
    assert_eq!(rst_events, 1);
}

#[test]
fn test_rst_stream_for_unknown_stream_is_connection_error() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    let err = decode(&mut decoder, &mut ctx, &[rst_stream_frame(9, 0x0)]).unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(err.error_code(), ErrorCode::ProtocolError);
}

#[test]
fn test_window_update_delivered_for_stream_and_connection() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decode(
        &mut decoder,
        &mut ctx,
        &[window_update_frame(1, 500), window_update_frame(0, 1_000)],
    )
    .unwrap();

    assert!(log.events().contains(&Event::WindowUpdate {
        stream_id: 1,
        increment: 500,
    }));
    assert!(log.events().contains(&Event::WindowUpdate {
        stream_id: 0,
        increment: 1_000,
    }));
}

#[test]
fn test_window_update_zero_increment_is_flow_policy_error() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    let err = decode(&mut decoder, &mut ctx, &[window_update_frame(1, 0)]).unwrap_err();
    assert_eq!(err.stream_id(), Some(1));
    assert_eq!(err.error_code(), ErrorCode::ProtocolError);
}

#[test]
fn test_window_update_on_closed_stream_silently_dropped() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();
    decode(&mut decoder, &mut ctx, &[rst_stream_frame(1, 0x8)]).unwrap();

    decode(&mut decoder, &mut ctx, &[window_update_frame(1, 500)]).unwrap();
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, Event::WindowUpdate { .. })));
}

#[test]
fn test_window_update_for_unknown_stream_is_connection_error() {
    let (listener, _log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    let err = decode(&mut decoder, &mut ctx, &[window_update_frame(9, 500)]).unwrap_err();
    assert!(err.is_connection_error());
}

#[test]
fn test_unknown_frame_delivered_mid_connection() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decode(&mut decoder, &mut ctx, &[raw_frame(0x42, 0, 7, b"ext")]).unwrap();
    assert!(log.events().contains(&Event::Unknown {
        frame_type: 0x42,
        stream_id: 7,
    }));
}

#[test]
fn test_headers_ignored_after_goaway_sent() {
    let (listener, log) = RecordingListener::new();
    let mut decoder = build_decoder(true, listener);
    let mut ctx = Context::new();
    handshake(&mut decoder, &mut ctx);

    decoder.connection_mut().set_goaway_sent(0);
    decode(&mut decoder, &mut ctx, &[headers_frame(1, &[(":method", "GET")], false)]).unwrap();

    // No stream was created and the listener heard nothing.
    assert!(decoder.connection().stream(1).is_none());
    assert!(!log.events().iter().any(|e| matches!(e, Event::Headers { .. })));
}
