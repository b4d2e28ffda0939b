//! Local media and remote subscription commands

mod common;

use pretty_assertions::assert_eq;

use common::*;
use rvoip_call_bridge::error::{CODE_INVALID_ARGUMENT, CODE_INVALID_STATE, CODE_NOT_FOUND};
use rvoip_call_bridge::{result_code, CallEvent};

#[test]
fn test_local_media_allowed_before_join() {
    let (bridge, engine, _sink) = ready_bridge();

    bridge.enable_local_camera(true).unwrap();
    bridge.enable_local_microphone(true).unwrap();
    bridge.switch_camera().unwrap();
    bridge.set_local_volume(80).unwrap();

    let local = bridge.local_media();
    assert!(local.camera_enabled);
    assert!(local.microphone_enabled);
    assert_eq!(local.volume, 80);
    assert_eq!(
        engine.commands()[1..].to_vec(),
        vec![
            "enable_local_video true",
            "enable_local_audio true",
            "switch_camera",
            "set_local_volume 80",
        ]
    );
}

#[test]
fn test_volume_out_of_range() {
    let (bridge, engine, _sink) = ready_bridge();
    assert_eq!(result_code(&bridge.set_local_volume(101)), CODE_INVALID_ARGUMENT);
    assert_eq!(result_code(&bridge.set_local_volume(-5)), CODE_INVALID_ARGUMENT);
    assert_eq!(bridge.local_media().volume, 100);
    assert_eq!(engine.commands().len(), 1);
}

#[test]
fn test_publish_confirmation_needs_joined_session() {
    let (bridge, _engine, sink) = ready_bridge();
    bridge.enable_local_camera(true).unwrap();
    bridge
        .engine_events()
        .emit(CallEvent::LocalVideoPublished { code: 0 });

    // Recorded, not surfaced
    assert_eq!(bridge.local_media().last_video_publish_code, Some(0));
    assert_eq!(bridge.dispatch_stats().published, 1);

    bridge.join_channel("room1", "u1", "tok").unwrap();
    bridge.engine_events().emit(join_result(0, "room1", "u1"));
    bridge
        .engine_events()
        .emit(CallEvent::LocalAudioPublished { code: 0 });

    assert!(sink.wait_for(3, WAIT));
    assert_eq!(
        sink.names(),
        vec!["engineInitResult", "joinChannelResult", "localAudioPublished"]
    );
}

#[test]
fn test_subscription_requires_session() {
    let (bridge, _engine, _sink) = ready_bridge();
    assert_eq!(
        result_code(&bridge.subscribe_remote_video("u2", true)),
        CODE_INVALID_STATE
    );

    bridge.join_channel("room1", "u1", "tok").unwrap();
    assert_eq!(
        result_code(&bridge.subscribe_remote_audio("u2", true)),
        CODE_INVALID_STATE
    );
}

#[test]
fn test_subscription_confirmed() {
    let (bridge, engine, sink) = joined_bridge(&["u2"]);

    bridge.subscribe_remote_video("u2", true).unwrap();
    assert!(bridge.remote_user("u2").unwrap().video_subscribed);
    assert!(engine
        .commands()
        .contains(&"subscribe_remote_video u2 true".to_string()));

    bridge.engine_events().emit(CallEvent::RemoteVideoSubscribed {
        code: 0,
        user_id: "u2".to_string(),
    });
    assert!(bridge.remote_user("u2").unwrap().video_subscribed);
    assert!(sink.wait_for(4, WAIT));
}

#[test]
fn test_subscription_failure_reverts_flag() {
    let (bridge, _engine, sink) = joined_bridge(&["u2"]);

    bridge.subscribe_remote_audio("u2", true).unwrap();
    bridge.engine_events().emit(CallEvent::RemoteAudioSubscribed {
        code: 5,
        user_id: "u2".to_string(),
    });

    let user = bridge.remote_user("u2").unwrap();
    assert!(!user.audio_subscribed);
    assert!(!user.video_subscribed);

    // The failure is still reported to the application
    assert!(sink.wait_for(4, WAIT));
    assert_eq!(sink.events()[3].code(), Some(5));
}

#[test]
fn test_unsubscribe_failure_restores_subscription() {
    let (bridge, _engine, _sink) = joined_bridge(&["u2"]);
    let events = bridge.engine_events();

    bridge.subscribe_remote_video("u2", true).unwrap();
    events.emit(CallEvent::RemoteVideoSubscribed {
        code: 0,
        user_id: "u2".to_string(),
    });
    bridge.subscribe_remote_video("u2", false).unwrap();
    assert!(!bridge.remote_user("u2").unwrap().video_subscribed);

    events.emit(CallEvent::RemoteVideoSubscribed {
        code: 8,
        user_id: "u2".to_string(),
    });
    assert!(bridge.remote_user("u2").unwrap().video_subscribed);
}

#[test]
fn test_subscription_after_user_left() {
    let (bridge, _engine, _sink) = joined_bridge(&["u2"]);
    bridge.subscribe_remote_video("u2", true).unwrap();
    bridge.engine_events().emit(remote_left("u2", 0));

    assert_eq!(
        result_code(&bridge.subscribe_remote_video("u2", false)),
        CODE_NOT_FOUND
    );

    // A late result for the departed user is absorbed
    let published = bridge.dispatch_stats().published;
    bridge.engine_events().emit(CallEvent::RemoteVideoSubscribed {
        code: 0,
        user_id: "u2".to_string(),
    });
    assert_eq!(bridge.dispatch_stats().published, published);
}

#[test]
fn test_overlapping_subscriptions_settle_on_engine_result() {
    let (bridge, _engine, _sink) = joined_bridge(&["u2"]);
    bridge.subscribe_remote_video("u2", true).unwrap();
    bridge.subscribe_remote_video("u2", true).unwrap();

    let events = bridge.engine_events();
    events.emit(CallEvent::RemoteVideoSubscribed {
        code: 9,
        user_id: "u2".to_string(),
    });
    events.emit(CallEvent::RemoteVideoSubscribed {
        code: 0,
        user_id: "u2".to_string(),
    });

    assert!(bridge.remote_user("u2").unwrap().video_subscribed);
}
