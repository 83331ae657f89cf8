//! A whole show driven through its context over an in-memory network

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ledmap::{ShowContext, ShowError, StatusPublisher};
use ledmap_control::{parse_packet, ArtPacket, ControlError, MemoryNetwork};
use ledmap_core::{
    CanvasFrame, ClipConfig, LedObject, OutputConfig, ParamValue, PlayState, PlayerConfig,
    SourceDescriptor,
};
use ledmap_io::{CanvasConfig, ShowConfig};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn output(id: u64, universes: Vec<u16>) -> OutputConfig {
    let mut config = OutputConfig::new(id, "127.0.0.1", universes);
    config.target_fps = 0.0;
    config
}

fn solid(color: [u8; 3]) -> SourceDescriptor {
    let mut params = BTreeMap::new();
    params.insert("color".to_string(), ParamValue::Color(color));
    SourceDescriptor::Generator {
        plugin: "solid_color".into(),
        params,
        duration_secs: None,
    }
}

fn player(id: u64, source: SourceDescriptor, autoplay: bool) -> PlayerConfig {
    let mut config = PlayerConfig::new(id, "main", vec![ClipConfig::single("clip", source)]);
    config.fps = 60.0;
    config.autoplay = autoplay;
    config
}

fn show(players: Vec<PlayerConfig>) -> ShowConfig {
    ShowConfig {
        name: "bench".into(),
        canvas: CanvasConfig {
            width: 8,
            height: 1,
        },
        objects: vec![LedObject::strip("bar", 0, 0, 8, 0)],
        outputs: vec![output(1, vec![0])],
        players,
        ..ShowConfig::default()
    }
}

fn start(show: ShowConfig) -> (ShowContext, MemoryNetwork) {
    let network = MemoryNetwork::new();
    let context = ShowContext::with_transport(show, network.factory()).unwrap();
    (context, network)
}

fn first_pixel(packet: &[u8]) -> Option<[u8; 3]> {
    match parse_packet(packet).ok()? {
        ArtPacket::Dmx { data, .. } => Some([data[0], data[1], data[2]]),
        ArtPacket::Sync => None,
    }
}

fn saw_color(network: &MemoryNetwork, output: u64, color: [u8; 3]) -> bool {
    network
        .packets(output)
        .iter()
        .any(|packet| first_pixel(packet) == Some(color))
}

#[test]
fn test_autoplay_player_reaches_the_wire() {
    let (context, network) = start(show(vec![player(1, solid([255, 0, 0]), true)]));
    assert!(wait_for(|| saw_color(&network, 1, [255, 0, 0])));
    assert_eq!(context.player_ids(), vec![1]);
    assert!(context.rejected().is_empty());
}

#[test]
fn test_player_waits_for_play() {
    let (context, network) = start(show(vec![player(1, solid([0, 0, 255]), false)]));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(network.total_packets(), 0);

    assert_eq!(context.play(1).unwrap(), PlayState::Playing);
    assert!(wait_for(|| saw_color(&network, 1, [0, 0, 255])));

    assert_eq!(context.stop(1).unwrap(), PlayState::Stopped);
    assert!(matches!(
        context.play(42),
        Err(ShowError::Media(ledmap_media::MediaError::PlayerNotFound(42)))
    ));
}

#[test]
fn test_load_clip_switches_playback() {
    let (context, network) = start(show(vec![player(1, solid([255, 0, 0]), true)]));
    assert!(wait_for(|| saw_color(&network, 1, [255, 0, 0])));

    let index = context
        .load_clip(1, ClipConfig::single("green", solid([0, 255, 0])))
        .unwrap();
    assert_eq!(index, 1);
    assert!(wait_for(|| saw_color(&network, 1, [0, 255, 0])));
    assert!(wait_for(|| context
        .player(1)
        .unwrap()
        .status()
        .clip_index
        == Some(1)));
}

#[test]
fn test_duplicate_players_keep_the_first() {
    let mut second = player(1, solid([0, 255, 0]), false);
    second.name = "shadow".into();
    let (context, _network) = start(show(vec![player(1, solid([255, 0, 0]), false), second]));

    assert_eq!(context.player_ids(), vec![1]);
    assert_eq!(context.player(1).unwrap().status().name, "main");
    assert!(!context.rejected().is_empty());
}

#[test]
fn test_output_changes_are_validated() {
    let (context, _network) = start(show(vec![]));

    context.add_output(output(2, vec![1])).unwrap();
    assert_eq!(context.outputs().len(), 2);

    // universe 0 already belongs to output 1
    let conflict = context.add_output(output(3, vec![0]));
    assert!(matches!(conflict, Err(ShowError::TopologyRejected(_))));
    assert_eq!(context.outputs().len(), 2);

    let mut paused = output(2, vec![1]);
    paused.active = false;
    context.update_output(paused).unwrap();
    assert!(!context.topology().output(2).unwrap().active);

    context.remove_output(2).unwrap();
    assert_eq!(context.outputs().len(), 1);
    assert!(matches!(
        context.remove_output(2),
        Err(ShowError::Control(ControlError::OutputNotFound(2)))
    ));
    assert!(matches!(
        context.update_output(output(7, vec![4])),
        Err(ShowError::Control(ControlError::OutputNotFound(7)))
    ));
}

#[test]
fn test_rejected_reload_keeps_topology() {
    let (context, _network) = start(show(vec![]));
    let before = context.topology();

    let result = context.reload_topology(
        vec![
            LedObject::strip("ok", 0, 0, 4, 0),
            LedObject::strip("off canvas", 0, 5, 4, 0),
        ],
        vec![output(1, vec![0])],
    );
    assert!(matches!(result, Err(ShowError::TopologyRejected(errors)) if !errors.is_empty()));
    assert!(Arc::ptr_eq(&before, &context.topology()));

    context
        .reload_topology(vec![LedObject::strip("short", 0, 0, 4, 0)], vec![output(1, vec![0])])
        .unwrap();
    assert_eq!(context.topology().point_count(), 4);
}

#[test]
fn test_status_covers_players_outputs_and_replay() {
    let (context, network) = start(show(vec![player(1, solid([9, 9, 9]), true)]));
    assert!(wait_for(|| network.total_packets() > 0));

    let status = context.status();
    assert_eq!(status.player(1).unwrap().state, PlayState::Playing);
    assert!(wait_for(|| context.status().output(1).unwrap().packets_sent > 0));
    assert!(!status.replay.active);
}

#[test]
fn test_status_publisher_delivers_snapshots() {
    let (context, _network) = start(show(vec![player(1, solid([1, 2, 3]), false)]));
    let context = Arc::new(context);
    let mut publisher = StatusPublisher::spawn(context.clone(), Duration::from_millis(10)).unwrap();

    let snapshot = publisher
        .receiver()
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(snapshot.players.len(), 1);
    assert_eq!(snapshot.outputs.len(), 1);
    publisher.stop();
}

#[test]
fn test_live_feed_drives_player() {
    let source = SourceDescriptor::Live {
        feed: "camera".into(),
    };
    let (context, network) = start(show(vec![player(1, source, true)]));
    let feed = context.live_feed("camera");

    assert!(wait_for(|| {
        feed.push(CanvasFrame::solid(8, 1, [0, 200, 100]));
        saw_color(&network, 1, [0, 200, 100])
    }));
}

#[test]
fn test_recording_replays_through_context() {
    let (context, network) = start(show(vec![player(1, solid([200, 100, 50]), true)]));
    assert!(matches!(context.stop_recording(), Err(ShowError::NotRecording)));

    context.start_recording("take");
    assert!(wait_for(|| network.total_packets() >= 5));
    let recording = context.stop_recording().unwrap();
    assert!(!recording.is_empty());
    assert_eq!(recording.name(), "take");

    context.stop(1).unwrap();
    thread::sleep(Duration::from_millis(50));
    network.clear();

    context.load_replay(recording);
    context.set_replay_loop(true);
    context.set_replay_brightness(0.5).unwrap();
    assert!(context.set_replay_speed(0.0).is_err());
    context.start_replay().unwrap();
    assert!(wait_for(|| saw_color(&network, 1, [100, 50, 25])));
    assert!(context.replay_status().active);
    assert!(context.status().output(1).unwrap().replay_claimed);

    context.stop_replay();
    assert!(!context.replay_status().active);
    assert!(!context.status().output(1).unwrap().replay_claimed);
}
