//! End-to-end routing and replay over an in-memory network

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ledmap_control::{
    parse_packet, ArtPacket, DmxRecorder, MemoryNetwork, OutputHub, ReplayManager, RoutedSink,
    RoutingEngine, SendOutcome,
};
use ledmap_core::{
    CanvasFrame, ChannelOrder, EventBus, FrameSink, LedObject, OutputConfig, RecordingBuilder,
    ShowEvent, Topology, UNIVERSE_SIZE,
};

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

struct Rig {
    network: MemoryNetwork,
    events: Arc<EventBus>,
    engine: Arc<RoutingEngine>,
}

fn rig(objects: Vec<LedObject>, outputs: Vec<OutputConfig>) -> Rig {
    let network = MemoryNetwork::new();
    let events = Arc::new(EventBus::new());
    let hub = Arc::new(OutputHub::new(network.factory(), events.clone()));
    let (topology, errors) = Topology::build(8, 2, objects, outputs);
    assert!(errors.is_empty(), "{:?}", errors);
    Rig {
        network,
        events,
        engine: Arc::new(RoutingEngine::new(topology, hub)),
    }
}

fn dmx(packet: &[u8]) -> (u16, Vec<u8>) {
    match parse_packet(packet).unwrap() {
        ArtPacket::Dmx { universe, data, .. } => (universe, data),
        ArtPacket::Sync => panic!("expected ArtDmx"),
    }
}

#[test]
fn test_grb_strip_on_the_wire() {
    let mut strip = LedObject::strip("bar", 0, 0, 2, 0);
    strip.channel_order = ChannelOrder::Grb;
    let rig = rig(vec![strip], vec![output(1, vec![0])]);

    let frame = CanvasFrame::from_fn(8, 2, |x, _| if x == 0 { [10, 20, 30] } else { [1, 2, 3] });
    rig.engine.route(&frame, None);

    let (universe, data) = dmx(&rig.network.packets(1)[0]);
    assert_eq!(universe, 0);
    assert_eq!(&data[..6], &[20, 10, 30, 2, 1, 3]);
    assert!(data[6..].iter().all(|v| *v == 0));
}

#[test]
fn test_universes_split_across_outputs() {
    let rig = rig(
        vec![
            LedObject::strip("top", 0, 0, 8, 0),
            LedObject::strip("bottom", 0, 1, 8, 1),
        ],
        vec![output(1, vec![0]), output(2, vec![1])],
    );
    let frame = CanvasFrame::from_fn(8, 2, |_, y| if y == 0 { [255, 0, 0] } else { [0, 0, 255] });
    let outcomes = rig.engine.route(&frame, None);
    assert_eq!(outcomes.len(), 2);

    let (u1, d1) = dmx(&rig.network.packets(1)[0]);
    let (u2, d2) = dmx(&rig.network.packets(2)[0]);
    assert_eq!((u1, &d1[..3]), (0, &[255, 0, 0][..]));
    assert_eq!((u2, &d2[..3]), (1, &[0, 0, 255][..]));
}

#[test]
fn test_delta_suppression_through_routing() {
    let mut config = output(1, vec![0]);
    config.delta.enabled = true;
    config.delta.threshold = 0;
    config.delta.full_sync_interval = 0;
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 4, 0)], vec![config]);

    let red = CanvasFrame::solid(8, 2, [255, 0, 0]);
    for _ in 0..5 {
        rig.engine.route(&red, None);
    }
    assert_eq!(rig.network.packets(1).len(), 1);

    // a pixel outside every object does not count as a change
    let moved = CanvasFrame::from_fn(8, 2, |x, y| if x == 7 && y == 1 { [9, 9, 9] } else { [255, 0, 0] });
    rig.engine.route(&moved, None);
    assert_eq!(rig.network.packets(1).len(), 1);

    rig.engine.route(&CanvasFrame::solid(8, 2, [254, 0, 0]), None);
    assert_eq!(rig.network.packets(1).len(), 2);
}

#[test]
fn test_artsync_after_each_ticks_universes() {
    let mut config = output(1, vec![0, 1]);
    config.artsync = true;
    let rig = rig(
        vec![
            LedObject::strip("top", 0, 0, 8, 0),
            LedObject::strip("bottom", 0, 1, 8, 1),
        ],
        vec![config],
    );
    rig.engine.route(&CanvasFrame::solid(8, 2, [1, 1, 1]), None);
    rig.engine.route(&CanvasFrame::solid(8, 2, [2, 2, 2]), None);

    let kinds: Vec<&str> = rig
        .network
        .packets(1)
        .iter()
        .map(|p| match parse_packet(p).unwrap() {
            ArtPacket::Dmx { .. } => "dmx",
            ArtPacket::Sync => "sync",
        })
        .collect();
    assert_eq!(kinds, vec!["dmx", "dmx", "sync", "dmx", "dmx", "sync"]);
}

#[test]
fn test_failing_output_does_not_stop_others() {
    let rig = rig(
        vec![
            LedObject::strip("top", 0, 0, 8, 0),
            LedObject::strip("bottom", 0, 1, 8, 1),
        ],
        vec![output(1, vec![0]), output(2, vec![1])],
    );
    let rx = rig.events.subscribe();
    rig.network.set_failing(1, true);

    let outcomes = rig.engine.route(&CanvasFrame::solid(8, 2, [5, 5, 5]), None);
    assert_eq!(outcomes[&1], SendOutcome::Failed);
    assert!(matches!(outcomes[&2], SendOutcome::Sent { .. }));
    assert!(matches!(rx.try_recv(), Ok(ShowEvent::OutputError { output: 1, .. })));
}

#[test]
fn test_routed_sink_limited_to_outputs() {
    let rig = rig(
        vec![
            LedObject::strip("top", 0, 0, 8, 0),
            LedObject::strip("bottom", 0, 1, 8, 1),
        ],
        vec![output(1, vec![0]), output(2, vec![1])],
    );
    let sink = RoutedSink::new(rig.engine.clone(), Some(vec![2]));
    sink.submit(&CanvasFrame::solid(8, 2, [7, 7, 7]));
    assert!(rig.network.packets(1).is_empty());
    assert_eq!(rig.network.packets(2).len(), 1);

    let only_one: BTreeSet<u64> = [1].into_iter().collect();
    rig.engine.route(&CanvasFrame::solid(8, 2, [8, 8, 8]), Some(&only_one));
    assert_eq!(rig.network.packets(1).len(), 1);
}

#[test]
fn test_topology_swap_reconfigures_outputs() {
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 4, 0)], vec![output(1, vec![0])]);
    let (next, errors) = rig.engine.topology().with_outputs(vec![output(3, vec![0])]);
    assert!(errors.is_empty());
    rig.engine.swap_topology(next);

    rig.engine.route(&CanvasFrame::solid(8, 2, [1, 2, 3]), None);
    assert!(rig.network.packets(1).is_empty());
    assert_eq!(rig.network.packets(3).len(), 1);
    assert_eq!(rig.engine.hub().output_ids(), vec![3]);
}

#[test]
fn test_mismatched_frame_dropped() {
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 4, 0)], vec![output(1, vec![0])]);
    assert!(rig.engine.route(&CanvasFrame::black(4, 4), None).is_empty());
    assert_eq!(rig.network.total_packets(), 0);
}

fn recording(values: &[u8], step: f64) -> ledmap_core::ReplayRecording {
    let mut builder = RecordingBuilder::new("take", (8, 2), 8, vec![0]);
    for (i, v) in values.iter().enumerate() {
        builder.push(i as f64 * step, vec![*v; UNIVERSE_SIZE]);
    }
    builder.finish().unwrap()
}

#[test]
fn test_replay_preempts_live_output() {
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 8, 0)], vec![output(1, vec![0])]);
    let rx = rig.events.subscribe();
    let mut replay = ReplayManager::new(rig.engine.clone(), rig.events.clone(), 100.0);
    replay.load(recording(&[200, 201, 202], 0.05));
    replay.set_loop(true);
    replay.start().unwrap();
    assert!(replay.status().active);

    let live = CanvasFrame::solid(8, 2, [9, 9, 9]);
    let outcomes = rig.engine.route(&live, None);
    assert_eq!(outcomes[&1], SendOutcome::Claimed);

    assert!(wait_for(|| rig.network.packets(1).len() >= 3));
    replay.stop();
    assert!(!replay.status().active);

    for packet in rig.network.packets(1) {
        let (_, data) = dmx(&packet);
        assert!((200..=202).contains(&data[0]), "live frame leaked: {}", data[0]);
    }

    rig.network.clear();
    assert!(matches!(rig.engine.route(&live, None)[&1], SendOutcome::Sent { .. }));
    assert_eq!(dmx(&rig.network.packets(1)[0]).1[0], 9);

    let events: Vec<ShowEvent> = rx.try_iter().collect();
    assert!(events.contains(&ShowEvent::ReplayStarted { name: "take".into() }));
    assert!(events.contains(&ShowEvent::ReplayStopped { name: "take".into() }));
}

#[test]
fn test_replay_ends_and_releases_outputs() {
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 8, 0)], vec![output(1, vec![0])]);
    let mut replay = ReplayManager::new(rig.engine.clone(), rig.events.clone(), 100.0);
    replay.load(recording(&[100, 120], 0.02));
    replay.set_brightness(0.5).unwrap();
    replay.start().unwrap();

    assert!(wait_for(|| !replay.is_active()));
    let hub = rig.engine.hub();
    assert!(!hub.status(1).unwrap().replay_claimed);

    let sent: Vec<u8> = rig
        .network
        .packets(1)
        .iter()
        .map(|p| dmx(p).1[0])
        .collect();
    assert_eq!(sent.first(), Some(&50));
    assert_eq!(sent.last(), Some(&60));
    assert_eq!(replay.status().position_secs, 0.02);
}

#[test]
fn test_replay_rejects_bad_settings() {
    let rig = rig(vec![], vec![output(1, vec![0])]);
    let mut replay = ReplayManager::new(rig.engine.clone(), rig.events.clone(), 0.0);
    assert!(replay.start().is_err());
    assert!(replay.set_speed(0.0).is_err());
    assert!(replay.set_speed(f64::NAN).is_err());
    assert!(replay.set_brightness(-1.0).is_err());
    assert!(replay.toggle_loop());
    assert!(!replay.toggle_loop());
}

#[test]
fn test_recorded_output_replays_identically() {
    let rig = rig(vec![LedObject::strip("bar", 0, 0, 8, 0)], vec![output(1, vec![0])]);
    let topology = rig.engine.topology();
    let recorder = Arc::new(DmxRecorder::new(
        "capture",
        topology.canvas_size(),
        topology.point_count(),
        topology.universes(),
    ));
    rig.engine.attach_recorder(recorder.clone());
    rig.engine.route(&CanvasFrame::solid(8, 2, [40, 50, 60]), None);
    rig.engine.detach_recorder();
    rig.engine.route(&CanvasFrame::solid(8, 2, [1, 1, 1]), None);

    let captured = recorder.finish().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured.metadata().point_count, 8);

    let live_packet = dmx(&rig.network.packets(1)[0]).1;
    rig.network.clear();
    let mut replay = ReplayManager::new(rig.engine.clone(), rig.events.clone(), 100.0);
    replay.load(captured);
    replay.start().unwrap();
    assert!(wait_for(|| !replay.is_active()));
    assert_eq!(dmx(&rig.network.packets(1)[0]).1, live_packet);
}

#[test]
fn test_recorder_matches_filtered_routes() {
    let rig = rig(
        vec![
            LedObject::strip("top", 0, 0, 8, 0),
            LedObject::strip("bottom", 0, 1, 8, 1),
        ],
        vec![output(1, vec![0]), output(2, vec![1])],
    );
    let topology = rig.engine.topology();
    let recorder = Arc::new(DmxRecorder::new(
        "two players",
        topology.canvas_size(),
        topology.point_count(),
        topology.universes(),
    ));
    rig.engine.attach_recorder(recorder.clone());

    let first: BTreeSet<u64> = [1].into_iter().collect();
    let second: BTreeSet<u64> = [2].into_iter().collect();
    rig.engine.route(&CanvasFrame::solid(8, 2, [255, 0, 0]), Some(&first));
    rig.engine.route(&CanvasFrame::solid(8, 2, [0, 0, 255]), Some(&second));
    rig.engine.detach_recorder();

    let captured = recorder.finish().unwrap();
    assert_eq!(captured.len(), 1);
    let payloads = captured.universe_payloads(&captured.frames()[0]);
    assert_eq!(payloads[0].0, 0);
    assert_eq!(payloads[0].1[..3], [255, 0, 0]);
    assert_eq!(payloads[1].0, 1);
    assert_eq!(payloads[1].1[..3], [0, 0, 255]);

    // the capture holds exactly what each output put on the wire
    assert_eq!(dmx(&rig.network.packets(1)[0]).1, payloads[0].1.to_vec());
    assert_eq!(dmx(&rig.network.packets(2)[0]).1, payloads[1].1.to_vec());
}
