use std::collections::BTreeMap;
use std::fs;

use ledmap_core::{
    BitDepth, BlendMode, ChannelOrder, ClipConfig, EffectConfig, LayerConfig, LedObject,
    OutputConfig, ParamValue, PlaybackMode, PlayerConfig, SourceDescriptor, SyncRole,
    TransitionConfig,
};
use ledmap_io::{load_show, save_show, IoError, ShowConfig, MAX_SHOW_FILE_SIZE};
use tempfile::tempdir;

fn sample_show(media_root: std::path::PathBuf) -> ShowConfig {
    let mut strip = LedObject::strip("front", 0, 0, 16, 0);
    strip.channel_order = ChannelOrder::Grb;
    strip.bit_depth = BitDepth::Sixteen;

    let mut output = OutputConfig::new(1, "10.0.0.20", vec![0, 1]);
    output.artsync = true;
    output.delta.enabled = true;
    output.delta.threshold = 2;

    let mut params = BTreeMap::new();
    params.insert("color".to_string(), ParamValue::Color([255, 64, 0]));
    params.insert("speed".to_string(), ParamValue::Float(0.5));

    let mut overlay = LayerConfig::new(
        "overlay",
        SourceDescriptor::Generator {
            plugin: "rainbow".into(),
            params,
            duration_secs: Some(12.0),
        },
    );
    overlay.blend_mode = BlendMode::Screen;
    overlay.opacity = 0.5;
    overlay.effects = Some(vec![EffectConfig {
        plugin: "invert".into(),
        params: BTreeMap::new(),
    }]);

    let mut clip = ClipConfig::single("opener", SourceDescriptor::TestPattern { frames: 90 });
    clip.layers.push(overlay);
    clip.transport.mode = PlaybackMode::Bounce;
    clip.transport.loop_count = 3;
    clip.transition = Some(TransitionConfig {
        plugin: "crossfade".into(),
        frames: 15,
    });

    let mut main = PlayerConfig::new(1, "main", vec![clip]);
    main.fps = 40.0;
    main.role = SyncRole::Master;
    main.outputs = Some(vec![1]);
    let mut follower = PlayerConfig::new(
        2,
        "follower",
        vec![ClipConfig::single("idle", SourceDescriptor::Blank { frames: 10 })],
    );
    follower.role = SyncRole::Slave;
    follower.playlist_loop = true;

    ShowConfig {
        name: "Round trip".into(),
        media_root: Some(media_root),
        default_effects: vec![EffectConfig {
            plugin: "brightness".into(),
            params: [("level".to_string(), ParamValue::Float(0.75))]
                .into_iter()
                .collect(),
        }],
        objects: vec![strip],
        outputs: vec![output],
        players: vec![main, follower],
        ..ShowConfig::default()
    }
}

#[test]
fn test_show_survives_every_format() {
    let dir = tempdir().unwrap();
    let show = sample_show(dir.path().join("media"));
    for name in ["show.toml", "show.json", "show.ron"] {
        let path = dir.path().join(name);
        save_show(&show, &path).unwrap();
        let loaded = load_show(&path).unwrap();
        assert_eq!(loaded, show, "{}", name);
    }
}

#[test]
fn test_loaded_show_builds_topology() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("show.toml");
    let mut show = sample_show(dir.path().to_path_buf());
    show.outputs.push(OutputConfig::new(2, "10.0.0.21", vec![1]));
    save_show(&show, &path).unwrap();

    let loaded = load_show(&path).unwrap();
    let (topology, errors) = loaded.build_topology();
    // output 2 collides on universe 1 and is the only casualty
    assert_eq!(errors.len(), 1);
    assert_eq!(topology.outputs().len(), 1);
    assert_eq!(topology.objects().len(), 1);
    assert!(loaded.player_errors().is_empty());
}

#[test]
fn test_unparseable_and_oversized_files() {
    let dir = tempdir().unwrap();

    let garbage = dir.path().join("broken.json");
    fs::write(&garbage, "{ not json").unwrap();
    assert!(matches!(load_show(&garbage), Err(IoError::Json(_))));

    let unknown = dir.path().join("show.yaml");
    fs::write(&unknown, "name: x").unwrap();
    assert!(matches!(load_show(&unknown), Err(IoError::UnsupportedFormat(_))));

    let huge = dir.path().join("huge.toml");
    let file = fs::File::create(&huge).unwrap();
    file.set_len(MAX_SHOW_FILE_SIZE + 1).unwrap();
    assert!(matches!(load_show(&huge), Err(IoError::FileTooLarge { .. })));

    assert!(matches!(
        load_show(&dir.path().join("missing.toml")),
        Err(IoError::Io(_))
    ));
}

#[test]
fn test_v1_json_with_layers_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "players": [{
                "id": 3,
                "playlist": [
                    { "name": "a", "source": { "type": "blank", "frames": 5 } },
                    { "name": "b", "layers": [{ "source": { "type": "test_pattern", "frames": 8 } }] }
                ]
            }]
        }"#,
    )
    .unwrap();
    let show = load_show(&path).unwrap();
    let playlist = &show.players[0].playlist;
    assert_eq!(playlist[0].layers.len(), 1);
    assert_eq!(playlist[0].layers[0].source, SourceDescriptor::Blank { frames: 5 });
    assert_eq!(playlist[1].layers.len(), 1);
    assert!(show.players[0].autoplay);
}
