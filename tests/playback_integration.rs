//! Stream → play end-to-end playback verification.
//!
//! Renders offline onto the in-memory card and checks the mixed cycles.
//!
//! Run with:
//! ```bash
//! cargo test -p ostinato --test playback_integration
//! ```

use std::sync::Arc;

use ostinato::prelude::*;
use ostinato::core::recall::RecallLevel;

fn build_voice_templates(audio: &Arc<Audio>, level: f32, length: f32, volume: f32) {
    for channel in audio.output_channels() {
        let stream = Recall::template(
            "stream",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(StreamChannelRun::new()),
        );
        stream.add_port(Port::new(
            StreamChannelRun::LEVEL_PORT,
            PortValue::Float(level),
        ));
        stream.add_port(Port::new(
            StreamChannelRun::LENGTH_PORT,
            PortValue::Float(length),
        ));
        stream.attach(GraphNode::Channel(channel.clone()));
        channel.add_recall(stream.clone());

        let play = Recall::template(
            "play",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(PlayChannelRun::new()),
        );
        play.add_dependency(RecallDependency::on(&stream));
        play.add_port(Port::new(
            PlayChannelRun::VOLUME_PORT,
            PortValue::Float(volume),
        ));
        play.attach(GraphNode::Channel(channel.clone()));
        channel.add_recall(play);
    }
}

fn offline_engine(card: Arc<MemorySoundcard>) -> OstinatoEngine {
    OstinatoEngine::builder()
        .soundcard(card)
        .offline()
        .build()
        .expect("failed to build offline engine")
}

#[test]
fn test_voice_reaches_the_card() {
    let presets = SoundcardPresets::new(2, 44100, 16).unwrap();
    let card = Arc::new(MemorySoundcard::new(presets));
    let engine = offline_engine(card.clone());

    let audio = engine.new_audio("synth", 2, 1, 0);
    build_voice_templates(&audio, 1.0, 4.0, 0.5);

    engine.append_audio(&audio);
    engine.process_offline(1).unwrap();
    let (_, completion) = engine.start_audio(&audio, SoundScope::Playback);
    engine.process_offline(4).unwrap();
    assert!(completion.is_ready());

    // 5 transfers happened; cycles 1..=4 carry the voice, interleaved on
    // both lines at level * volume.
    let history = card.history();
    assert_eq!(history.len(), 5);
    for cycle in &history[1..5] {
        for sample in cycle {
            assert!((sample - 0.5).abs() < 1e-6, "expected 0.5, got {sample}");
        }
    }

    // Note ended: both recalls reached done, the live signals are released.
    assert_eq!(engine.system().registry().len(), 0);
    for channel in audio.output_channels() {
        let recycling = channel.first_recycling().unwrap();
        assert!(recycling.live_signals().is_empty());
        assert!(recycling.template().is_template());
    }

    // Later cycles are silent again.
    engine.process_offline(1).unwrap();
    let last = card.history().pop().unwrap();
    assert!(last.iter().all(|&s| s == 0.0));
}

#[test]
fn test_two_voices_mix_additively() {
    let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
    let card = Arc::new(MemorySoundcard::new(presets));
    let engine = offline_engine(card.clone());

    let audio = engine.new_audio("poly", 1, 1, 0);
    build_voice_templates(&audio, 1.0, 3.0, 1.0);

    engine.append_audio(&audio);
    engine.process_offline(1).unwrap();

    // Two concurrent runs of the same audio: distinct recall ids, distinct
    // signals, one shared hardware buffer.
    let (id_a, _) = engine.start_audio(&audio, SoundScope::Playback);
    let (id_b, _) = engine.start_audio(&audio, SoundScope::Playback);
    assert_ne!(id_a.id(), id_b.id());

    engine.process_offline(3).unwrap();

    let history = card.history();
    for cycle in &history[1..4] {
        for sample in cycle {
            assert!((sample - 2.0).abs() < 1e-6, "expected 2.0, got {sample}");
        }
    }
    assert_eq!(engine.system().registry().len(), 0);
}

#[test]
fn test_cancel_stops_an_endless_voice() {
    let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
    let card = Arc::new(MemorySoundcard::new(presets));
    let engine = offline_engine(card.clone());

    let audio = engine.new_audio("drone", 1, 1, 0);
    // length 0: streams until canceled.
    build_voice_templates(&audio, 0.25, 0.0, 1.0);

    engine.append_audio(&audio);
    engine.process_offline(1).unwrap();
    let (recall_id, _) = engine.start_audio(&audio, SoundScope::Playback);
    engine.process_offline(3).unwrap();

    assert_eq!(engine.system().registry().len(), 2);
    assert!(card.history().pop().unwrap().iter().all(|&s| s == 0.25));

    engine.cancel_audio(&audio, &recall_id);
    engine.process_offline(1).unwrap();

    assert_eq!(engine.system().registry().len(), 0);
    assert!(recall_id.context().parent().is_none());

    // The next cycle is silent; the voice's signal is gone.
    engine.process_offline(1).unwrap();
    assert!(card.history().pop().unwrap().iter().all(|&s| s == 0.0));
    let recycling = audio
        .output_channel(0, 0)
        .unwrap()
        .first_recycling()
        .unwrap();
    assert!(recycling.live_signals().is_empty());
}

#[test]
fn test_super_threaded_matches_single_threaded_output() {
    let presets = SoundcardPresets::new(2, 44100, 16).unwrap();

    let render = |super_threaded: bool| -> Vec<Vec<f32>> {
        let card = Arc::new(MemorySoundcard::new(presets));
        let mut builder = OstinatoEngine::builder().soundcard(card.clone()).offline();
        if super_threaded {
            builder = builder.super_threaded();
        }
        let engine = builder.build().unwrap();

        let audio = engine.new_audio("synth", 2, 1, 0);
        audio.playback_domain().enable_super_threaded(SoundScope::Playback);
        build_voice_templates(&audio, 1.0, 3.0, 1.0);

        engine.append_audio(&audio);
        engine.process_offline(1).unwrap();
        engine.start_audio(&audio, SoundScope::Playback);
        engine.process_offline(4).unwrap();
        card.history()
    };

    // Offline processing walks single-threaded either way; the flag must
    // not change what lands on the card.
    assert_eq!(render(false), render(true));
}
