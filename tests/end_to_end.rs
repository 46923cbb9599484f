//! Whole-engine scenarios driven through the public API.

use sfplayer::bank::builtin::{sine_soundfont, SoundFontWriter};
use sfplayer::bridge::{ControlBridge, Request, Response};
use sfplayer::{EngineConfig, EngineError, NotFoundError, Renderer, SynthesisCore};

const BLOCK: usize = 128;

fn render(renderer: &mut Renderer) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    assert!(renderer.render(&mut left, &mut right));
    (left, right)
}

fn silent(buffer: &[f32]) -> bool {
    buffer.iter().all(|s| *s == 0.0)
}

#[test]
fn test_note_sounds_then_decays() {
    let (mut core, mut renderer) =
        SynthesisCore::new(&EngineConfig::with_sample_rate(48000)).unwrap();
    let bank = core.load_bank("sin.sf2", &sine_soundfont()).unwrap();
    assert_eq!(bank.presets.len(), 1);
    assert_eq!(bank.presets[0].name, "Sine Wave");
    assert_eq!((bank.presets[0].bank, bank.presets[0].program), (0, 0));

    // The default bank is already selected.
    assert!(core.snapshot_state().current_preset.is_some());

    core.note_on(72, 100);
    let (left, right) = render(&mut renderer);
    assert!(!silent(&left) || !silent(&right));

    core.note_off(72);
    let mut blocks = 0;
    loop {
        let (left, right) = render(&mut renderer);
        if silent(&left) && silent(&right) {
            break;
        }
        blocks += 1;
        assert!(blocks < 500, "output never went silent");
    }
    assert_eq!(renderer.active_voices(), 0);
}

#[test]
fn test_colliding_bank_names() {
    let (mut core, mut renderer) = SynthesisCore::new(&EngineConfig::default()).unwrap();
    let bytes = sine_soundfont();
    let first = core.load_bank("sin.sf2", &bytes).unwrap();
    let second = core.load_bank("sin.sf2", &bytes).unwrap();
    assert_ne!(first.id, second.id);
    assert_ne!(first.presets[0].id, second.presets[0].id);

    let ids: Vec<String> = core.list_banks().into_iter().map(|b| b.id).collect();
    assert!(ids.contains(&first.id));
    assert!(ids.contains(&second.id));

    for bank in [&first, &second] {
        core.select_preset(&bank.id, &bank.presets[0].id).unwrap();
        render(&mut renderer);
        let state = core.snapshot_state();
        assert_eq!(
            state.current_preset.as_ref().map(|p| p.soundfont_id.as_str()),
            Some(bank.id.as_str())
        );
        assert_eq!(state.current_bank.as_deref(), Some(bank.id.as_str()));
    }
}

#[test]
fn test_failures_leave_state_unchanged() {
    let (mut core, mut renderer) = SynthesisCore::new(&EngineConfig::default()).unwrap();
    core.load_bank("sin.sf2", &sine_soundfont()).unwrap();
    let banks = core.list_banks();
    let preset = core.snapshot_state().current_preset.clone();

    assert!(matches!(
        core.load_bank("broken.sf2", b"RIFF\x04\x00\x00\x00sfbk"),
        Err(EngineError::Decode(_))
    ));
    assert_eq!(core.list_banks(), banks);

    let err = core.select_preset("never-loaded", "x").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(NotFoundError::Bank(_))));
    render(&mut renderer);
    assert_eq!(core.snapshot_state().current_preset, preset);
}

#[test]
fn test_gain_twice_matches_once() {
    let play = |calls: usize| {
        let (mut core, mut renderer) = SynthesisCore::new(&EngineConfig::default()).unwrap();
        for _ in 0..calls {
            core.set_gain(0.3).unwrap();
        }
        core.note_on(64, 90);
        let mut out = Vec::new();
        for _ in 0..4 {
            out.extend(render(&mut renderer).0);
        }
        out
    };
    assert_eq!(play(1), play(2));
}

#[test]
fn test_presets_by_numbers_in_multi_preset_bank() {
    let (mut core, mut renderer) = SynthesisCore::new(&EngineConfig::default()).unwrap();
    let bytes = SoundFontWriter::new("GM")
        .preset("Piano", 0, 0)
        .preset("Strings", 0, 48)
        .preset("Kit", 128, 0)
        .build();
    let bank = core.load_bank("gm.sf2", &bytes).unwrap();
    assert_eq!(bank.presets.len(), 3);

    core.select_preset_by_numbers("gm.sf2", 128, 0).unwrap();
    render(&mut renderer);
    let state = core.snapshot_state();
    assert_eq!(
        state.current_preset.as_ref().map(|p| p.name.as_str()),
        Some("Kit")
    );
}

#[test]
fn test_bridge_json_session() {
    let (mut bridge, mut port) = ControlBridge::new();
    let mut process = || {
        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
        assert!(port.process(&mut outputs));
        left
    };

    assert!(silent(&process()));
    assert_eq!(
        bridge.handle_json(r#"{"type":"initialize","config":{"sample_rate":48000}}"#),
        r#"{"type":"ok"}"#
    );

    let data = serde_json::to_string(&sine_soundfont()).unwrap();
    let reply: serde_json::Value = serde_json::from_str(&bridge.handle_json(&format!(
        r#"{{"type":"add_soundfont","name":"sin.sf2","data":{}}}"#,
        data
    )))
    .unwrap();
    assert_eq!(reply["type"], "bank_added");
    assert_eq!(reply["bank"]["id"], "sin.sf2");
    let preset_id = reply["bank"]["presets"][0]["id"].as_str().unwrap().to_string();

    let request = serde_json::to_string(&Request::SetPreset {
        bank_id: "sin.sf2".to_string(),
        preset_id,
    })
    .unwrap();
    assert_eq!(bridge.handle_json(&request), r#"{"type":"ok"}"#);

    bridge.handle_json(r#"{"type":"note_on","key":72,"velocity":100}"#);
    assert!(!silent(&process()));

    match bridge.handle(Request::GetState) {
        Response::State { state } => {
            assert_eq!(state.current_bank.as_deref(), Some("sin.sf2"));
            assert_eq!(state.active_voices, 1);
            assert_eq!(state.banks.len(), 2);
        }
        other => panic!("expected state, got {:?}", other),
    }
}
