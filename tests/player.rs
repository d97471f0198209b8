//! End-to-end scenario: a flat song player with guarded volume control,
//! raised events, deferred audio effects, and an eventless return to loading
//! when the song runs out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use statecraft::{
    Action, Assigner, Context, Event, Interpreter, MachineBuilder, Registry, StateBuilder,
    TransitionBuilder,
};

struct Player {
    interpreter: Interpreter,
    play_calls: Arc<AtomicUsize>,
    pause_calls: Arc<AtomicUsize>,
    skip_calls: Arc<AtomicUsize>,
}

fn data_field(event: &Event, key: &str) -> Value {
    event
        .get("data")
        .and_then(|data| data.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

fn player() -> Player {
    let play_calls = Arc::new(AtomicUsize::new(0));
    let pause_calls = Arc::new(AtomicUsize::new(0));
    let skip_calls = Arc::new(AtomicUsize::new(0));

    let plays = Arc::clone(&play_calls);
    let pauses = Arc::clone(&pause_calls);
    let skips = Arc::clone(&skip_calls);
    let registry = Registry::new()
        .guard("volumeWithinRange", |_: &Context, event: &Event| {
            event
                .get_i64("level")
                .map(|level| (0..=10).contains(&level))
                .unwrap_or(false)
        })
        .guard("songEnded", |ctx: &Context, _: &Event| {
            let duration = ctx.get_i64("duration").unwrap_or(0);
            duration > 0 && ctx.get_i64("currentTime").unwrap_or(0) >= duration
        })
        .guard("unliked", |ctx: &Context, _: &Event| {
            ctx.get_str("likeStatus") == Some("unliked")
        })
        .guard("liked", |ctx: &Context, _: &Event| {
            ctx.get_str("likeStatus") == Some("liked")
        })
        .compute("songTitle", |_: &Context, event: &Event| {
            data_field(event, "title")
        })
        .compute("songArtist", |_: &Context, event: &Event| {
            data_field(event, "artist")
        })
        .compute("songDuration", |_: &Context, event: &Event| {
            data_field(event, "duration")
        })
        .compute("assignVolume", |_: &Context, event: &Event| {
            event.get("level").cloned().unwrap_or(Value::Null)
        })
        .compute("assignTime", |_: &Context, event: &Event| {
            event.get("currentTime").cloned().unwrap_or(Value::Null)
        })
        .effect("playAudio", move |_: &Context, _: &Event| {
            plays.fetch_add(1, Ordering::SeqCst);
        })
        .effect("pauseAudio", move |_: &Context, _: &Event| {
            pauses.fetch_add(1, Ordering::SeqCst);
        })
        .effect("skipSong", move |_: &Context, _: &Event| {
            skips.fetch_add(1, Ordering::SeqCst);
        });

    let assign_song = Action::assign([
        ("title", Assigner::compute("songTitle")),
        ("artist", Assigner::compute("songArtist")),
        ("duration", Assigner::compute("songDuration")),
        ("currentTime", Assigner::value(json!(0))),
    ]);

    let machine = MachineBuilder::new("player")
        .context(
            Context::new()
                .with("title", Value::Null)
                .with("artist", Value::Null)
                .with("duration", json!(0))
                .with("currentTime", json!(0))
                .with("likeStatus", json!("unliked"))
                .with("volume", json!(5)),
        )
        .registry(registry)
        .state(
            StateBuilder::compound("player")
                .initial("loading")
                .child(
                    StateBuilder::atomic("loading").tag("busy").on(
                        "LOADED",
                        TransitionBuilder::new().target("playing").action(assign_song),
                    ),
                )
                .child(
                    StateBuilder::atomic("playing")
                        .entry(Action::effect("playAudio"))
                        .on("PAUSE", TransitionBuilder::new().target("paused"))
                        .always(TransitionBuilder::new().guard("songEnded").target("loading")),
                )
                .child(
                    StateBuilder::atomic("paused")
                        .entry(Action::effect("pauseAudio"))
                        .on("PLAY", TransitionBuilder::new().target("playing")),
                )
                .on(
                    "SKIP",
                    TransitionBuilder::new()
                        .target(".loading")
                        .action(Action::effect("skipSong")),
                )
                .on("DISLIKE", TransitionBuilder::new().action(Action::raise("SKIP")))
                .on(
                    "LIKE.TOGGLE",
                    TransitionBuilder::new()
                        .guard("unliked")
                        .action(Action::assign_value("likeStatus", json!("liked"))),
                )
                .on(
                    "LIKE.TOGGLE",
                    TransitionBuilder::new()
                        .guard("liked")
                        .action(Action::assign_value("likeStatus", json!("unliked"))),
                )
                .on(
                    "VOLUME",
                    TransitionBuilder::new()
                        .guard("volumeWithinRange")
                        .action(Action::assign([("volume", Assigner::compute("assignVolume"))])),
                )
                .on(
                    "AUDIO.TIME",
                    TransitionBuilder::new()
                        .action(Action::assign([("currentTime", Assigner::compute("assignTime"))])),
                ),
        )
        .build()
        .expect("player machine is valid");

    Player {
        interpreter: machine.interpret(),
        play_calls,
        pause_calls,
        skip_calls,
    }
}

fn loaded_song() -> Event {
    Event::new("LOADED").field(
        "data",
        json!({ "title": "Song A", "artist": "Band X", "duration": 100 }),
    )
}

#[test]
fn starts_in_loading_with_defaults() {
    let player = player();
    let snapshot = player.interpreter.start().unwrap();
    assert!(snapshot.matches("player.loading"));
    assert!(snapshot.has_tag("busy"));
    assert_eq!(snapshot.context().get_i64("volume"), Some(5));
    assert!(snapshot.can(&loaded_song()));
    assert!(!snapshot.can(&Event::new("PLAY")));
}

#[test]
fn loading_a_song_starts_playback() {
    let player = player();
    player.interpreter.start().unwrap();
    let snapshot = player.interpreter.send(loaded_song()).unwrap();
    assert!(snapshot.matches("player.playing"));
    assert!(!snapshot.has_tag("busy"));
    assert_eq!(snapshot.context().get_str("title"), Some("Song A"));
    assert_eq!(snapshot.context().get_i64("duration"), Some(100));
    assert_eq!(snapshot.context().get_i64("currentTime"), Some(0));
    assert_eq!(player.play_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn pause_and_resume_run_their_audio_effects() {
    let player = player();
    player.interpreter.start().unwrap();
    player.interpreter.send(loaded_song()).unwrap();

    let snapshot = player.interpreter.send(Event::new("PAUSE")).unwrap();
    assert!(snapshot.matches("player.paused"));
    assert_eq!(player.pause_calls.load(Ordering::SeqCst), 1);

    let snapshot = player.interpreter.send(Event::new("PLAY")).unwrap();
    assert!(snapshot.matches("player.playing"));
    assert_eq!(player.play_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn out_of_range_volume_is_ignored_entirely() {
    let player = player();
    player.interpreter.start().unwrap();
    let before = player.interpreter.send(loaded_song()).unwrap();

    let after = player
        .interpreter
        .send(Event::new("VOLUME").field("level", json!(15)))
        .unwrap();
    // The guard rejected the transition; not even a new snapshot was made.
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.context().get_i64("volume"), Some(5));

    let after = player
        .interpreter
        .send(Event::new("VOLUME").field("level", json!(7)))
        .unwrap();
    assert_eq!(after.context().get_i64("volume"), Some(7));
    assert!(after.matches("player.playing"));
}

#[test]
fn like_toggle_alternates_by_guard() {
    let player = player();
    player.interpreter.start().unwrap();

    let snapshot = player.interpreter.send(Event::new("LIKE.TOGGLE")).unwrap();
    assert_eq!(snapshot.context().get_str("likeStatus"), Some("liked"));

    let snapshot = player.interpreter.send(Event::new("LIKE.TOGGLE")).unwrap();
    assert_eq!(snapshot.context().get_str("likeStatus"), Some("unliked"));
}

#[test]
fn dislike_raises_skip_before_anything_else() {
    let player = player();
    player.interpreter.start().unwrap();
    player.interpreter.send(loaded_song()).unwrap();

    let snapshot = player.interpreter.send(Event::new("DISLIKE")).unwrap();
    assert!(snapshot.matches("player.loading"));
    assert_eq!(player.skip_calls.load(Ordering::SeqCst), 1);

    let types: Vec<String> = player
        .interpreter
        .log()
        .iter()
        .map(|record| record.event_type.clone())
        .collect();
    assert_eq!(
        types,
        vec!["statecraft.init", "LOADED", "DISLIKE", "SKIP"]
    );
}

#[test]
fn song_end_returns_to_loading_in_the_same_send() {
    let player = player();
    player.interpreter.start().unwrap();
    player.interpreter.send(loaded_song()).unwrap();

    let snapshot = player
        .interpreter
        .send(Event::new("AUDIO.TIME").field("currentTime", json!(100)))
        .unwrap();
    // The eventless transition fired within the same macrostep.
    assert!(snapshot.matches("player.loading"));
    assert_eq!(snapshot.context().get_i64("currentTime"), Some(100));
}
