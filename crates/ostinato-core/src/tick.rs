//! The three-phase tick walk over the processing graph.
//!
//! Traversal is deterministic: audios in engine order, audio-level recalls
//! before channel-level ones, channels output before input, then each
//! recall's children in recycling-chain and signal order. Phases run
//! breadth-first: every pre call across the whole tree completes before the
//! first inter call, and every inter before the first post. Staging of
//! freshly duplicated instances happens in rounds at the top of the tick, so
//! children spawned during init join the same tick.

use std::sync::Arc;

use crate::graph::Audio;
use crate::recall::{Recall, RunEnv, StagingState};

/// Steady-state phase of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Inter,
    Post,
}

fn flatten(recall: &Arc<Recall>, out: &mut Vec<Arc<Recall>>) {
    out.push(recall.clone());
    for child in recall.children() {
        flatten(&child, out);
    }
}

/// Recall instances of one channel (channel-run level and below), traversal
/// order.
pub fn collect_channel_instances(channel: &crate::graph::Channel) -> Vec<Arc<Recall>> {
    let mut out = Vec::new();
    for recall in channel.recalls() {
        if !recall.is_template() {
            flatten(&recall, &mut out);
        }
    }
    out
}

/// Audio-level recall instances only (the portion an audio thread runs
/// itself when channel workers take the channel subtrees).
pub fn collect_audio_level_instances(audio: &Arc<Audio>) -> Vec<Arc<Recall>> {
    let mut out = Vec::new();
    for recall in audio.recalls() {
        if !recall.is_template() {
            flatten(&recall, &mut out);
        }
    }
    out
}

/// Recall instances of one audio, traversal order: audio level first, then
/// channels (output before input) with their subtrees.
pub fn collect_audio_instances(audio: &Arc<Audio>) -> Vec<Arc<Recall>> {
    let mut out = Vec::new();
    for recall in audio.recalls() {
        if !recall.is_template() {
            flatten(&recall, &mut out);
        }
    }
    for channel in audio.channels() {
        out.extend(collect_channel_instances(&channel));
    }
    out
}

/// All live recall instances, engine order.
pub fn collect_instances(audios: &[Arc<Audio>]) -> Vec<Arc<Recall>> {
    let mut out = Vec::new();
    for audio in audios {
        out.extend(collect_audio_instances(audio));
    }
    out
}

/// Stage every freshly created instance: resolve dependencies, then the init
/// phases in strict pre → inter → post rounds. Children spawned while a
/// round initializes are picked up by the next round until none remain.
pub fn stage_created(audios: &[Arc<Audio>], env: &RunEnv) {
    loop {
        let created: Vec<_> = collect_instances(audios)
            .into_iter()
            .filter(|recall| recall.state() == StagingState::Created)
            .collect();
        if created.is_empty() {
            return;
        }

        for recall in &created {
            recall.resolve_dependency(&env.registry);
        }
        for recall in &created {
            recall.run_init_pre(env);
        }
        for recall in &created {
            recall.run_init_inter(env);
        }
        for recall in &created {
            recall.run_init_post(env);
        }
    }
}

/// Run one phase over a slice of instances, preserving order.
pub fn run_phase(recalls: &[Arc<Recall>], phase: Phase, env: &RunEnv) {
    for recall in recalls {
        match phase {
            Phase::Pre => recall.run_pre(env),
            Phase::Inter => recall.run_inter(env),
            Phase::Post => recall.run_post(env),
        }
    }
}

/// End-of-tick bookkeeping: poll cooperative completion, drive finished
/// instances to done, clear initial-run markers.
pub fn finish_tick(recalls: &[Arc<Recall>], env: &RunEnv) {
    for recall in recalls {
        if recall.check_finished(env) {
            recall.done(env);
            recall.dispose();
        }
    }
    for recall in recalls {
        if let Some(recall_id) = recall.recall_id() {
            recall_id.clear_initial_run();
        }
    }
}

/// One complete single-threaded tick over `audios`.
pub fn run_tick(audios: &[Arc<Audio>], env: &RunEnv) {
    stage_created(audios, env);

    let active = collect_instances(audios);
    run_phase(&active, Phase::Pre, env);
    run_phase(&active, Phase::Inter, env);
    run_phase(&active, Phase::Post, env);

    finish_tick(&active, env);
}
