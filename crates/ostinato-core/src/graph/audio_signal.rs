//! Audio signals: lazy sequences of fixed-size sample buffers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{SampleFormat, SoundcardPresets};
use crate::context::RecallId;
use crate::lockfree::{AtomicFlag, IdSource};

static SIGNAL_IDS: IdSource = IdSource::new();

/// Buffer-level metadata of a signal: samplerate, format, frames per buffer
/// and the attack offset of the first buffer within the hardware cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalFormat {
    pub samplerate: u32,
    pub buffer_size: usize,
    pub format: SampleFormat,
    pub attack: usize,
}

impl SignalFormat {
    pub fn from_presets(presets: &SoundcardPresets) -> Self {
        Self {
            samplerate: presets.samplerate,
            buffer_size: presets.buffer_size,
            format: presets.format,
            attack: 0,
        }
    }
}

/// One concrete stream of sample buffers flowing through a recycling.
///
/// Exactly one signal per recycling is the template: a prototype that is
/// never played itself, only duplicated when a recycling context first
/// touches the recycling. Live signals are each tied to one recall id and
/// are dropped when their recall instance reaches done.
pub struct AudioSignal {
    id: u64,
    template: bool,
    format: SignalFormat,
    recall_id: Mutex<Option<Arc<RecallId>>>,
    stream: Mutex<VecDeque<Vec<f32>>>,
    /// Set once the producing note/wave has ended; the stream is finite from
    /// then on and drains to empty.
    finished: AtomicFlag,
}

impl AudioSignal {
    /// Create the template signal of a recycling.
    pub fn template(format: SignalFormat) -> Arc<Self> {
        Arc::new(Self {
            id: SIGNAL_IDS.next(),
            template: true,
            format,
            recall_id: Mutex::new(None),
            stream: Mutex::new(VecDeque::new()),
            finished: AtomicFlag::new(false),
        })
    }

    /// Duplicate a live signal from the template for one recall id.
    pub fn from_template(template: &AudioSignal, recall_id: Arc<RecallId>) -> Arc<Self> {
        Arc::new(Self {
            id: SIGNAL_IDS.next(),
            template: false,
            format: template.format,
            recall_id: Mutex::new(Some(recall_id)),
            stream: Mutex::new(VecDeque::new()),
            finished: AtomicFlag::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_template(&self) -> bool {
        self.template
    }

    pub fn format(&self) -> &SignalFormat {
        &self.format
    }

    pub fn recall_id(&self) -> Option<Arc<RecallId>> {
        self.recall_id.lock().clone()
    }

    /// Append one buffer to the stream. The buffer is padded or truncated to
    /// the signal's buffer size so consumers always see whole frames.
    pub fn push_buffer(&self, mut buffer: Vec<f32>) {
        buffer.resize(self.format.buffer_size, 0.0);
        self.stream.lock().push_back(buffer);
    }

    /// Append one buffer of silence.
    pub fn push_silence(&self) {
        self.stream
            .lock()
            .push_back(vec![0.0; self.format.buffer_size]);
    }

    /// Take the oldest buffer off the stream.
    pub fn pop_buffer(&self) -> Option<Vec<f32>> {
        self.stream.lock().pop_front()
    }

    /// Copy of the oldest buffer without consuming it.
    pub fn peek_buffer(&self) -> Option<Vec<f32>> {
        self.stream.lock().front().cloned()
    }

    /// Transform the oldest buffer in place (effect processing between the
    /// generating pre phase and the mixing post phase). Returns false when
    /// the stream is empty.
    pub fn process_front<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut [f32]),
    {
        let mut stream = self.stream.lock();
        match stream.front_mut() {
            Some(buffer) => {
                f(buffer);
                true
            }
            None => false,
        }
    }

    pub fn stream_len(&self) -> usize {
        self.stream.lock().len()
    }

    /// Mark the producing note/wave as ended. Idempotent.
    pub fn set_finished(&self) {
        self.finished.set(true);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// A finished signal with a drained stream has no more work.
    pub fn is_drained(&self) -> bool {
        self.finished.get() && self.stream.lock().is_empty()
    }
}

impl core::fmt::Debug for AudioSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioSignal")
            .field("id", &self.id)
            .field("template", &self.template)
            .field("buffers", &self.stream.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RecyclingContext, SoundScope};

    fn format() -> SignalFormat {
        SignalFormat {
            samplerate: 44100,
            buffer_size: 8,
            format: SampleFormat::F32,
            attack: 0,
        }
    }

    #[test]
    fn test_template_is_not_played() {
        let template = AudioSignal::template(format());
        assert!(template.is_template());
        assert!(template.recall_id().is_none());
    }

    #[test]
    fn test_duplicate_copies_format() {
        let template = AudioSignal::template(format());
        let context = RecyclingContext::new(0);
        let recall_id = RecallId::new(context, SoundScope::Playback);

        let live = AudioSignal::from_template(&template, recall_id);
        assert!(!live.is_template());
        assert_eq!(live.format(), template.format());
        assert!(live.recall_id().is_some());
    }

    #[test]
    fn test_stream_fifo_and_padding() {
        let template = AudioSignal::template(format());
        template.push_buffer(vec![1.0; 3]);
        template.push_buffer(vec![2.0; 8]);

        let first = template.pop_buffer().unwrap();
        assert_eq!(first.len(), 8);
        assert_eq!(first[0], 1.0);
        assert_eq!(first[3], 0.0);

        let second = template.pop_buffer().unwrap();
        assert_eq!(second[7], 2.0);
        assert!(template.pop_buffer().is_none());
    }

    #[test]
    fn test_drained_requires_finished() {
        let signal = AudioSignal::template(format());
        assert!(!signal.is_drained());

        signal.set_finished();
        assert!(signal.is_drained());

        signal.push_silence();
        assert!(!signal.is_drained());
        signal.pop_buffer();
        assert!(signal.is_drained());
    }
}
