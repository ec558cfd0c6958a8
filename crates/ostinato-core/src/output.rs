//! CPAL-backed output soundcard (requires the `cpal` feature).

use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::config::SoundcardPresets;
use crate::error::{Error, Result, SoundcardError};
use crate::lockfree::AtomicFlag;
use crate::soundcard::{Soundcard, SoundcardBuffer, SoundcardCapability, DEFAULT_SUB_BLOCKS};

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. This is safe because
/// the stream is only touched behind the card's mutex.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

/// Output soundcard on top of cpal.
///
/// The engine mixes into the card's double buffer like any other backend;
/// `play` pushes the finished cycle into an SPSC ring the cpal callback
/// drains. A full ring (the loop outran the device) reports an overrun, an
/// empty ring on the device side plays silence.
pub struct CpalSoundcard {
    presets: SoundcardPresets,
    device_index: Option<usize>,
    buffers: [SoundcardBuffer; 2],
    current: AtomicUsize,
    producer: Mutex<Option<HeapProd<f32>>>,
    consumer: Mutex<Option<HeapCons<f32>>>,
    stream: Mutex<Option<StreamHandle>>,
    playing: AtomicFlag,
    shutdown_done: AtomicFlag,
}

impl CpalSoundcard {
    /// Negotiate presets with the default (or indexed) output device.
    pub fn new(device_index: Option<usize>) -> Result<Self> {
        let device = get_device(device_index)?;
        let config = device.default_output_config()?;

        let presets = SoundcardPresets {
            channels: config.channels() as usize,
            samplerate: config.sample_rate().0,
            buffer_size: 1024,
            format: crate::config::SampleFormat::F32,
        };

        let samples = presets.buffer_size * presets.channels;
        let ring = HeapRb::<f32>::new(samples * 4);
        let (producer, consumer) = ring.split();

        Ok(Self {
            presets,
            device_index,
            buffers: [
                SoundcardBuffer::new(samples, DEFAULT_SUB_BLOCKS),
                SoundcardBuffer::new(samples, DEFAULT_SUB_BLOCKS),
            ],
            current: AtomicUsize::new(0),
            producer: Mutex::new(Some(producer)),
            consumer: Mutex::new(Some(consumer)),
            stream: Mutex::new(None),
            playing: AtomicFlag::new(false),
            shutdown_done: AtomicFlag::new(false),
        })
    }

    /// List available output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }

    /// Name of this card's device.
    pub fn device_name(&self) -> Result<String> {
        Ok(get_device(self.device_index)?.name()?)
    }
}

impl Soundcard for CpalSoundcard {
    fn presets(&self) -> SoundcardPresets {
        self.presets
    }

    fn capability(&self) -> SoundcardCapability {
        SoundcardCapability::Playback
    }

    fn start(&self) -> std::result::Result<(), SoundcardError> {
        let mut stream_slot = self.stream.lock();
        if stream_slot.is_some() {
            return Ok(());
        }

        let consumer = self
            .consumer
            .lock()
            .take()
            .ok_or_else(|| SoundcardError::Backend("stream already consumed".into()))?;

        let stream = build_output_stream(self.device_index, consumer)
            .map_err(|e| SoundcardError::Backend(e.to_string()))?;
        stream
            .play()
            .map_err(|e| SoundcardError::Backend(e.to_string()))?;

        *stream_slot = Some(StreamHandle(stream));
        self.playing.set(true);
        Ok(())
    }

    fn shutdown(&self) {
        if !self.shutdown_done.test_and_set() {
            return;
        }
        *self.stream.lock() = None;
        self.playing.set(false);
    }

    fn play(&self) -> std::result::Result<(), SoundcardError> {
        let current = self.current.load(Ordering::Acquire);
        let cycle = self.buffers[current].snapshot();

        let next = 1 - current;
        self.buffers[next].clear();
        self.current.store(next, Ordering::Release);

        let mut producer = self.producer.lock();
        let Some(producer) = producer.as_mut() else {
            return Err(SoundcardError::Backend("card not started".into()));
        };
        let pushed = producer.push_slice(&cycle);
        if pushed < cycle.len() {
            return Err(SoundcardError::Overrun);
        }
        Ok(())
    }

    fn record(&self) -> std::result::Result<(), SoundcardError> {
        Err(SoundcardError::Backend("playback-only card".into()))
    }

    fn duplex(&self) -> std::result::Result<(), SoundcardError> {
        Err(SoundcardError::Backend("playback-only card".into()))
    }

    fn is_playing(&self) -> bool {
        self.playing.get()
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn buffer(&self) -> &SoundcardBuffer {
        &self.buffers[self.current.load(Ordering::Acquire)]
    }

    fn prev_buffer(&self) -> &SoundcardBuffer {
        &self.buffers[1 - self.current.load(Ordering::Acquire)]
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

fn build_output_stream(device_index: Option<usize>, consumer: HeapCons<f32>) -> Result<cpal::Stream> {
    let device = get_device(device_index)?;
    let config = device.default_output_config()?;

    match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), consumer),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), consumer),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), consumer),
        format => Err(Error::InvalidConfig(format!(
            "Unsupported sample format: {format:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch = Vec::<f32>::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }

            let filled = consumer.pop_slice(&mut scratch[..data.len()]);
            for slot in scratch[filled..data.len()].iter_mut() {
                // Ring underrun: silence instead of stale samples.
                *slot = 0.0;
            }

            for (out, sample) in data.iter_mut().zip(&scratch) {
                *out = T::from_sample(*sample);
            }
        },
        |_err| {},
        None,
    )?;

    Ok(stream)
}

// No unit tests here: the card needs real hardware. The contract is covered
// through MemorySoundcard; this backend is exercised by running an engine
// with default features.
