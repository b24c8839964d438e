// Shared cpal plumbing for the demos: an `AudioSink` that mixes scheduled
// sources into the default output device, and a 16kHz mono microphone.
// Model audio arrives at 24kHz; chunks are resampled to the device rate with
// rubato before they reach the mixer.

#![allow(dead_code)]

use audioadapter::direct::SequentialSliceOfVecs;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig};
use polaris::audio::{AudioBuffer, AudioSink, SourceId};
use rubato::{Fft as FftResampler, FixedSync, Indexing, Resampler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{debug, error, info, warn};

const RESAMPLER_CHUNK_FRAMES: usize = 1024;
const RESAMPLER_SUB_CHUNKS: usize = 2;

struct ScheduledSource {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

#[derive(Default)]
struct Mixer {
    frames_played: u64,
    next_id: u64,
    sources: Vec<ScheduledSource>,
    finished: Vec<SourceId>,
}

/// Mono FFT resampler from one source rate to the device rate.
struct ChunkResampler {
    resampler: FftResampler<f32>,
    from_rate: u32,
    to_rate: u32,
    output_buffer: Vec<Vec<f32>>,
}

impl ChunkResampler {
    fn new(from_rate: u32, to_rate: u32) -> anyhow::Result<Self> {
        let resampler = FftResampler::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            RESAMPLER_CHUNK_FRAMES,
            RESAMPLER_SUB_CHUNKS,
            1,
            FixedSync::Input,
        )
        .map_err(|e| anyhow::anyhow!("Failed to create playback resampler: {}", e))?;
        let max_out = resampler.output_frames_max().max(1);
        info!(
            "[CpalSink] Playback resampler {} Hz -> {} Hz initialized.",
            from_rate, to_rate
        );
        Ok(Self {
            resampler,
            from_rate,
            to_rate,
            output_buffer: vec![vec![0.0f32; max_out]],
        })
    }

    /// Resamples one self-contained chunk. The resampler's delay is trimmed
    /// and the result is cut to the chunk's duration at the device rate, so
    /// consecutive chunks stay back to back on the timeline.
    fn resample(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        self.resampler.reset();
        let expected =
            (input.len() as u64 * self.to_rate as u64).div_ceil(self.from_rate as u64) as usize;
        let delay = self.resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay);
        let mut consumed = 0;

        while output.len() < expected + delay {
            let needed = self.resampler.input_frames_next();
            let take = input.len().saturating_sub(consumed).min(needed);
            let mut block = vec![vec![0.0f32; needed]];
            block[0][..take].copy_from_slice(&input[consumed..consumed + take]);
            consumed += take;

            let out_frames = self.resampler.output_frames_next().max(1);
            self.output_buffer[0].resize(out_frames, 0.0);

            let input_adapter = SequentialSliceOfVecs::new(&block, 1, needed)
                .map_err(|e| anyhow::anyhow!("Resampler input adapter: {}", e))?;
            let mut output_adapter =
                SequentialSliceOfVecs::new_mut(&mut self.output_buffer, 1, out_frames)
                    .map_err(|e| anyhow::anyhow!("Resampler output adapter: {}", e))?;
            // Past the end of the chunk the resampler is fed silence to drain its delay.
            let indexing = Indexing {
                input_offset: 0,
                output_offset: 0,
                partial_len: Some(take),
                active_channels_mask: None,
            };
            let (_read, written) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
                .map_err(|e| anyhow::anyhow!("Playback resampling error: {}", e))?;
            if written == 0 {
                break;
            }
            output.extend_from_slice(&self.output_buffer[0][..written]);
        }

        Ok(output.into_iter().skip(delay).take(expected).collect())
    }
}

/// Output device clocked by the frames it has rendered.
pub struct CpalSink {
    mixer: Arc<StdMutex<Mixer>>,
    device_rate: u32,
    resamplers: HashMap<u32, ChunkResampler>,
}

impl CpalSink {
    /// Sources the device has finished since the last call.
    pub fn take_finished(&self) -> Vec<SourceId> {
        match self.mixer.lock() {
            Ok(mut mixer) => std::mem::take(&mut mixer.finished),
            Err(_) => Vec::new(),
        }
    }

    fn to_device_rate(&mut self, buffer: AudioBuffer) -> anyhow::Result<Vec<f32>> {
        let samples = buffer.channels.into_iter().next().unwrap_or_default();
        if buffer.sample_rate == self.device_rate || samples.is_empty() {
            return Ok(samples);
        }
        let resampler = match self.resamplers.entry(buffer.sample_rate) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(ChunkResampler::new(buffer.sample_rate, self.device_rate)?)
            }
        };
        resampler.resample(&samples)
    }
}

impl AudioSink for CpalSink {
    fn current_time(&self) -> f64 {
        let frames = self.mixer.lock().map(|m| m.frames_played).unwrap_or(0);
        frames as f64 / self.device_rate as f64
    }

    fn start(&mut self, buffer: AudioBuffer, at: f64) -> SourceId {
        let samples = match self.to_device_rate(buffer) {
            Ok(samples) => samples,
            Err(e) => {
                error!("[CpalSink] Dropping chunk: {}", e);
                Vec::new()
            }
        };
        let Ok(mut mixer) = self.mixer.lock() else {
            return SourceId(0);
        };
        mixer.next_id += 1;
        let id = SourceId(mixer.next_id);
        let start_frame = ((at * self.device_rate as f64).max(0.0) as u64).max(mixer.frames_played);
        debug!("[CpalSink] {:?}: {} samples at frame {}.", id, samples.len(), start_frame);
        mixer.sources.push(ScheduledSource {
            id,
            start_frame,
            samples,
        });
        id
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.sources.retain(|s| s.id != id);
        }
    }
}

fn find_config(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfig> {
    let mut candidates: Vec<_> = configs
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
        .collect();
    candidates.sort_by_key(|c| c.channels());
    candidates
        .into_iter()
        .next()
        .map(|c| c.with_sample_rate(SampleRate(sample_rate)))
}

/// Opens the default output device, preferably at `preferred_rate`.
pub fn open_output(preferred_rate: u32) -> anyhow::Result<(cpal::Stream, CpalSink)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device"))?;
    info!("[AudioOutput] Using output: {}", device.name()?);

    let supported = match find_config(device.supported_output_configs()?, preferred_rate) {
        Some(config) => config,
        None => {
            warn!(
                "[AudioOutput] {}Hz f32 not supported; using the device default.",
                preferred_rate
            );
            let config = device.default_output_config()?;
            if config.sample_format() != SampleFormat::F32 {
                anyhow::bail!("Output device has no f32 config");
            }
            config
        }
    };
    let config: StreamConfig = supported.into();
    let device_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    info!("[AudioOutput] Output: {} Hz, {} ch.", device_rate, channels);

    let mixer = Arc::new(StdMutex::new(Mixer::default()));
    let render_mixer = mixer.clone();
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let Ok(mut mixer) = render_mixer.lock() else {
                data.fill(0.0);
                return;
            };
            let Mixer {
                frames_played,
                sources,
                finished,
                ..
            } = &mut *mixer;
            for (offset, frame) in data.chunks_mut(channels).enumerate() {
                let clock = *frames_played + offset as u64;
                let mut value = 0.0;
                for source in sources.iter() {
                    if clock < source.start_frame {
                        continue;
                    }
                    let index = (clock - source.start_frame) as usize;
                    if let Some(sample) = source.samples.get(index) {
                        value += sample;
                    }
                }
                frame.fill(value.clamp(-1.0, 1.0));
            }
            *frames_played += (data.len() / channels.max(1)) as u64;
            let now = *frames_played;
            sources.retain(|s| {
                let done = now >= s.start_frame + s.samples.len() as u64;
                if done {
                    finished.push(s.id);
                }
                !done
            });
        },
        |err| error!("[AudioOutput] CPAL error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok((
        stream,
        CpalSink {
            mixer,
            device_rate,
            resamplers: HashMap::new(),
        },
    ))
}

/// Opens the default microphone at exactly `sample_rate`, downmixed to mono.
/// Every callback's samples are handed to `on_frame`.
pub fn open_mono_input(
    sample_rate: u32,
    on_frame: impl FnMut(Vec<f32>) + Send + 'static,
) -> anyhow::Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No input device"))?;
    info!("[AudioInput] Using input: {}", device.name()?);

    let supported = find_config(device.supported_input_configs()?, sample_rate)
        .ok_or_else(|| anyhow::anyhow!("Input device cannot capture {}Hz f32", sample_rate))?;
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;
    info!("[AudioInput] Input: {} Hz, {} ch.", config.sample_rate.0, channels);

    let mut on_frame = on_frame;
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if data.is_empty() {
                return;
            }
            let mono = data
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect();
            on_frame(mono);
        },
        |err| error!("[AudioInput] CPAL error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}
