use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use audio_editor_core::{buffer::SAMPLE_WIDTH_BYTES, EditorError, PlaybackDevice, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, SizedSample,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// How often the stream thread checks whether playback ran out.
const FINISH_POLL: Duration = Duration::from_millis(20);

/// Plays buffers through the host's default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevice;

/// One open output stream.
pub struct CpalHandle {
    stop_tx: Sender<()>,
    finished: Arc<AtomicBool>,
}

impl PlaybackDevice for CpalDevice {
    type Handle = CpalHandle;

    fn open(
        &self,
        raw: &[u8],
        channel_count: u16,
        sample_width_bytes: u16,
        sample_rate: u32,
    ) -> Result<CpalHandle> {
        if sample_width_bytes != SAMPLE_WIDTH_BYTES {
            return Err(EditorError::UnsupportedFormat(format!(
                "{sample_width_bytes}-byte samples"
            )));
        }

        let samples = raw
            .chunks_exact(2)
            .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0)
            .collect();
        let source = Source::new(samples, channel_count as usize, sample_rate);

        let finished = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        // cpal streams are not Send, so each one lives on its own thread.
        let stream_finished = finished.clone();
        thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || run_stream(source, stream_finished, stop_rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CpalHandle { stop_tx, finished }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EditorError::device("output thread exited before starting")),
        }
    }

    fn is_playing(&self, handle: &CpalHandle) -> bool {
        !handle.finished.load(Ordering::Acquire)
    }

    fn stop(&self, handle: &CpalHandle) -> Result<()> {
        let _ = handle.stop_tx.try_send(());
        handle.finished.store(true, Ordering::Release);
        Ok(())
    }
}

fn run_stream(
    source: Source,
    finished: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
) {
    let stream = match build_stream(source, finished.clone()) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    loop {
        match stop_rx.recv_timeout(FINISH_POLL) {
            Err(RecvTimeoutError::Timeout) if !finished.load(Ordering::Acquire) => {}
            _ => break,
        }
    }

    drop(stream);
    finished.store(true, Ordering::Release);
    tracing::debug!("output stream closed");
}

fn build_stream(source: Source, finished: Arc<AtomicBool>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EditorError::device("no default output device"))?;
    let supported = device.default_output_config().map_err(device_error)?;
    let config = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, source, finished),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, source, finished),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, source, finished),
        other => Err(EditorError::device(format!(
            "unsupported output sample format {other:?}"
        ))),
    }?;

    stream.play().map_err(device_error)?;
    Ok(stream)
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut source: Source,
    finished: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let out_channels = config.channels as usize;
    let step = source.sample_rate as f64 / config.sample_rate.0 as f64;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(out_channels) {
                    for (channel, slot) in frame.iter_mut().enumerate() {
                        *slot = T::from_sample(source.sample(channel));
                    }
                    source.advance(step);
                }
                if source.is_done() {
                    finished.store(true, Ordering::Release);
                }
            },
            |err: cpal::StreamError| tracing::warn!(%err, "output stream error"),
            None,
        )
        .map_err(device_error)
}

fn device_error(err: impl std::fmt::Display) -> EditorError {
    EditorError::device(err.to_string())
}

/// Interleaved samples read at the device's rate with linear interpolation.
struct Source {
    samples: Vec<f32>,
    channels: usize,
    frames: usize,
    sample_rate: u32,
    position: f64,
}

impl Source {
    fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            frames: samples.len() / channels,
            samples,
            channels,
            sample_rate,
            position: 0.0,
        }
    }

    fn sample(&self, out_channel: usize) -> f32 {
        if self.is_done() {
            return 0.0;
        }
        let channel = out_channel % self.channels;
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let a = self.samples[index * self.channels + channel];
        let b = if index + 1 < self.frames {
            self.samples[(index + 1) * self.channels + channel]
        } else {
            a
        };
        a * (1.0 - frac) + b * frac
    }

    fn advance(&mut self, step: f64) {
        self.position += step;
    }

    fn is_done(&self) -> bool {
        self.position as usize >= self.frames
    }
}
