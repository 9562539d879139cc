//! Audio output using cpal
//!
//! The sink thread writes unsigned 8-bit PCM into a ring buffer producer;
//! the cpal callback pops from the consumer and converts each byte to the
//! device's sample format. An exhausted ring plays silence.

use crate::audio::device::{AudioBackend, AudioDevice};
use crate::audio::types::DeviceSpec;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Backend for the platform's default cpal host
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Find the requested device, falling back to the default one
    fn select_device(device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let mut devices = host.output_devices().map_err(|e| {
                Error::DeviceUnavailable(format!("Failed to enumerate devices: {}", e))
            })?;
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Found requested audio device: {}", name);
                return Ok(device);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(device)
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, spec: &DeviceSpec) -> Result<Box<dyn AudioDevice>> {
        let device = Self::select_device(spec.device_name.as_deref())?;
        let sample_format = device
            .default_output_config()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to get default config: {}", e)))?
            .sample_format();

        let config = StreamConfig {
            channels: spec.format.channels,
            sample_rate: cpal::SampleRate(spec.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, ring={} bytes",
            config.sample_rate.0, config.channels, sample_format, spec.buffer_bytes
        );

        let (producer, consumer) = HeapRb::<u8>::new(spec.buffer_bytes.max(1)).split();
        let fault = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream(&device, &config, consumer, Arc::clone(&fault), |b| {
                (b as f32 - 128.0) / 128.0
            })?,
            SampleFormat::I16 => build_stream(&device, &config, consumer, Arc::clone(&fault), |b| {
                ((b as i16) - 128) << 8
            })?,
            SampleFormat::U16 => build_stream(&device, &config, consumer, Arc::clone(&fault), |b| {
                (b as u16) << 8
            })?,
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to start stream: {}", e)))?;
        info!("Audio stream started");

        Ok(Box::new(CpalDevice {
            _stream: stream,
            producer,
            fault,
        }))
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<u8>,
    fault: Arc<AtomicBool>,
    convert: fn(u8) -> T,
) -> Result<Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    let silence = convert(128);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = consumer.try_pop().map(convert).unwrap_or(silence);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                fault.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to build stream: {}", e)))
}

struct CpalDevice {
    // Dropping the stream closes the device
    _stream: Stream,
    producer: HeapProd<u8>,
    fault: Arc<AtomicBool>,
}

impl AudioDevice for CpalDevice {
    fn available(&mut self) -> usize {
        self.producer.vacant_len()
    }

    fn buffered(&mut self) -> usize {
        self.producer.occupied_len()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.fault.load(Ordering::SeqCst) {
            return Err(Error::DeviceWriteFault("output stream reported an error".to_string()));
        }
        Ok(self.producer.push_slice(data))
    }
}
