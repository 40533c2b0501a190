/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! [`CaptureBackend`] over the host's real devices: `nokhwa` for cameras and
//! `cpal` for microphones.
//!
//! Neither crate's handles can leave the thread that created them, so every
//! source runs on its own capture thread. The thread reports whether the device
//! opened, then pushes raw frames to the receiver returned by
//! [`NativeCaptureBackend::new`] until the source is stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use classroom_types::MediaKind;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tokio::sync::{mpsc, oneshot};

use super::capture::{CaptureBackend, CaptureSource, TrackConstraints};
use crate::config::{AudioProfile, VideoProfile};
use crate::errors::MediaError;

/// Raw media straight from a device, before any encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedFrame {
    Video {
        device_id: String,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
    },
    Audio {
        device_id: String,
        sample_rate: u32,
        channels: u16,
        samples: Vec<f32>,
    },
}

/// Opens the default camera and microphone unless told otherwise.
pub struct NativeCaptureBackend {
    camera_index: u32,
    microphone: Option<String>,
    frames: mpsc::UnboundedSender<CapturedFrame>,
}

impl NativeCaptureBackend {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CapturedFrame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        (
            Self {
                camera_index: 0,
                microphone: None,
                frames,
            },
            rx,
        )
    }

    pub fn with_camera_index(mut self, index: u32) -> Self {
        self.camera_index = index;
        self
    }

    /// Picks the input device by its cpal name instead of the host default.
    pub fn with_microphone(mut self, name: impl Into<String>) -> Self {
        self.microphone = Some(name.into());
        self
    }
}

#[async_trait(?Send)]
impl CaptureBackend for NativeCaptureBackend {
    async fn open(
        &self,
        constraints: &TrackConstraints,
    ) -> Result<Box<dyn CaptureSource>, MediaError> {
        let kind = constraints.kind();
        let control = Arc::new(Control::default());
        let (opened_tx, opened_rx) = oneshot::channel();
        let frames = self.frames.clone();
        let thread_control = control.clone();
        let (device_id, thread) = match constraints {
            TrackConstraints::Video(profile) => {
                let index = self.camera_index;
                let profile = *profile;
                let device_id = format!("camera:{index}");
                let id = device_id.clone();
                let thread = std::thread::spawn(move || {
                    run_camera(index, profile, id, frames, thread_control, opened_tx)
                });
                (device_id, thread)
            }
            TrackConstraints::Audio(profile) => {
                let name = self.microphone.clone();
                let profile = *profile;
                let device_id = format!("microphone:{}", name.as_deref().unwrap_or("default"));
                let id = device_id.clone();
                let thread = std::thread::spawn(move || {
                    run_microphone(name, profile, id, frames, thread_control, opened_tx)
                });
                (device_id, thread)
            }
        };

        let opened = opened_rx
            .await
            .map_err(|_| MediaError::device_unavailable(kind, "capture thread exited"))?;
        if let Err(e) = opened {
            if thread.join().is_err() {
                error!("capture thread for {} panicked", device_id);
            }
            return Err(e);
        }
        info!("opened {} for {}", device_id, kind);
        Ok(Box::new(NativeSource {
            kind,
            device_id,
            constraints: *constraints,
            control,
            thread: Some(thread),
        }))
    }
}

#[derive(Default)]
struct Control {
    disabled: AtomicBool,
    stop: AtomicBool,
    reconfigure: Mutex<Option<VideoProfile>>,
}

impl Control {
    fn take_reconfigure(&self) -> Option<VideoProfile> {
        self.reconfigure.lock().ok().and_then(|mut pending| pending.take())
    }
}

struct NativeSource {
    kind: MediaKind,
    device_id: String,
    constraints: TrackConstraints,
    control: Arc<Control>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSource for NativeSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.control.disabled.store(!enabled, Ordering::Relaxed);
    }

    fn apply_constraints(&mut self, constraints: &TrackConstraints) -> Result<(), MediaError> {
        match constraints {
            TrackConstraints::Video(profile) => {
                let mut pending = self.control.reconfigure.lock().map_err(|_| {
                    MediaError::device_unavailable(self.kind, "capture thread poisoned")
                })?;
                *pending = Some(*profile);
            }
            // cpal streams are fixed once built
            TrackConstraints::Audio(_) if *constraints == self.constraints => {}
            TrackConstraints::Audio(_) => {
                return Err(MediaError::device_unavailable(
                    self.kind,
                    "audio format cannot change on a live stream",
                ))
            }
        }
        self.constraints = *constraints;
        Ok(())
    }

    fn stop(&mut self) {
        self.control.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("capture thread for {} panicked", self.device_id);
            }
        }
        debug!("released {}", self.device_id);
    }
}

fn camera_request(profile: &VideoProfile) -> RequestedFormat<'static> {
    RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new_from(
        profile.width,
        profile.height,
        FrameFormat::MJPEG,
        profile.frame_rate,
    )))
}

fn run_camera(
    index: u32,
    profile: VideoProfile,
    device_id: String,
    frames: mpsc::UnboundedSender<CapturedFrame>,
    control: Arc<Control>,
    opened: oneshot::Sender<Result<(), MediaError>>,
) {
    let mut camera = match Camera::new(CameraIndex::Index(index), camera_request(&profile))
        .and_then(|mut camera| camera.open_stream().map(|_| camera))
    {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(classify(MediaKind::Camera, e)));
            return;
        }
    };
    debug!("{} streaming {:?}", device_id, camera.camera_format());
    let _ = opened.send(Ok(()));

    let mut frame_interval = Duration::from_millis(1000 / u64::from(profile.frame_rate.max(1)));
    while !control.stop.load(Ordering::Relaxed) {
        if let Some(next) = control.take_reconfigure() {
            match camera.set_camera_requset(camera_request(&next)) {
                Ok(format) => {
                    info!("{} reconfigured to {:?}", device_id, format);
                    frame_interval = Duration::from_millis(1000 / u64::from(next.frame_rate.max(1)));
                }
                Err(e) => warn!("{} kept its format: {}", device_id, e),
            }
        }
        if control.disabled.load(Ordering::Relaxed) {
            std::thread::sleep(frame_interval);
            continue;
        }
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("{} dropped a frame: {}", device_id, e);
                continue;
            }
        };
        let resolution = buffer.resolution();
        match buffer.decode_image::<RgbFormat>() {
            Ok(image) => {
                let frame = CapturedFrame::Video {
                    device_id: device_id.clone(),
                    width: resolution.width(),
                    height: resolution.height(),
                    rgb: image.into_raw(),
                };
                if frames.send(frame).is_err() {
                    debug!("nobody reads frames from {}", device_id);
                }
            }
            Err(e) => warn!("{} produced an undecodable frame: {}", device_id, e),
        }
    }
    if let Err(e) = camera.stop_stream() {
        warn!("{} did not stop cleanly: {}", device_id, e);
    }
}

fn run_microphone(
    name: Option<String>,
    profile: AudioProfile,
    device_id: String,
    frames: mpsc::UnboundedSender<CapturedFrame>,
    control: Arc<Control>,
    opened: oneshot::Sender<Result<(), MediaError>>,
) {
    let stream = match build_input_stream(name.as_deref(), &profile, &device_id, frames, &control) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    let _ = opened.send(Ok(()));
    while !control.stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }
    if let Err(e) = stream.pause() {
        debug!("{} did not pause cleanly: {}", device_id, e);
    }
}

fn build_input_stream(
    name: Option<&str>,
    profile: &AudioProfile,
    device_id: &str,
    frames: mpsc::UnboundedSender<CapturedFrame>,
    control: &Arc<Control>,
) -> Result<cpal::Stream, MediaError> {
    let kind = MediaKind::Microphone;
    let host = cpal::default_host();
    let device = match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| classify(kind, e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
        None => host.default_input_device(),
    }
    .ok_or_else(|| MediaError::device_unavailable(kind, "no input device"))?;

    // Prefer the profile's format, fall back to whatever the device defaults to
    let wanted_rate = cpal::SampleRate(profile.sample_rate);
    let config = device
        .supported_input_configs()
        .map_err(|e| classify(kind, e))?
        .filter(|c| u32::from(c.channels()) == profile.channels)
        .find(|c| c.min_sample_rate() <= wanted_rate && wanted_rate <= c.max_sample_rate())
        .map(|c| c.with_sample_rate(wanted_rate));
    let config = match config {
        Some(config) => config,
        None => device.default_input_config().map_err(|e| classify(kind, e))?,
    };
    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let emit = {
        let control = control.clone();
        let device_id = device_id.to_string();
        move |samples: Vec<f32>| {
            if control.disabled.load(Ordering::Relaxed) {
                return;
            }
            let _ = frames.send(CapturedFrame::Audio {
                device_id: device_id.clone(),
                sample_rate,
                channels,
                samples,
            });
        }
    };
    let on_error = {
        let device_id = device_id.to_string();
        move |e: cpal::StreamError| error!("{} stream error: {}", device_id, e)
    };
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| emit(data.to_vec()),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                emit(data.iter().map(|s| f32::from(*s) / f32::from(i16::MAX)).collect())
            },
            on_error,
            None,
        ),
        other => {
            return Err(MediaError::device_unavailable(
                kind,
                format!("unsupported sample format {other}"),
            ))
        }
    }
    .map_err(|e| classify(kind, e))?;
    stream.play().map_err(|e| classify(kind, e))?;
    Ok(stream)
}

// Platforms report a refused prompt as an ordinary open error
fn classify(kind: MediaKind, e: impl std::fmt::Display) -> MediaError {
    let reason = e.to_string();
    let lowered = reason.to_lowercase();
    if ["permission", "denied", "not authorized", "notallowed"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        MediaError::permission_denied(kind, reason)
    } else {
        MediaError::device_unavailable(kind, reason)
    }
}
