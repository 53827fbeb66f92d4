//! Audio input acquisition for dictation.
//!
//! A dictation session holds an [`AudioLease`] while listening. Dropping
//! the lease releases the device, so every exit path releases it.

use tracing::info;

use crate::error::TutorError;

/// An acquired audio input. Released on drop.
pub struct AudioLease {
    label: String,
    _resource: Box<dyn Send>,
}

impl AudioLease {
    /// Wrap a resource that releases the device when dropped.
    pub fn new(label: impl Into<String>, resource: impl Send + 'static) -> Self {
        Self {
            label: label.into(),
            _resource: Box::new(resource),
        }
    }

    /// Device label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for AudioLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioLease").field("label", &self.label).finish()
    }
}

impl Drop for AudioLease {
    fn drop(&mut self) {
        info!(device = %self.label, "audio input released");
    }
}

/// Source of audio leases.
pub trait AudioInput: Send {
    /// Acquire the device.
    fn acquire(&mut self) -> Result<AudioLease, TutorError>;
}

/// Audio input that is never available; recognition runs without it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudioInput;

impl AudioInput for NoAudioInput {
    fn acquire(&mut self) -> Result<AudioLease, TutorError> {
        Err(TutorError::Dictation("no audio input configured".into()))
    }
}

#[cfg(feature = "microphone")]
pub use microphone::CpalMicrophone;

#[cfg(feature = "microphone")]
mod microphone {
    use std::sync::mpsc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{error, info, warn};

    use super::{AudioInput, AudioLease};
    use crate::error::TutorError;

    /// Default system microphone via cpal.
    ///
    /// The input stream lives on a dedicated thread for the lifetime of
    /// the lease; dropping the lease closes the channel and the thread
    /// drops the stream.
    #[derive(Debug, Default, Clone)]
    pub struct CpalMicrophone {
        device_name: Option<String>,
    }

    /// Keeps the holder thread alive; dropping it ends the thread.
    struct Holder {
        _release: mpsc::Sender<()>,
    }

    impl CpalMicrophone {
        /// Use the default input device.
        pub fn new() -> Self {
            Self::default()
        }

        /// Use the input device with this name.
        pub fn with_device(name: impl Into<String>) -> Self {
            Self {
                device_name: Some(name.into()),
            }
        }

        fn open(device_name: Option<&str>) -> Result<(cpal::Stream, String), TutorError> {
            let host = cpal::default_host();
            let device = if let Some(name) = device_name {
                host.input_devices()
                    .map_err(|e| TutorError::Dictation(format!("cannot enumerate devices: {e}")))?
                    .find(|d| {
                        d.description()
                            .ok()
                            .map(|desc| desc.name() == name)
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| {
                        TutorError::Dictation(format!("input device '{name}' not found"))
                    })?
            } else {
                host.default_input_device()
                    .ok_or_else(|| TutorError::Dictation("no default input device".into()))?
            };

            let label = device
                .description()
                .map(|d| d.name().to_owned())
                .unwrap_or_else(|_| "<unknown>".into());

            let config = device
                .default_input_config()
                .map_err(|e| TutorError::Dictation(format!("no default input config: {e}")))?;
            let stream_config = cpal::StreamConfig {
                channels: config.channels(),
                sample_rate: config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            // Samples go to the recognizer through the platform; the stream
            // only has to stay open.
            let stream = device
                .build_input_stream(
                    &stream_config,
                    |_data: &[f32], _info: &cpal::InputCallbackInfo| {},
                    |err| error!("audio input stream error: {err}"),
                    None,
                )
                .map_err(|e| TutorError::Dictation(format!("failed to build input stream: {e}")))?;
            stream
                .play()
                .map_err(|e| TutorError::Dictation(format!("failed to start input stream: {e}")))?;
            Ok((stream, label))
        }
    }

    impl AudioInput for CpalMicrophone {
        fn acquire(&mut self) -> Result<AudioLease, TutorError> {
            let (ready_tx, ready_rx) = mpsc::channel::<Result<String, TutorError>>();
            let (release_tx, release_rx) = mpsc::channel::<()>();
            let device_name = self.device_name.clone();

            std::thread::Builder::new()
                .name("tutor-mic".into())
                .spawn(move || match Self::open(device_name.as_deref()) {
                    Ok((stream, label)) => {
                        if ready_tx.send(Ok(label)).is_err() {
                            return;
                        }
                        // Blocks until the lease (sender) is dropped.
                        let _ = release_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                })?;

            let label = ready_rx.recv().map_err(|_| {
                warn!("microphone thread exited before reporting");
                TutorError::Dictation("microphone thread exited".into())
            })??;
            info!(device = %label, "audio input acquired");
            Ok(AudioLease::new(label, Holder { _release: release_tx }))
        }
    }
}
