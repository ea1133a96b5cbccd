//! Speech playback with rodio
//!
//! rodio's `OutputStream` is not `Send`, so each playback owns a short-lived
//! thread that opens the stream, feeds the sink and polls for completion or a
//! stop request. Dropping the `play` future also stops the sound.

use super::AudioPlayer;
use crate::error::ProviderError;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Plays MP3/WAV bytes on the default output device
#[derive(Default)]
pub struct RodioPlayer {
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh stop flag, stopping any previous playback
    fn begin(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(flag.clone()) {
                previous.store(true, Ordering::SeqCst);
            }
        }
        flag
    }
}

fn play_blocking(
    audio: Vec<u8>,
    stop: &AtomicBool,
    done: &oneshot::Sender<Result<(), ProviderError>>,
) -> Result<(), ProviderError> {
    let (_stream, handle) = OutputStream::try_default()
        .map_err(|e| ProviderError::Playback(format!("Failed to open audio output: {}", e)))?;
    let source = Decoder::new(Cursor::new(audio))
        .map_err(|e| ProviderError::Playback(format!("Failed to decode audio: {}", e)))?;
    let sink = Sink::try_new(&handle)
        .map_err(|e| ProviderError::Playback(format!("Failed to create audio sink: {}", e)))?;

    sink.append(source);

    while !sink.empty() {
        if stop.load(Ordering::SeqCst) || done.is_closed() {
            sink.stop();
            tracing::debug!("Playback stopped");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

#[async_trait::async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<(), ProviderError> {
        if audio.is_empty() {
            return Err(ProviderError::EmptyResult);
        }

        let stop = self.begin();
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("hoverbar-playback".to_string())
            .spawn(move || {
                let result = play_blocking(audio, &stop, &tx);
                let _ = tx.send(result);
            })
            .map_err(|e| ProviderError::Playback(format!("Failed to start playback: {}", e)))?;

        rx.await
            .unwrap_or_else(|_| Err(ProviderError::Playback("playback thread exited".into())))
    }

    fn stop(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(flag) = current.take() {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}
