//! Music playback on a dedicated audio thread.
//!
//! Rodio's output stream and sink are not `Send`, so a single `audio-player`
//! thread owns them and takes commands over a channel. Decoding happens on the
//! caller's side, which is what lets [`PlayerHandle::play`] report a corrupt
//! or unsupported file synchronously.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError, Sender},
    Arc,
};
use std::thread;
use std::time::Duration;

use log::{error, info};
use rodio::{Decoder, OutputStream, Sink};
use thiserror::Error;

/// How often the player thread re-checks the sink for natural track end.
const SINK_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: rodio::decoder::DecoderError,
    },
    #[error("audio player thread is gone")]
    EngineGone,
}

enum PlayerCommand {
    Play(Decoder<BufReader<File>>, String),
    Stop,
    SetVolume(f32),
}

/// Handle to the audio thread. Cloneable command side plus a shared playing
/// flag the thread keeps current.
pub struct PlayerHandle {
    tx: Sender<PlayerCommand>,
    playing: Arc<AtomicBool>,
}

impl PlayerHandle {
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (tx, rx) = mpsc::channel::<PlayerCommand>();
        let playing = Arc::new(AtomicBool::new(false));
        let playing_flag = Arc::clone(&playing);

        thread::Builder::new()
            .name("audio-player".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("failed to create audio output stream: {e}"))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("failed to create audio sink: {e}"))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                loop {
                    match rx.recv_timeout(SINK_POLL) {
                        Ok(PlayerCommand::Play(source, name)) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                            match ensure_sink(&mut _stream, &mut sink) {
                                Ok(()) => {
                                    if let Some(ref s) = sink {
                                        s.append(source);
                                        playing_flag.store(true, Ordering::SeqCst);
                                        info!("playing track: {name}");
                                    }
                                }
                                Err(err) => {
                                    error!("{err}");
                                    playing_flag.store(false, Ordering::SeqCst);
                                }
                            }
                        }
                        Ok(PlayerCommand::Stop) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                            playing_flag.store(false, Ordering::SeqCst);
                        }
                        Ok(PlayerCommand::SetVolume(v)) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            // Track ran out on its own.
                            if let Some(ref s) = sink {
                                if s.empty() {
                                    playing_flag.store(false, Ordering::SeqCst);
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|_| PlaybackError::EngineGone)?;

        Ok(Self { tx, playing })
    }

    pub fn play(&self, track: &Path) -> Result<(), PlaybackError> {
        let file = File::open(track).map_err(|source| PlaybackError::Open {
            path: track.to_path_buf(),
            source,
        })?;
        let source =
            Decoder::new(BufReader::new(file)).map_err(|source| PlaybackError::Decode {
                path: track.to_path_buf(),
                source,
            })?;

        let name = track
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| track.display().to_string());
        self.tx
            .send(PlayerCommand::Play(source, name))
            .map_err(|_| PlaybackError::EngineGone)?;
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.tx.send(PlayerCommand::Stop);
        self.playing.store(false, Ordering::SeqCst);
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.tx
            .send(PlayerCommand::SetVolume(volume))
            .map_err(|_| PlaybackError::EngineGone)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
