//! Preview player contract and the small amount of logic built on it

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::utils::formatting::format_clock;

/// Errors reported by a playback backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("media could not be loaded: {0}")]
    Load(String),

    #[error("playback backend failed: {0}")]
    Backend(String),
}

/// Embedded playback engine
pub trait MediaPlayer: Send + Sync {
    fn load_and_play(&self, stream_url: &str) -> Result<(), PlayerError>;

    fn play(&self) -> Result<(), PlayerError>;

    fn pause(&self) -> Result<(), PlayerError>;

    fn stop(&self) -> Result<(), PlayerError>;

    /// `fraction` in 0..=1
    fn seek_fraction(&self, fraction: f64) -> Result<(), PlayerError>;

    fn position_fraction(&self) -> f64;

    /// Zero while unknown
    fn duration_seconds(&self) -> u64;

    fn is_playing(&self) -> bool;

    fn set_fullscreen(&self, enabled: bool) -> Result<(), PlayerError>;

    fn is_fullscreen(&self) -> bool;
}

/// Seek indicator value and elapsed/total label
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReadout {
    pub fraction: f64,
    pub label: String,
}

impl PlaybackReadout {
    /// `None` unless something is playing with a known duration
    pub fn sample(player: &dyn MediaPlayer) -> Option<Self> {
        if !player.is_playing() {
            return None;
        }

        let duration = player.duration_seconds();
        if duration == 0 {
            return None;
        }

        let fraction = player.position_fraction().clamp(0.0, 1.0);
        let elapsed = (fraction * duration as f64) as u64;

        Some(Self {
            fraction,
            label: format!("{} / {}", format_clock(elapsed), format_clock(duration)),
        })
    }
}

/// Stop the current media, let the backend settle and start the new stream
///
/// Backend failures are logged; the preview is best effort.
pub async fn refresh_preview(player: &dyn MediaPlayer, stream_url: &str, settle: Duration) {
    if let Err(e) = player.stop() {
        warn!("Preview stop failed: {}", e);
    }

    tokio::time::sleep(settle).await;

    match player.load_and_play(stream_url) {
        Ok(()) => debug!("Preview started: {}", stream_url),
        Err(e) => warn!("Preview could not start: {}", e),
    }
}

/// Seek to a 0-100 slider position, ignored while the duration is unknown
pub fn seek_percent(player: &dyn MediaPlayer, percent: f64) -> Result<bool, PlayerError> {
    if player.duration_seconds() == 0 || !percent.is_finite() {
        return Ok(false);
    }

    player.seek_fraction(percent.clamp(0.0, 100.0) / 100.0)?;
    Ok(true)
}

/// Returns the new fullscreen flag
pub fn toggle_fullscreen(player: &dyn MediaPlayer) -> Result<bool, PlayerError> {
    let next = !player.is_fullscreen();
    player.set_fullscreen(next)?;
    Ok(next)
}

/// Sample the player on every tick until the receiver goes away
pub fn spawn_position_poller(
    player: Arc<dyn MediaPlayer>,
    interval: Duration,
    readouts: mpsc::UnboundedSender<PlaybackReadout>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            if readouts.is_closed() {
                break;
            }

            if let Some(readout) = PlaybackReadout::sample(player.as_ref()) {
                if readouts.send(readout).is_err() {
                    break;
                }
            }
        }
        debug!("Position poller stopped");
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records calls, optionally failing on load
    #[derive(Default)]
    pub(crate) struct FakePlayer {
        pub calls: Mutex<Vec<String>>,
        pub playing: Mutex<bool>,
        pub fullscreen: Mutex<bool>,
        pub position: Mutex<f64>,
        pub duration: Mutex<u64>,
        pub fail_load: bool,
    }

    impl FakePlayer {
        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }
    }

    impl MediaPlayer for FakePlayer {
        fn load_and_play(&self, stream_url: &str) -> Result<(), PlayerError> {
            self.record(format!("load:{}", stream_url));
            if self.fail_load {
                return Err(PlayerError::Load(stream_url.to_string()));
            }
            *self.playing.lock() = true;
            Ok(())
        }

        fn play(&self) -> Result<(), PlayerError> {
            self.record("play".to_string());
            *self.playing.lock() = true;
            Ok(())
        }

        fn pause(&self) -> Result<(), PlayerError> {
            self.record("pause".to_string());
            *self.playing.lock() = false;
            Ok(())
        }

        fn stop(&self) -> Result<(), PlayerError> {
            self.record("stop".to_string());
            *self.playing.lock() = false;
            Ok(())
        }

        fn seek_fraction(&self, fraction: f64) -> Result<(), PlayerError> {
            self.record(format!("seek:{:.2}", fraction));
            *self.position.lock() = fraction;
            Ok(())
        }

        fn position_fraction(&self) -> f64 {
            *self.position.lock()
        }

        fn duration_seconds(&self) -> u64 {
            *self.duration.lock()
        }

        fn is_playing(&self) -> bool {
            *self.playing.lock()
        }

        fn set_fullscreen(&self, enabled: bool) -> Result<(), PlayerError> {
            *self.fullscreen.lock() = enabled;
            Ok(())
        }

        fn is_fullscreen(&self) -> bool {
            *self.fullscreen.lock()
        }
    }

    #[test]
    fn test_readout_requires_playing_with_duration() {
        let player = FakePlayer::default();
        assert!(PlaybackReadout::sample(&player).is_none());

        *player.playing.lock() = true;
        assert!(PlaybackReadout::sample(&player).is_none());

        *player.duration.lock() = 200;
        *player.position.lock() = 0.5;
        let readout = PlaybackReadout::sample(&player).unwrap();
        assert_eq!(readout.fraction, 0.5);
        assert_eq!(readout.label, "01:40 / 03:20");
    }

    #[test]
    fn test_seek_ignored_without_duration() {
        let player = FakePlayer::default();
        assert!(!seek_percent(&player, 50.0).unwrap());

        *player.duration.lock() = 60;
        assert!(seek_percent(&player, 25.0).unwrap());
        assert_eq!(player.position_fraction(), 0.25);
    }

    #[test]
    fn test_toggle_fullscreen_flips() {
        let player = FakePlayer::default();
        assert!(toggle_fullscreen(&player).unwrap());
        assert!(!toggle_fullscreen(&player).unwrap());
    }

    #[tokio::test]
    async fn test_refresh_stops_then_loads() {
        let player = FakePlayer::default();
        refresh_preview(&player, "https://cdn/v.m3u8", Duration::from_millis(1)).await;

        assert_eq!(
            *player.calls.lock(),
            vec!["stop".to_string(), "load:https://cdn/v.m3u8".to_string()]
        );
        assert!(player.is_playing());
    }

    #[tokio::test]
    async fn test_refresh_swallows_backend_errors() {
        let player = FakePlayer {
            fail_load: true,
            ..FakePlayer::default()
        };
        refresh_preview(&player, "bad://", Duration::from_millis(1)).await;
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_poller_sends_readouts() {
        let player = Arc::new(FakePlayer::default());
        *player.playing.lock() = true;
        *player.duration.lock() = 60;
        *player.position.lock() = 0.5;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_position_poller(player, Duration::from_millis(5), tx);

        let readout = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(readout.label, "00:30 / 01:00");

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
