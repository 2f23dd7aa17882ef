//! # Sound Channels
//!
//! The fixed bank of mixing channels. Every playing sound holds a channel
//! until its end tic; all of them are stopped before a level teardown so no
//! channel outlives the level data its origin lived in.
//!
//! ## Tic Comparison
//!
//! [`Channel::is_playing`] compares the end tic with a plain `<`. The end tic
//! is stamped with wrapping arithmetic, so near `i32::MAX` a freshly started
//! sound reads as ended-in-the-past and the comparison flips.

/// Number of channels mixed at once.
pub const NUM_CHANNELS: usize = 8;

/// A sound effect definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sfx {
    /// Effect number.
    pub id: u16,
    /// Lower values are more important.
    pub priority: i32,
    /// Length in tics.
    pub ticks: i32,
}

/// One mixing channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Channel {
    sfx: Option<Sfx>,
    origin: Option<u32>,
    tickend: i32,
}

impl Channel {
    /// The effect on this channel.
    #[inline]
    #[must_use]
    pub const fn sfx(&self) -> Option<Sfx> {
        self.sfx
    }

    /// Thing the sound comes from; `None` for the listener itself.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> Option<u32> {
        self.origin
    }

    /// Tic at which the sound ends.
    #[inline]
    #[must_use]
    pub const fn tickend(&self) -> i32 {
        self.tickend
    }

    /// Whether the channel is in use.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.sfx.is_some()
    }

    /// The mixer's playing test: true once `tickend < now`.
    #[inline]
    #[must_use]
    pub const fn is_playing(&self, now: i32) -> bool {
        self.sfx.is_some() && self.tickend < now
    }

    fn start(&mut self, sfx: Sfx, origin: Option<u32>, now: i32) {
        self.sfx = Some(sfx);
        self.origin = origin;
        self.tickend = now.wrapping_add(sfx.ticks);
    }

    fn stop(&mut self) {
        self.sfx = None;
        self.tickend = 0;
    }
}

/// The channel bank.
#[derive(Clone, Debug, Default)]
pub struct SoundChannels {
    channels: [Channel; NUM_CHANNELS],
}

impl SoundChannels {
    /// Creates a bank with every channel idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The channels.
    #[inline]
    #[must_use]
    pub const fn channels(&self) -> &[Channel; NUM_CHANNELS] {
        &self.channels
    }

    /// Number of channels in use.
    #[must_use]
    pub fn active(&self) -> usize {
        self.channels.iter().filter(|channel| channel.is_active()).count()
    }

    /// Starts `sfx` from `origin` at tic `now`.
    ///
    /// A sound already playing from the same origin is cut off. When every
    /// channel is busy, the first one whose priority value is not below the
    /// new sound's is taken over.
    ///
    /// Returns the channel used, or `None` if every channel holds a more
    /// important sound.
    pub fn start_sound(&mut self, sfx: Sfx, origin: Option<u32>, now: i32) -> Option<usize> {
        if origin.is_some() {
            if let Some(channel) = self
                .channels
                .iter_mut()
                .find(|channel| channel.is_active() && channel.origin == origin)
            {
                channel.stop();
            }
        }

        let index = match self.channels.iter().position(|channel| !channel.is_active()) {
            Some(index) => index,
            None => self
                .channels
                .iter()
                .position(|channel| channel.sfx.is_some_and(|playing| playing.priority >= sfx.priority))?,
        };

        self.channels[index].stop();
        self.channels[index].start(sfx, origin, now);
        tracing::trace!(channel = index, sfx = sfx.id, tickend = self.channels[index].tickend, "sound started");
        Some(index)
    }

    /// Stops every sound from `origin`.
    pub fn stop_origin(&mut self, origin: u32) {
        for channel in &mut self.channels {
            if channel.is_active() && channel.origin == Some(origin) {
                channel.stop();
            }
        }
    }

    /// Frees channels the playing test reports as finished.
    ///
    /// Returns the number of channels stopped.
    pub fn update(&mut self, now: i32) -> usize {
        let mut stopped = 0;
        for channel in &mut self.channels {
            if channel.is_active() && !channel.is_playing(now) {
                channel.stop();
                stopped += 1;
            }
        }
        stopped
    }

    /// Stops every channel. Runs before each level teardown.
    pub fn stop_all(&mut self) {
        for channel in &mut self.channels {
            channel.stop();
        }
    }
}
