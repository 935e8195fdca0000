/// Track state enumeration for the tracking lifecycle.
///
/// Transitions run New -> Tracked -> Lost -> Removed, with Lost returning
/// to Tracked on re-identification. Removed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Seen once, not yet confirmed by a second match
    #[default]
    New,
    /// Confirmed and matched within the current frame window
    Tracked,
    /// Confirmed but currently unmatched
    Lost,
    /// Aged out, terminal
    Removed,
}

impl TrackState {
    /// Short label carried by the debug output classification.
    pub fn as_label(&self) -> &'static str {
        match self {
            TrackState::New => "new",
            TrackState::Tracked => "tracked",
            TrackState::Lost => "lost",
            TrackState::Removed => "removed",
        }
    }
}
