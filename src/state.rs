pub const TRACK_NAMES: [&str; 16] = [
    "KICK", "SNARE", "CLHAT", "OPHAT", "CLAP", "TOMLO", "TOMHI", "CYMBAL",
    "PERCUSS", "COWBELL", "MARACAS", "WHISTLE", "CRASH", "RIDE", "CLAVES", "RIMSHOT",
];

pub const KIT_NAMES: [&str; 3] = ["808 CLASSIC", "808 BRIGHT", "808 DRY"];

pub const THEME_NAMES: [&str; 4] = ["RED808", "NAVY", "CYBER", "EMERALD"];

pub const MIN_TEMPO: u16 = 40;
pub const MAX_TEMPO: u16 = 300;
pub const MAX_VOLUME: u8 = 30;
pub const TEMPO_STEP: i16 = 5;

pub fn track_name(track: usize) -> &'static str {
    TRACK_NAMES.get(track).copied().unwrap_or("?")
}

/// Mirror of the device's transport and selection state.
///
/// Every field is last-writer-wins from the most recent status reply; the
/// only local writes are optimistic updates made by the panel itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub tempo:    u16,
    pub volume:   u8,
    pub pattern:  usize,
    pub kit:      usize,
    pub kit_name: Option<String>,
    pub track:    usize,
    pub playing:  bool,
    pub step:     usize,
    pub theme:    usize,
    pub clients:  Option<u32>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            tempo:    120,
            volume:   15,
            pattern:  0,
            kit:      0,
            kit_name: None,
            track:    0,
            playing:  false,
            step:     0,
            theme:    0,
            clients:  None,
        }
    }
}

impl DeviceState {
    /// Display name for the current kit, preferring what the device reported.
    pub fn kit_label(&self) -> &str {
        match &self.kit_name {
            Some(name) => name,
            None => KIT_NAMES.get(self.kit).copied().unwrap_or("?"),
        }
    }

    pub fn theme_label(&self) -> &'static str {
        THEME_NAMES.get(self.theme).copied().unwrap_or("?")
    }
}

/// One field of `DeviceState`, used to tell observers what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Tempo,
    Volume,
    Pattern,
    Kit,
    KitName,
    Track,
    Playing,
    Step,
    Theme,
    Clients,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Self::Tempo   => "tempo",
            Self::Volume  => "volume",
            Self::Pattern => "pattern",
            Self::Kit     => "kit",
            Self::KitName => "kit name",
            Self::Track   => "track",
            Self::Playing => "playing",
            Self::Step    => "step",
            Self::Theme   => "theme",
            Self::Clients => "clients",
        }
    }
}
