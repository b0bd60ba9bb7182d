/// A fire-and-forget request to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Stop,
    /// Relative tempo change; the device clamps the result.
    TempoDelta(i16),
    TempoSet(u16),
    Volume(u8),
    Kit(usize),
    Pattern(usize),
    Track(usize),
    Step { pattern: usize, track: usize, step: usize, value: bool },
    Clear { track: usize },
    Mute { track: usize },
    Copy { from: usize, to: usize },
    Trigger { track: usize },
    Theme(usize),
    Loop(bool),
    Hold(bool),
    Record(bool),
    Wifi(bool),
}

fn flag(on: bool) -> String {
    if on { "1".to_string() } else { "0".to_string() }
}

impl Command {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Play            => "/play",
            Self::Stop            => "/stop",
            Self::TempoDelta(_)
            | Self::TempoSet(_)   => "/tempo",
            Self::Volume(_)       => "/volume",
            Self::Kit(_)          => "/kit",
            Self::Pattern(_)      => "/pattern",
            Self::Track(_)        => "/track",
            Self::Step { .. }     => "/step",
            Self::Clear { .. }    => "/clear",
            Self::Mute { .. }     => "/mute",
            Self::Copy { .. }     => "/copy",
            Self::Trigger { .. }  => "/trigger",
            Self::Theme(_)        => "/theme",
            Self::Loop(_)         => "/loop",
            Self::Hold(_)         => "/hold",
            Self::Record(_)       => "/record",
            Self::Wifi(_)         => "/wifi",
        }
    }

    /// Query parameters, in the order the device expects them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Play | Self::Stop => vec![],
            Self::TempoDelta(d)     => vec![("delta", d.to_string())],
            Self::TempoSet(bpm)     => vec![("bpm", bpm.to_string())],
            Self::Volume(v)         => vec![("value", v.to_string())],
            Self::Kit(k)            => vec![("kit", k.to_string())],
            Self::Pattern(p)        => vec![("pattern", p.to_string())],
            Self::Track(t)          => vec![("track", t.to_string())],
            Self::Step { pattern, track, step, value } => vec![
                ("pattern", pattern.to_string()),
                ("track", track.to_string()),
                ("step", step.to_string()),
                ("value", flag(*value)),
            ],
            Self::Clear { track }
            | Self::Mute { track }
            | Self::Trigger { track } => vec![("track", track.to_string())],
            Self::Copy { from, to } => vec![("from", from.to_string()), ("to", to.to_string())],
            Self::Theme(t)          => vec![("theme", t.to_string())],
            Self::Loop(on)
            | Self::Hold(on)
            | Self::Record(on)
            | Self::Wifi(on)        => vec![("enabled", flag(*on))],
        }
    }

    /// Path plus query string, e.g. `/copy?from=0&to=1`.  Used for logging;
    /// the HTTP client encodes the params itself.
    pub fn path(&self) -> String {
        let params = self.params();
        if params.is_empty() {
            return self.endpoint().to_string();
        }
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}?{}", self.endpoint(), query.join("&"))
    }
}
