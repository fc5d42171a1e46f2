//! Small shared value types.

/// Film gauge handled by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Gauge {
    #[default]
    Super8,
    Regular8,
}

impl Gauge {
    pub fn as_str(self) -> &'static str {
        match self {
            Gauge::Super8 => "super8",
            Gauge::Regular8 => "regular8",
        }
    }
}

impl std::fmt::Display for Gauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gauge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "super8" | "s8" => Ok(Gauge::Super8),
            "regular8" | "r8" => Ok(Gauge::Regular8),
            other => Err(format!("unknown gauge '{other}' (expected super8 or regular8)")),
        }
    }
}

/// Threshold and frame-step count a session has converged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnedLevels {
    pub pt_level: u16,
    pub min_frame_steps: u16,
}
