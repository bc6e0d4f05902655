/// Pipeline phases and the run modes that select them
use std::fmt;
use std::str::FromStr;

/// One sequential stage of the collection pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Member names, affiliations and profile links
    BasicInfo,

    /// Member photos
    Images,

    /// Yearly document counts per member
    Summaries,

    /// Per-document metadata (resumable via the dedup guard)
    Detailed,

    /// Final statistics
    Report,
}

impl Phase {
    /// Name used in logs and in the operation log
    pub fn name(&self) -> &'static str {
        match self {
            Self::BasicInfo => "basic_info",
            Self::Images => "images",
            Self::Summaries => "summaries",
            Self::Detailed => "detailed",
            Self::Report => "report",
        }
    }

    /// Whether resolving zero entities is fatal for the run
    pub fn requires_entities(&self) -> bool {
        matches!(self, Self::BasicInfo | Self::Summaries)
    }

    pub fn all_phases() -> [Self; 5] {
        [
            Self::BasicInfo,
            Self::Images,
            Self::Summaries,
            Self::Detailed,
            Self::Report,
        ]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Selects which subsequence of phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Full,
    Basic,
    Detailed,
}

impl RunMode {
    /// Phases executed by this mode, in execution order
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            Self::Full => &[
                Phase::BasicInfo,
                Phase::Images,
                Phase::Summaries,
                Phase::Detailed,
                Phase::Report,
            ],
            Self::Basic => &[Phase::BasicInfo],
            Self::Detailed => &[Phase::Detailed, Phase::Report],
        }
    }

    pub fn includes(&self, phase: Phase) -> bool {
        self.phases().contains(&phase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Basic => "basic",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            other => Err(format!(
                "unknown mode '{}', expected full, basic or detailed",
                other
            )),
        }
    }
}
