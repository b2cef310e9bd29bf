/// Region crawl state definitions
///
/// Each region moves through these states while the orchestrator works on it.
use std::fmt;

/// Represents the current state of a region in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    // ===== Active States =====
    /// Record store replayed, completion count being computed
    LoadingState,

    /// Waiting on the next listing row from the paginator
    Paginating,

    /// Listing row already present in the store
    Skipping,

    /// Detail page being fetched and extracted
    FetchingDetail,

    /// Record being written to the store
    Appending,

    // ===== Terminal States =====
    /// Every school the site reports for the region is stored, or the
    /// listing ran out
    RegionComplete,

    /// Pagination hit a hard failure
    RegionFailed,
}

impl RegionState {
    /// Returns true if no further work happens for the region
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RegionComplete | Self::RegionFailed)
    }

    /// Returns true if the orchestrator may move from `self` to `next`
    pub fn can_transition_to(&self, next: RegionState) -> bool {
        use RegionState::*;
        match self {
            LoadingState => matches!(next, Paginating | RegionFailed),
            Paginating => matches!(
                next,
                Skipping | FetchingDetail | RegionComplete | RegionFailed
            ),
            Skipping => matches!(next, Paginating),
            FetchingDetail => matches!(next, Appending | RegionFailed),
            Appending => matches!(next, Paginating | RegionFailed),
            RegionComplete | RegionFailed => false,
        }
    }

    /// Short lowercase label used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadingState => "loading_state",
            Self::Paginating => "paginating",
            Self::Skipping => "skipping",
            Self::FetchingDetail => "fetching_detail",
            Self::Appending => "appending",
            Self::RegionComplete => "region_complete",
            Self::RegionFailed => "region_failed",
        }
    }

    /// Returns all possible region states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::LoadingState,
            Self::Paginating,
            Self::Skipping,
            Self::FetchingDetail,
            Self::Appending,
            Self::RegionComplete,
            Self::RegionFailed,
        ]
    }
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
