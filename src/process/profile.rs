/*!
 * Profile Detection
 * Keyword classification of process names into workload profiles
 */

use crate::core::types::{IoPriority, PriorityClass};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workload profile inferred from a process name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Gaming,
    Productivity,
    VideoEditing,
    Coding,
    Balanced,
}

impl Profile {
    /// Matching order; the first profile with a matching keyword wins
    pub const DETECTION_ORDER: [Profile; 4] = [
        Profile::Gaming,
        Profile::Productivity,
        Profile::VideoEditing,
        Profile::Coding,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Profile::Gaming => &[
                "game", "steam", "epic", "origin", "uplay", "battle.net", "gog", "dx11", "dx12",
                "vulkan",
            ],
            Profile::Productivity => &[
                "office", "word", "excel", "powerpoint", "outlook", "teams", "slack", "zoom",
            ],
            Profile::VideoEditing => &[
                "premiere", "aftereffects", "davinci", "vegas", "handbrake", "ffmpeg",
            ],
            Profile::Coding => &[
                "code", "visual studio", "intellij", "pycharm", "eclipse", "atom", "sublime",
            ],
            Profile::Balanced => &[],
        }
    }

    pub fn settings(self) -> ProfileSettings {
        let (priority, io_priority) = match self {
            Profile::Gaming | Profile::VideoEditing => (PriorityClass::High, IoPriority::High),
            Profile::Productivity | Profile::Coding => (PriorityClass::AboveNormal, IoPriority::Normal),
            Profile::Balanced => (PriorityClass::Normal, IoPriority::Normal),
        };
        ProfileSettings {
            profile: self,
            priority,
            io_priority,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Gaming => "Gaming",
            Profile::Productivity => "Productivity",
            Profile::VideoEditing => "Video Editing",
            Profile::Coding => "Coding",
            Profile::Balanced => "Balanced",
        };
        f.write_str(name)
    }
}

/// Foreground knobs a profile asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub profile: Profile,
    pub priority: PriorityClass,
    pub io_priority: IoPriority,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Profile::Balanced.settings()
    }
}

#[derive(Debug)]
struct DetectorState {
    current: Profile,
    switches: u64,
}

/// Substring matcher that remembers the last detected profile
#[derive(Debug)]
pub struct ProfileDetector {
    state: Mutex<DetectorState>,
}

impl ProfileDetector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DetectorState {
                current: Profile::Balanced,
                switches: 0,
            }),
        }
    }

    /// Classify without touching the current profile
    pub fn classify(name: &str) -> Profile {
        let lower = name.to_lowercase();
        Profile::DETECTION_ORDER
            .into_iter()
            .find(|p| p.keywords().iter().any(|k| lower.contains(k)))
            .unwrap_or(Profile::Balanced)
    }

    /// Classify and make the result the current profile
    pub fn detect(&self, name: &str) -> Profile {
        let profile = Self::classify(name);
        let mut state = self.state.lock();
        if state.current != profile {
            state.current = profile;
            state.switches += 1;
        }
        profile
    }

    pub fn current(&self) -> Profile {
        self.state.lock().current
    }

    pub fn switches(&self) -> u64 {
        self.state.lock().switches
    }
}

impl Default for ProfileDetector {
    fn default() -> Self {
        Self::new()
    }
}
