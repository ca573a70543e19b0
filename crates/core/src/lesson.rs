//! Lesson types and their time-of-day policy.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::time::TimeOfDayWindow;

/// Night lessons may only start within 19:00-24:00 local time.
const NIGHT_WINDOW: TimeOfDayWindow = TimeOfDayWindow {
    start_minute: 19 * 60,
    end_minute: 24 * 60,
};

/// Highway lessons run in daylight hours, 08:00-18:00 local time.
const HIGHWAY_WINDOW: TimeOfDayWindow = TimeOfDayWindow {
    start_minute: 8 * 60,
    end_minute: 18 * 60,
};

/// Kind of driving lesson. Some kinds restrict the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    Standard,
    Night,
    Highway,
}

impl LessonType {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonType::Standard => "standard",
            LessonType::Night => "night",
            LessonType::Highway => "highway",
        }
    }

    /// The sub-window of the day this lesson type is allowed in, if any.
    pub fn allowed_window(&self) -> Option<TimeOfDayWindow> {
        match self {
            LessonType::Standard => None,
            LessonType::Night => Some(NIGHT_WINDOW),
            LessonType::Highway => Some(HIGHWAY_WINDOW),
        }
    }
}

impl std::fmt::Display for LessonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for LessonType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "standard" => Ok(LessonType::Standard),
            "night" => Ok(LessonType::Night),
            "highway" => Ok(LessonType::Highway),
            other => Err(CoreError::Validation(format!(
                "unknown lesson type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_lessons_are_unrestricted() {
        assert!(LessonType::Standard.allowed_window().is_none());
    }

    #[test]
    fn night_lessons_only_in_the_evening() {
        let w = LessonType::Night.allowed_window().unwrap();
        assert!(w.fits(19 * 60, 60));
        assert!(!w.fits(18 * 60, 60));
        // A lesson that would run past midnight does not fit.
        assert!(!w.fits(23 * 60 + 30, 60));
    }

    #[test]
    fn highway_lessons_in_daylight() {
        let w = LessonType::Highway.allowed_window().unwrap();
        assert!(w.fits(8 * 60, 120));
        assert!(!w.fits(17 * 60 + 30, 60));
    }
}
