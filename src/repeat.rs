use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::RepeatError;

/// Weekday identifier, 1 = Sunday .. 7 = Saturday (Gregorian numbering).
pub type WeekdayId = u8;

pub const SUNDAY: WeekdayId = 1;
pub const SATURDAY: WeekdayId = 7;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// How an alarm recurs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "days", rename_all = "lowercase")]
pub enum RepeatPolicy {
    Once,
    Daily,
    #[default]
    Weekdays,
    Weekends,
    /// an empty set never fires
    Custom(BTreeSet<WeekdayId>),
}

impl RepeatPolicy {
    /// Builds a custom policy, rejecting ids outside 1..=7.
    pub fn custom(days: impl IntoIterator<Item = WeekdayId>) -> Result<Self, RepeatError> {
        let days = days
            .into_iter()
            .map(|day| {
                if (SUNDAY..=SATURDAY).contains(&day) {
                    Ok(day)
                } else {
                    Err(RepeatError::OutOfRange(day))
                }
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self::Custom(days))
    }

    /// The days this policy is active on, ascending.
    /// `Once` has no set: it never recurs past its first occurrence.
    #[must_use]
    pub fn weekday_set(&self) -> Option<BTreeSet<WeekdayId>> {
        match self {
            Self::Once => None,
            Self::Daily => Some((SUNDAY..=SATURDAY).collect()),
            Self::Weekdays => Some((2..=6).collect()),
            Self::Weekends => Some([SUNDAY, SATURDAY].into_iter().collect()),
            Self::Custom(days) => Some(days.clone()),
        }
    }

    #[must_use]
    pub fn contains(&self, weekday: WeekdayId) -> bool {
        match self {
            Self::Once | Self::Daily => (SUNDAY..=SATURDAY).contains(&weekday),
            Self::Weekdays => (2..=6).contains(&weekday),
            Self::Weekends => weekday == SUNDAY || weekday == SATURDAY,
            Self::Custom(days) => days.contains(&weekday),
        }
    }

    #[must_use]
    pub const fn is_once(&self) -> bool {
        matches!(self, Self::Once)
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Once => "Once".to_string(),
            Self::Daily => "Every day".to_string(),
            Self::Weekdays => "Weekdays".to_string(),
            Self::Weekends => "Weekends".to_string(),
            Self::Custom(days) if days.is_empty() => "Never".to_string(),
            Self::Custom(days) => days
                .iter()
                .filter_map(|day| DAY_NAMES.get(usize::from(*day).checked_sub(1)?))
                .copied()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    #[must_use]
    pub const fn short_description(&self) -> &'static str {
        match self {
            Self::Once => "Once",
            Self::Daily => "Daily",
            Self::Weekdays => "Weekdays",
            Self::Weekends => "Weekends",
            Self::Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for RepeatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Accepts `once`, `daily`, `weekdays`, `weekends`, `never`, or a comma
/// separated list of day names / ids (`mon,wed,fri`, `1,7`).
impl FromStr for RepeatPolicy {
    type Err = RepeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "daily" | "every day" => Ok(Self::Daily),
            "weekdays" => Ok(Self::Weekdays),
            "weekends" => Ok(Self::Weekends),
            "never" | "" => Ok(Self::Custom(BTreeSet::new())),
            list => {
                let days = list
                    .split(',')
                    .map(str::trim)
                    .filter(|day| !day.is_empty())
                    .map(parse_day)
                    .collect::<Result<Vec<_>, _>>()?;
                Self::custom(days)
            }
        }
    }
}

fn parse_day(day: &str) -> Result<WeekdayId, RepeatError> {
    if let Ok(id) = day.parse::<WeekdayId>() {
        return Ok(id);
    }
    day.parse::<chrono::Weekday>()
        .map(crate::calendar::weekday_id)
        .map_err(|_| RepeatError::UnknownDay(day.to_string()))
}
