use crate::enums::ParseEnumError;
use crate::ids::{CitizenId, DecayEventId, UserId, WorldId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound of every survival gauge.
pub const NEED_MAX: f64 = 100.0;
/// Lower bound of every survival gauge.
pub const NEED_MIN: f64 = 0.0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citizen {
    pub id: CitizenId,
    pub world_id: WorldId,
    pub user_id: UserId,
    pub display_name: String,
    pub wallet_minor: i64,
    pub bank_minor: i64,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NeedKind {
    Food,
    Water,
    Sleep,
}

impl NeedKind {
    pub const ALL: [NeedKind; 3] = [NeedKind::Food, NeedKind::Water, NeedKind::Sleep];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Food => "FOOD",
            Self::Water => "WATER",
            Self::Sleep => "SLEEP",
        }
    }
}

impl fmt::Display for NeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NeedKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FOOD" => Ok(Self::Food),
            "WATER" => Ok(Self::Water),
            "SLEEP" => Ok(Self::Sleep),
            _ => Err(ParseEnumError::new("NeedKind", s)),
        }
    }
}

/// Three independent gauges in `[0, 100]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurvivalNeeds {
    pub citizen_id: CitizenId,
    pub food: f64,
    pub water: f64,
    pub sleep: f64,
    pub last_decay_at: DateTime<Utc>,
}

impl SurvivalNeeds {
    pub fn full(citizen_id: CitizenId, at: DateTime<Utc>) -> Self {
        Self {
            citizen_id,
            food: NEED_MAX,
            water: NEED_MAX,
            sleep: NEED_MAX,
            last_decay_at: at,
        }
    }

    pub fn get(&self, need: NeedKind) -> f64 {
        match need {
            NeedKind::Food => self.food,
            NeedKind::Water => self.water,
            NeedKind::Sleep => self.sleep,
        }
    }

    /// Add `delta` to one gauge, clamping into `[0, 100]`. Returns the new value.
    pub fn adjust(&mut self, need: NeedKind, delta: f64) -> f64 {
        let slot = match need {
            NeedKind::Food => &mut self.food,
            NeedKind::Water => &mut self.water,
            NeedKind::Sleep => &mut self.sleep,
        };
        *slot = clamp_need(*slot + delta);
        *slot
    }

    pub fn minimum(&self) -> f64 {
        self.food.min(self.water).min(self.sleep)
    }
}

pub fn clamp_need(value: f64) -> f64 {
    if value.is_nan() {
        return NEED_MIN;
    }
    value.clamp(NEED_MIN, NEED_MAX)
}

/// One gauge change caused by a decay tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayEvent {
    pub id: DecayEventId,
    pub world_id: WorldId,
    pub citizen_id: CitizenId,
    pub need: NeedKind,
    pub before: f64,
    pub after: f64,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_clamps_both_ends() {
        let mut needs = SurvivalNeeds::full(CitizenId::generate(), Utc::now());
        assert_eq!(needs.adjust(NeedKind::Food, 25.0), 100.0);
        assert_eq!(needs.adjust(NeedKind::Water, -130.0), 0.0);
        assert_eq!(needs.adjust(NeedKind::Sleep, -12.5), 87.5);
        assert_eq!(needs.minimum(), 0.0);
    }

    #[test]
    fn need_kind_parses_case_insensitively() {
        assert_eq!("water".parse::<NeedKind>().unwrap(), NeedKind::Water);
        assert!("air".parse::<NeedKind>().is_err());
    }
}
