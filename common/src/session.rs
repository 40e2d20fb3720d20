use serde::{Deserialize, Serialize};

use crate::types::{Action, Command, Context};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub long_click: bool,
    pub short_clicks: u8,
    pub action: Action,
    pub context: Context,
    pub command: Command,
    pub edit_slot: u8,
    pub active_index: Option<u8>,
}

impl Session {
    pub fn cold() -> Self {
        Self {
            long_click: false,
            short_clicks: 0,
            action: Action::Redefine,
            context: Context::Light,
            command: Command::Idle,
            edit_slot: 0,
            active_index: None,
        }
    }

    pub fn resume(retained: Option<Session>, policy: &RetentionPolicy, gap_ms: u64) -> Self {
        match (retained, policy.classify(gap_ms)) {
            (Some(mut session), PowerGap::Retained { long_click }) => {
                session.long_click |= long_click;
                session
            }
            _ => Self::cold(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::cold()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerGap {
    Cold,
    Retained { long_click: bool },
}

// How long retained memory holds its contents without supply depends on the
// board and must be measured, so there is no built-in number: without
// `retain_ms` every boot is cold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub retain_ms: Option<u64>,
    pub long_press_ms: Option<u64>,
}

impl RetentionPolicy {
    pub fn classify(&self, gap_ms: u64) -> PowerGap {
        match self.retain_ms {
            Some(retain_ms) if gap_ms <= retain_ms => PowerGap::Retained {
                long_click: self
                    .long_press_ms
                    .map(|long_press_ms| gap_ms >= long_press_ms)
                    .unwrap_or(false),
            },
            _ => PowerGap::Cold,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            retain_ms: Some(1_500),
            long_press_ms: Some(600),
        }
    }

    #[test]
    fn without_retention_every_gap_is_cold() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.classify(0), PowerGap::Cold);
    }

    #[test]
    fn classifies_short_long_and_cold_gaps() {
        let policy = policy();
        assert_eq!(policy.classify(100), PowerGap::Retained { long_click: false });
        assert_eq!(policy.classify(600), PowerGap::Retained { long_click: true });
        assert_eq!(policy.classify(1_500), PowerGap::Retained { long_click: true });
        assert_eq!(policy.classify(1_501), PowerGap::Cold);
    }

    #[test]
    fn resume_keeps_retained_state_inside_window() {
        let mut retained = Session::cold();
        retained.short_clicks = 1;
        retained.action = Action::Next;
        retained.active_index = Some(3);

        let session = Session::resume(Some(retained.clone()), &policy(), 200);
        assert_eq!(session, retained);

        let session = Session::resume(Some(retained.clone()), &policy(), 800);
        assert!(session.long_click);
        assert_eq!(session.active_index, Some(3));
    }

    #[test]
    fn resume_drops_state_after_power_cycle() {
        let mut retained = Session::cold();
        retained.context = Context::Configure;

        assert_eq!(Session::resume(Some(retained), &policy(), 5_000), Session::cold());
        assert_eq!(Session::resume(None, &policy(), 0), Session::cold());
    }

    #[test]
    fn action_survives_serialization_as_raw_code() {
        let mut session = Session::cold();
        session.action = Action::Command(6);

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["action"], 6);

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back.action, Action::Command(6));
    }
}
