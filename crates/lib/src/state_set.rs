use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One discrete state of a [`StateSet`]: a human name paired with its
/// integer encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSetItem {
    pub name: String,
    pub value: i32,
}

impl StateSetItem {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        StateSetItem { name: name.into(), value }
    }
}

/// A named, ordered enumeration of discrete states, used by state-typed
/// tags. Immutable once constructed; state names are unique within the set
/// (case-insensitively).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSet {
    name: String,
    description: String,
    states: Vec<StateSetItem>,
}

impl StateSet {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        states: Vec<StateSetItem>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid("state set name cannot be blank"));
        }
        for (i, state) in states.iter().enumerate() {
            if state.name.trim().is_empty() {
                return Err(Error::invalid(format!(
                    "state #{i} in set `{name}` has a blank name"
                )));
            }
            if states[..i]
                .iter()
                .any(|prior| prior.name.eq_ignore_ascii_case(&state.name))
            {
                return Err(Error::invalid(format!(
                    "duplicate state name `{}` in set `{name}`",
                    state.name
                )));
            }
        }
        Ok(StateSet {
            name,
            description: description.into(),
            states,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn states(&self) -> &[StateSetItem] {
        &self.states
    }

    /// Case-insensitive lookup by state name.
    pub fn state_by_name(&self, name: &str) -> Option<&StateSetItem> {
        self.states.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Lookup by integer encoding; first match wins.
    pub fn state_by_value(&self, value: i32) -> Option<&StateSetItem> {
        self.states.iter().find(|s| s.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_off() -> StateSet {
        StateSet::new(
            "Run",
            "",
            vec![StateSetItem::new("OFF", 0), StateSetItem::new("ON", 1)],
        )
        .unwrap()
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        let set = on_off();
        assert_eq!(set.state_by_name("on").unwrap().value, 1);
        assert_eq!(set.state_by_name("OfF").unwrap().value, 0);
        assert!(set.state_by_name("STANDBY").is_none());
    }

    #[test]
    fn lookup_by_value() {
        let set = on_off();
        assert_eq!(set.state_by_value(1).unwrap().name, "ON");
        assert!(set.state_by_value(2).is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = StateSet::new(
            "Run",
            "",
            vec![StateSetItem::new("ON", 0), StateSetItem::new("on", 1)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn rejects_blank_set_name() {
        assert!(StateSet::new("  ", "", vec![]).is_err());
    }
}
