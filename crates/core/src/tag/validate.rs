use aika_lib::value::canonical_text;
use aika_lib::{Error, Result, StateSet, TagDataType, TagSettings, TagValue};

/// Validates an incoming sample against the tag's data type, rebuilding it
/// in canonical form, or rejects it with [`Error::Validation`].
pub(crate) fn validate_value(
    settings: &TagSettings,
    state_set: Option<&StateSet>,
    incoming: &TagValue,
) -> Result<TagValue> {
    match settings.data_type {
        TagDataType::FloatingPoint => Ok(TagValue {
            timestamp: incoming.timestamp,
            numeric: incoming.numeric,
            text: canonical_text(incoming.numeric),
            quality: incoming.quality,
            units: settings.units.clone(),
        }),
        TagDataType::Integer => {
            if !incoming.numeric.is_finite() {
                return Err(Error::Validation(format!(
                    "tag `{}` is integer-typed but the sample is not numeric",
                    settings.name
                )));
            }
            let truncated = incoming.numeric.trunc() as i32;
            Ok(TagValue {
                timestamp: incoming.timestamp,
                numeric: truncated as f64,
                text: truncated.to_string(),
                quality: incoming.quality,
                units: settings.units.clone(),
            })
        }
        TagDataType::Text => Ok(TagValue {
            timestamp: incoming.timestamp,
            numeric: f64::NAN,
            text: incoming.text.clone(),
            quality: incoming.quality,
            units: String::new(),
        }),
        TagDataType::State => {
            let Some(set) = state_set else {
                return Err(Error::Validation(format!(
                    "tag `{}` references state set `{}` which does not exist",
                    settings.name,
                    settings.state_set.as_deref().unwrap_or("")
                )));
            };
            let state = set
                .state_by_name(&incoming.text)
                .or_else(|| {
                    if incoming.numeric.is_finite() {
                        set.state_by_value(incoming.numeric.trunc() as i32)
                    } else {
                        None
                    }
                })
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "sample does not resolve to a state in `{}`",
                        set.name()
                    ))
                })?;
            Ok(TagValue {
                timestamp: incoming.timestamp,
                numeric: state.value as f64,
                text: state.name.clone(),
                quality: incoming.quality,
                units: String::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aika_lib::{Quality, StateSetItem, Timestamp};
    use pretty_assertions::assert_eq;

    fn ts(micros: i64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    fn settings(data_type: TagDataType) -> TagSettings {
        let mut s = TagSettings::new("test", data_type);
        s.units = "degC".into();
        s
    }

    fn run_states() -> StateSet {
        StateSet::new(
            "RunStates",
            "",
            vec![StateSetItem::new("OFF", 0), StateSetItem::new("ON", 1)],
        )
        .unwrap()
    }

    #[test]
    fn float_regenerates_text_and_copies_units() {
        let v = validate_value(
            &settings(TagDataType::FloatingPoint),
            None,
            &TagValue::numeric(ts(0), 1.25).with_text("stale").with_units("K"),
        )
        .unwrap();
        assert_eq!(v.text, "1.25");
        assert_eq!(v.units, "degC");
    }

    #[test]
    fn integer_truncates_toward_zero() {
        let s = settings(TagDataType::Integer);
        let v = validate_value(&s, None, &TagValue::numeric(ts(0), -3.9)).unwrap();
        assert_eq!(v.numeric, -3.0);
        assert_eq!(v.text, "-3");
        let v = validate_value(&s, None, &TagValue::numeric(ts(0), 7.9)).unwrap();
        assert_eq!(v.numeric, 7.0);
    }

    #[test]
    fn integer_rejects_non_numeric() {
        let s = settings(TagDataType::Integer);
        let err = validate_value(&s, None, &TagValue::text(ts(0), "seven")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn text_forces_nan_and_clears_units() {
        let s = settings(TagDataType::Text);
        let v = validate_value(&s, None, &TagValue::text(ts(0), "hello").with_units("K")).unwrap();
        assert!(v.numeric.is_nan());
        assert_eq!(v.text, "hello");
        assert_eq!(v.units, "");
    }

    #[test]
    fn state_resolves_by_name_case_insensitively() {
        let mut s = settings(TagDataType::State);
        s.state_set = Some("RunStates".into());
        let set = run_states();
        let v = validate_value(&s, Some(&set), &TagValue::text(ts(0), "on")).unwrap();
        assert_eq!(v.numeric, 1.0);
        assert_eq!(v.text, "ON");
        assert_eq!(v.units, "");
    }

    #[test]
    fn state_falls_back_to_value_lookup() {
        let mut s = settings(TagDataType::State);
        s.state_set = Some("RunStates".into());
        let set = run_states();
        let v = validate_value(&s, Some(&set), &TagValue::numeric(ts(0), 0.0)).unwrap();
        assert_eq!(v.text, "OFF");
    }

    #[test]
    fn unresolved_state_is_rejected() {
        let mut s = settings(TagDataType::State);
        s.state_set = Some("RunStates".into());
        let set = run_states();
        let err =
            validate_value(&s, Some(&set), &TagValue::numeric(ts(0), 2.0).with_text("")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_state_set_is_rejected() {
        let mut s = settings(TagDataType::State);
        s.state_set = Some("Gone".into());
        let err = validate_value(&s, None, &TagValue::text(ts(0), "ON")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn quality_is_preserved() {
        let v = validate_value(
            &settings(TagDataType::FloatingPoint),
            None,
            &TagValue::numeric(ts(0), 1.0).with_quality(Quality::Uncertain),
        )
        .unwrap();
        assert_eq!(v.quality, Quality::Uncertain);
    }
}
